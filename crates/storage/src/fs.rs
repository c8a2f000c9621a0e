//! Direct filesystem backend.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::backend::{Backend, OpenKind};
use crate::capability::capability_document;
use crate::listing::folder_listing;
use crate::path::VirtualPath;
use crate::transfer::TransferContext;
use crate::validation::validate_segment;
use crate::StorageError;

enum Open {
    Put {
        file: File,
        path: PathBuf,
        written: u64,
        preallocated: bool,
    },
    Get(File),
    Generated(Cursor<Vec<u8>>),
}

/// Stores objects as plain files below a root directory.
pub struct FileBackend {
    root: PathBuf,
    folder_browsing: bool,
    open: Option<Open>,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folder_browsing: true,
            open: None,
        }
    }

    /// Whether the capability document lists the Folder-Browsing service.
    pub fn with_folder_browsing(mut self, enabled: bool) -> Self {
        self.folder_browsing = enabled;
        self
    }

    fn object_path(&self, transfer: &TransferContext) -> Result<PathBuf, StorageError> {
        let name = transfer.object_name().ok_or(StorageError::MissingName)?;
        Ok(transfer.path.resolve(&self.root).join(name))
    }

    fn open_put(&self, transfer: &TransferContext) -> Result<Open, StorageError> {
        let path = self.object_path(transfer)?;
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut preallocated = false;
        if let Some(len) = transfer.length.filter(|&len| len > 0) {
            match file.set_len(len) {
                Ok(()) => preallocated = true,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "preallocation failed"),
            }
        }

        tracing::debug!(path = %path.display(), "put opened");
        Ok(Open::Put {
            file,
            path,
            written: 0,
            preallocated,
        })
    }

    fn open_get(&self, transfer: &mut TransferContext) -> Result<Open, StorageError> {
        let path = self.object_path(transfer)?;
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )
            .into());
        }
        transfer.length = Some(metadata.len());
        transfer.time = metadata.modified().ok().map(DateTime::<Utc>::from);
        tracing::debug!(path = %path.display(), length = metadata.len(), "get opened");
        Ok(Open::Get(file))
    }
}

/// Builds a folder listing or capability document from a local root.
pub(crate) fn generate_document(
    root: &Path,
    transfer: &mut TransferContext,
    kind: OpenKind,
    folder_browsing: bool,
) -> Result<Cursor<Vec<u8>>, StorageError> {
    let doc = match kind {
        OpenKind::ListDirectory => {
            // A name on a listing request selects a child folder.
            let mut path = transfer.path.clone();
            if let Some(child) = transfer.object_name() {
                validate_segment(child)?;
                path.push(child)?;
            }
            folder_listing(&path.resolve(root), path.is_root())?
        }
        OpenKind::Capability => capability_document(folder_browsing),
        OpenKind::Put | OpenKind::Get => return Err(StorageError::WrongMode(kind)),
    };
    transfer.length = Some(doc.len() as u64);
    Ok(Cursor::new(doc))
}

impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&mut self, transfer: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError> {
        let open = match kind {
            OpenKind::Put => self.open_put(transfer)?,
            OpenKind::Get => self.open_get(transfer)?,
            OpenKind::ListDirectory | OpenKind::Capability => Open::Generated(
                generate_document(&self.root, transfer, kind, self.folder_browsing)?,
            ),
        };
        self.open = Some(open);
        Ok(())
    }

    fn close(&mut self, transfer: &TransferContext, keep: bool) -> Result<(), StorageError> {
        let Some(open) = self.open.take() else {
            return Err(StorageError::NotOpen);
        };

        let Open::Put {
            file,
            path,
            written,
            preallocated,
        } = open
        else {
            return Ok(());
        };

        if !keep {
            drop(file);
            std::fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), "partial object removed");
            return Ok(());
        }

        let finish = || -> Result<(), StorageError> {
            if preallocated {
                file.set_len(written)?;
            }
            if let Some(time) = transfer.time {
                file.set_modified(SystemTime::from(time))?;
            }
            file.sync_all()?;
            Ok(())
        };

        if let Err(e) = finish() {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        tracing::debug!(path = %path.display(), bytes = written, "object stored");
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.open.as_mut() {
            Some(Open::Get(file)) => Ok(file.read(buf)?),
            Some(Open::Generated(doc)) => Ok(doc.read(buf)?),
            Some(Open::Put { .. }) => Err(StorageError::WrongMode(OpenKind::Put)),
            None => Err(StorageError::NotOpen),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        match self.open.as_mut() {
            Some(Open::Put { file, written, .. }) => {
                file.write_all(buf)?;
                *written += buf.len() as u64;
                Ok(buf.len())
            }
            Some(Open::Get(_)) => Err(StorageError::WrongMode(OpenKind::Get)),
            Some(Open::Generated(_)) => Err(StorageError::WrongMode(OpenKind::ListDirectory)),
            None => Err(StorageError::NotOpen),
        }
    }

    fn check_directory(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        Ok(path.resolve(&self.root).is_dir())
    }

    fn create_directory(&mut self, path: &VirtualPath) -> Result<(), StorageError> {
        std::fs::create_dir_all(path.resolve(&self.root))?;
        Ok(())
    }

    fn delete(&mut self, transfer: &TransferContext) -> Result<(), StorageError> {
        let path = self.object_path(transfer)?;
        let metadata = std::fs::symlink_metadata(&path)?;
        if metadata.is_dir() {
            // Only empty folders; recursive removal is not offered.
            std::fs::remove_dir(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        tracing::debug!(path = %path.display(), "object deleted");
        Ok(())
    }
}
