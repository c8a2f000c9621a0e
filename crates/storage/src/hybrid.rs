//! Backend that serves metadata documents locally and delegates the rest.

use std::io::{Cursor, Read};
use std::path::PathBuf;

use crate::backend::{Backend, OpenKind};
use crate::fs::generate_document;
use crate::path::VirtualPath;
use crate::transfer::TransferContext;
use crate::StorageError;

/// Generates folder listings and capability documents from a local root,
/// passing objects and directories through to an inner backend.
pub struct HybridBackend {
    inner: Box<dyn Backend>,
    root: PathBuf,
    folder_browsing: bool,
    generated: Option<Cursor<Vec<u8>>>,
}

impl HybridBackend {
    pub fn new(inner: Box<dyn Backend>, root: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            root: root.into(),
            folder_browsing: true,
            generated: None,
        }
    }

    pub fn with_folder_browsing(mut self, enabled: bool) -> Self {
        self.folder_browsing = enabled;
        self
    }
}

impl Backend for HybridBackend {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn open(&mut self, transfer: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError> {
        match kind {
            OpenKind::ListDirectory | OpenKind::Capability => {
                let doc = generate_document(&self.root, transfer, kind, self.folder_browsing)?;
                self.generated = Some(doc);
                Ok(())
            }
            OpenKind::Put | OpenKind::Get => self.inner.open(transfer, kind),
        }
    }

    fn close(&mut self, transfer: &TransferContext, keep: bool) -> Result<(), StorageError> {
        if self.generated.take().is_some() {
            return Ok(());
        }
        self.inner.close(transfer, keep)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.generated.as_mut() {
            Some(doc) => Ok(doc.read(buf)?),
            None => self.inner.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        if self.generated.is_some() {
            return Err(StorageError::WrongMode(OpenKind::ListDirectory));
        }
        self.inner.write(buf)
    }

    fn check_directory(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        self.inner.check_directory(path)
    }

    fn create_directory(&mut self, path: &VirtualPath) -> Result<(), StorageError> {
        self.inner.create_directory(path)
    }

    fn delete(&mut self, transfer: &TransferContext) -> Result<(), StorageError> {
        self.inner.delete(transfer)
    }
}
