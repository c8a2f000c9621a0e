//! Storage side of the obexbox transaction engine.
//!
//! Holds the per-request [`TransferContext`], the validation rules applied to
//! untrusted names, types and path segments, and the [`Backend`] capability
//! interface with its three implementations:
//!
//! - [`FileBackend`] stores objects directly below a root directory.
//! - [`ScriptBackend`] delegates every operation to an external helper.
//! - [`HybridBackend`] wraps another backend and generates folder listings
//!   and capability documents from the local root.
//!
//! Handlers never talk to a backend directly; they go through
//! [`StorageHandle`], which enforces the open/closed/EOF contract the same
//! way for every backend.

mod backend;
mod capability;
mod fs;
mod handle;
mod helper;
mod hybrid;
mod lines;
mod listing;
mod path;
mod script;
mod transfer;
mod validation;

use std::path::PathBuf;
use std::sync::Arc;

pub use backend::{Backend, BackendFactory, OpenKind};
pub use capability::capability_document;
pub use fs::FileBackend;
pub use handle::StorageHandle;
pub use hybrid::HybridBackend;
pub use lines::HeaderLines;
pub use listing::folder_listing;
pub use path::VirtualPath;
pub use script::ScriptBackend;
pub use transfer::TransferContext;
pub use validation::{validate_name, validate_segment, validate_type};

/// MIME type of a generated folder listing.
pub const FOLDER_LISTING_TYPE: &str = "x-obex/folder-listing";

/// MIME type of a generated capability document.
pub const CAPABILITY_TYPE: &str = "x-obex/capability";

/// Errors produced by the storage crate.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("invalid path segment: {0}")]
    InvalidSegment(String),

    #[error("transfer has no name")]
    MissingName,

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("storage handle is not open")]
    NotOpen,

    #[error("operation not valid for {0:?} transfer")]
    WrongMode(OpenKind),

    #[error("helper failed: {0}")]
    Helper(String),
}

/// Which backend a deployment serves objects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    File,
    Script { helper: PathBuf },
    Hybrid { helper: Option<PathBuf> },
}

/// Backend selection plus the storage root, shared by all sessions.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub kind: BackendKind,
    /// Advertise Folder-Browsing in generated capability documents.
    pub folder_browsing: bool,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>, kind: BackendKind) -> Self {
        Self {
            root: root.into(),
            kind,
            folder_browsing: true,
        }
    }

    pub fn with_folder_browsing(mut self, enabled: bool) -> Self {
        self.folder_browsing = enabled;
        self
    }

    /// Wraps the config as a factory for session construction.
    pub fn into_factory(self) -> Arc<dyn BackendFactory> {
        Arc::new(self)
    }
}

impl BackendFactory for StorageConfig {
    fn create(&self) -> Box<dyn Backend> {
        match &self.kind {
            BackendKind::File => Box::new(
                FileBackend::new(&self.root).with_folder_browsing(self.folder_browsing),
            ),
            BackendKind::Script { helper } => Box::new(ScriptBackend::new(helper, &self.root)),
            BackendKind::Hybrid { helper } => {
                let inner: Box<dyn Backend> = match helper {
                    Some(helper) => Box::new(ScriptBackend::new(helper, &self.root)),
                    None => Box::new(FileBackend::new(&self.root)),
                };
                Box::new(
                    HybridBackend::new(inner, &self.root)
                        .with_folder_browsing(self.folder_browsing),
                )
            }
        }
    }
}
