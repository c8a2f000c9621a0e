//! Per-request transfer record shared by the command handlers.

use chrono::{DateTime, Utc};

use crate::StorageError;
use crate::path::VirtualPath;
use crate::validation::{validate_name, validate_type};

/// Mutable record of the object currently being transferred.
///
/// The name and type setters validate their input, so a populated context
/// only ever holds values that are safe to turn into paths or helper header
/// lines.
#[derive(Debug, Clone, Default)]
pub struct TransferContext {
    name: Option<String>,
    mime_type: Option<String>,
    /// Declared length in bytes, if known.
    pub length: Option<u64>,
    /// Modification time of the object.
    pub time: Option<DateTime<Utc>>,
    /// Current directory, changed only by SETPATH.
    pub path: VirtualPath,
    /// Informational identity of the remote peer.
    pub peer: Option<String>,
}

impl TransferContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(peer: impl Into<String>) -> Self {
        Self {
            peer: Some(peer.into()),
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if present and non-empty.
    pub fn object_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        self.name = Some(name.to_string());
        Ok(())
    }

    pub fn set_type(&mut self, mime: &str) -> Result<(), StorageError> {
        validate_type(mime)?;
        self.mime_type = Some(mime.to_string());
        Ok(())
    }

    /// Clears the per-object fields. The path and peer survive.
    pub fn reset(&mut self) {
        self.name = None;
        self.mime_type = None;
        self.length = None;
        self.time = None;
    }
}
