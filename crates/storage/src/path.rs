//! Rooted virtual path navigated by SETPATH.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::StorageError;
use crate::validation::validate_segment;

/// A sequence of validated path segments below the storage root.
///
/// Segments are validated on the way in, so a `VirtualPath` never contains
/// `..` or empty segments and [`resolve`](Self::resolve) cannot escape the
/// root it is joined to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Appends one segment after validating it.
    pub fn push(&mut self, segment: &str) -> Result<(), StorageError> {
        validate_segment(segment)?;
        self.segments.push(segment.to_string());
        Ok(())
    }

    /// Removes the last segment. Popping the root is a no-op.
    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Concrete directory below `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        out.extend(&self.segments);
        out
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
