//! `Key: value` header block exchanged with external helpers.
//!
//! # Wire format
//!
//! ```text
//! Name: a.txt\n
//! Length: 3\n
//! Time: 20240131T235958Z\n
//! \n
//! [raw body]
//! ```
//!
//! Values written here come from validated transfer fields; anything else is
//! stripped of control characters so a peer cannot inject extra lines.

use std::io::{BufRead, Write};

use obexbox_protocol::time::{format_iso8601, parse_iso8601};

use crate::StorageError;
use crate::path::VirtualPath;
use crate::transfer::TransferContext;

/// An ordered header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLines {
    lines: Vec<(String, String)>,
}

impl HeaderLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line, dropping control characters from the value.
    pub fn push(&mut self, key: &str, value: &str) {
        let value: String = value.chars().filter(|c| !c.is_control()).collect();
        self.lines.push((key.to_string(), value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Headers describing `transfer` for a helper request.
    pub fn from_transfer(transfer: &TransferContext) -> Self {
        let mut lines = Self::new();
        if let Some(peer) = &transfer.peer {
            lines.push("From", peer);
        }
        if let Some(length) = transfer.length {
            lines.push("Length", &length.to_string());
        }
        if let Some(time) = &transfer.time {
            lines.push("Time", &format_iso8601(time));
        }
        if let Some(name) = transfer.name() {
            lines.push("Name", name);
        }
        if let Some(mime) = transfer.mime_type() {
            lines.push("Type", mime);
        }
        lines.push("Path", &transfer.path.to_string());
        lines
    }

    /// Headers for a directory-only request.
    pub fn for_path(path: &VirtualPath) -> Self {
        let mut lines = Self::new();
        lines.push("Path", &path.to_string());
        lines
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), StorageError> {
        for (key, value) in &self.lines {
            writeln!(out, "{key}: {value}")?;
        }
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    /// Reads lines up to and including the blank terminator.
    pub fn read_from<R: BufRead>(input: &mut R) -> Result<Self, StorageError> {
        let mut lines = Self::new();
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Err(StorageError::Helper(
                    "output ended inside header block".into(),
                ));
            }
            let text = line.trim_end_matches(['\n', '\r']);
            if text.is_empty() {
                return Ok(lines);
            }
            match text.split_once(':') {
                Some((key, value)) => lines.push(key.trim(), value.trim()),
                None => tracing::debug!(line = text, "ignoring helper line without ':'"),
            }
        }
    }

    /// Copies `Length`, `Time`, `Type` and `Name` into `transfer`.
    ///
    /// Invalid values are logged and skipped; a helper cannot smuggle an
    /// unvalidated name or type into the transfer.
    pub fn apply_to(&self, transfer: &mut TransferContext) {
        if let Some(length) = self.get("Length") {
            match length.parse::<u64>() {
                Ok(length) => transfer.length = Some(length),
                Err(_) => tracing::warn!(length, "helper sent bad Length"),
            }
        }
        if let Some(time) = self.get("Time") {
            match parse_iso8601(time) {
                Ok(time) => transfer.time = Some(time),
                Err(_) => tracing::warn!(time, "helper sent bad Time"),
            }
        }
        if let Some(mime) = self.get("Type") {
            if let Err(e) = transfer.set_type(mime) {
                tracing::warn!(error = %e, "helper sent bad Type");
            }
        }
        if let Some(name) = self.get("Name") {
            if let Err(e) = transfer.set_name(name) {
                tracing::warn!(error = %e, "helper sent bad Name");
            }
        }
    }
}
