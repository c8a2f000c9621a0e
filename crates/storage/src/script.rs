//! Backend that delegates every operation to an external helper program.
//!
//! Each operation runs `<helper> <verb>` with the storage root as working
//! directory, where verb is one of `put`, `get`, `listdir`, `capability`,
//! `createdir` or `delete`. The request is described by a [`HeaderLines`]
//! block on the helper's stdin. For `put` the raw body follows and the helper
//! commits by printing `OK`. For `get`, `listdir` and `capability` the helper
//! answers with its own header block followed by the raw body.

use std::path::PathBuf;

use crate::backend::{Backend, OpenKind};
use crate::helper::Helper;
use crate::lines::HeaderLines;
use crate::path::VirtualPath;
use crate::transfer::TransferContext;
use crate::StorageError;

pub struct ScriptBackend {
    program: PathBuf,
    root: PathBuf,
    open: Option<(OpenKind, Helper)>,
}

impl ScriptBackend {
    pub fn new(program: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
            open: None,
        }
    }

    fn spawn(&self, verb: &'static str, headers: &HeaderLines) -> Result<Helper, StorageError> {
        let mut helper = Helper::spawn(&self.program, verb, &self.root)?;
        helper.send_headers(headers)?;
        Ok(helper)
    }

    /// Runs a verb that produces no body and reports its exit status.
    fn run(&self, verb: &'static str, headers: &HeaderLines) -> Result<(), StorageError> {
        self.spawn(verb, headers)?.wait_success()
    }
}

fn verb(kind: OpenKind) -> &'static str {
    match kind {
        OpenKind::Put => "put",
        OpenKind::Get => "get",
        OpenKind::ListDirectory => "listdir",
        OpenKind::Capability => "capability",
    }
}

impl Backend for ScriptBackend {
    fn name(&self) -> &'static str {
        "script"
    }

    fn open(&mut self, transfer: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError> {
        if matches!(kind, OpenKind::Put | OpenKind::Get) && transfer.object_name().is_none() {
            return Err(StorageError::MissingName);
        }

        let mut helper = self.spawn(verb(kind), &HeaderLines::from_transfer(transfer))?;
        if kind != OpenKind::Put {
            helper.finish_input();
            helper.read_headers()?.apply_to(transfer);
        }
        self.open = Some((kind, helper));
        Ok(())
    }

    fn close(&mut self, _transfer: &TransferContext, keep: bool) -> Result<(), StorageError> {
        let Some((kind, mut helper)) = self.open.take() else {
            return Err(StorageError::NotOpen);
        };

        if kind != OpenKind::Put || !keep {
            helper.terminate();
            return Ok(());
        }

        helper.finish_input();
        if let Err(e) = helper.expect_ok() {
            tracing::warn!(error = %e, "helper rejected upload");
            helper.terminate();
            return Err(e);
        }
        helper.wait_success()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.open.as_mut() {
            Some((OpenKind::Put, _)) => Err(StorageError::WrongMode(OpenKind::Put)),
            Some((kind, helper)) => {
                let n = helper.read_body(buf)?;
                if n == 0 {
                    // End of output: a failed exit means the body is incomplete.
                    helper.reap().inspect_err(|e| {
                        tracing::warn!(kind = ?kind, error = %e, "helper failed mid-stream");
                    })?;
                }
                Ok(n)
            }
            None => Err(StorageError::NotOpen),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        match self.open.as_mut() {
            Some((OpenKind::Put, helper)) => {
                helper.write_body(buf)?;
                Ok(buf.len())
            }
            Some((kind, _)) => Err(StorageError::WrongMode(*kind)),
            None => Err(StorageError::NotOpen),
        }
    }

    fn check_directory(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        match self.run("listdir", &HeaderLines::for_path(path)) {
            Ok(()) => Ok(true),
            Err(StorageError::Helper(reason)) => {
                tracing::debug!(path = %path, reason = %reason, "helper reports no such directory");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn create_directory(&mut self, path: &VirtualPath) -> Result<(), StorageError> {
        self.run("createdir", &HeaderLines::for_path(path))
    }

    fn delete(&mut self, transfer: &TransferContext) -> Result<(), StorageError> {
        if transfer.object_name().is_none() {
            return Err(StorageError::MissingName);
        }
        self.run("delete", &HeaderLines::from_transfer(transfer))
    }
}
