//! Engine-facing handle that enforces the storage contract.

use crate::backend::{Backend, OpenKind};
use crate::path::VirtualPath;
use crate::transfer::TransferContext;
use crate::StorageError;

/// Owned capability bound to one backend instance.
///
/// Tracks the open/closed/EOF status so every backend behaves the same:
/// re-opening discards the previous object, reading or writing while closed
/// fails, and once a read has returned end of data it keeps doing so.
pub struct StorageHandle {
    backend: Box<dyn Backend>,
    open: Option<OpenKind>,
    eof: bool,
}

impl StorageHandle {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            open: None,
            eof: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Kind of the open object, if any.
    pub fn kind(&self) -> Option<OpenKind> {
        self.open
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn open(&mut self, transfer: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError> {
        if let Some(previous) = self.open {
            tracing::debug!(?previous, "discarding open object before re-open");
            if let Err(e) = self.close(transfer, false) {
                tracing::warn!(error = %e, "discarding previous object failed");
            }
        }

        self.backend.open(transfer, kind)?;
        self.open = Some(kind);
        self.eof = false;
        Ok(())
    }

    /// Closes the open object. Closing a closed handle does nothing.
    pub fn close(&mut self, transfer: &TransferContext, keep: bool) -> Result<(), StorageError> {
        if self.open.take().is_none() {
            return Ok(());
        }
        self.eof = false;
        self.backend.close(transfer, keep)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.open.is_none() {
            return Err(StorageError::NotOpen);
        }
        if self.eof || buf.is_empty() {
            return Ok(0);
        }
        let n = self.backend.read(buf)?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        if self.open.is_none() {
            return Err(StorageError::NotOpen);
        }
        self.backend.write(buf)
    }

    pub fn check_directory(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        self.backend.check_directory(path)
    }

    pub fn create_directory(&mut self, path: &VirtualPath) -> Result<(), StorageError> {
        self.backend.create_directory(path)
    }

    pub fn delete(&mut self, transfer: &TransferContext) -> Result<(), StorageError> {
        self.backend.delete(transfer)
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("backend", &self.backend.name())
            .field("open", &self.open)
            .field("eof", &self.eof)
            .finish()
    }
}

impl Drop for StorageHandle {
    fn drop(&mut self) {
        if self.open.is_some() {
            let transfer = TransferContext::new();
            if let Err(e) = self.close(&transfer, false) {
                tracing::warn!(error = %e, "discarding object on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
    }

    struct Recording {
        log: Arc<Mutex<Log>>,
        data: Vec<u8>,
    }

    impl Recording {
        fn record(&self, call: impl Into<String>) {
            self.log.lock().unwrap().calls.push(call.into());
        }
    }

    impl Backend for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn open(&mut self, _: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError> {
            self.record(format!("open {kind:?}"));
            Ok(())
        }
        fn close(&mut self, _: &TransferContext, keep: bool) -> Result<(), StorageError> {
            self.record(format!("close {keep}"));
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
            let n = buf.len().min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }
        fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
            self.record(format!("write {}", buf.len()));
            Ok(buf.len())
        }
        fn check_directory(&mut self, _: &VirtualPath) -> Result<bool, StorageError> {
            Ok(true)
        }
        fn create_directory(&mut self, _: &VirtualPath) -> Result<(), StorageError> {
            Ok(())
        }
        fn delete(&mut self, _: &TransferContext) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn handle(data: &[u8]) -> (StorageHandle, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let backend = Recording {
            log: Arc::clone(&log),
            data: data.to_vec(),
        };
        (StorageHandle::new(Box::new(backend)), log)
    }

    #[test]
    fn io_on_closed_handle_fails() {
        let (mut h, _) = handle(b"abc");
        let mut buf = [0u8; 4];
        assert!(matches!(h.read(&mut buf), Err(StorageError::NotOpen)));
        assert!(matches!(h.write(b"x"), Err(StorageError::NotOpen)));
    }

    #[test]
    fn reopen_discards_previous() {
        let (mut h, log) = handle(b"");
        let mut t = TransferContext::new();
        h.open(&mut t, OpenKind::Put).unwrap();
        h.open(&mut t, OpenKind::Get).unwrap();
        assert_eq!(h.kind(), Some(OpenKind::Get));
        assert_eq!(
            log.lock().unwrap().calls,
            ["open Put", "close false", "open Get"]
        );
    }

    #[test]
    fn eof_latches() {
        let (mut h, _) = handle(b"abc");
        let mut t = TransferContext::new();
        h.open(&mut t, OpenKind::Get).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(h.read(&mut buf).unwrap(), 3);
        assert_eq!(h.read(&mut buf).unwrap(), 0);
        assert!(h.is_eof());
        assert_eq!(h.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent_and_drop_discards() {
        let (mut h, log) = handle(b"");
        let mut t = TransferContext::new();
        h.close(&t, true).unwrap();
        h.open(&mut t, OpenKind::Put).unwrap();
        h.write(b"hello").unwrap();
        drop(h);
        assert_eq!(
            log.lock().unwrap().calls,
            ["open Put", "write 5", "close false"]
        );
    }
}
