use crate::StorageError;
use crate::path::VirtualPath;
use crate::transfer::TransferContext;

/// What a storage handle is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    /// Create a new object named by the transfer.
    Put,
    /// Read an existing object named by the transfer.
    Get,
    /// Generated folder listing of the transfer's path.
    ListDirectory,
    /// Generated capability document.
    Capability,
}

/// Storage capability implemented by every backend.
///
/// A backend holds at most one open object. [`StorageHandle`](crate::StorageHandle)
/// guarantees `read`, `write` and `close` are only called while open, and
/// that `open` is never called twice without a `close` in between.
pub trait Backend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Opens the object described by `transfer`.
    ///
    /// `Put` must fail if the object exists. `Get` fills `length` and `time`
    /// (and the type when known). `ListDirectory` and `Capability` fill
    /// `length` with the size of the generated document.
    fn open(&mut self, transfer: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError>;

    /// Releases the open object. A `Put` object is deleted unless `keep`;
    /// when kept, the transfer's metadata is applied.
    fn close(&mut self, transfer: &TransferContext, keep: bool) -> Result<(), StorageError>;

    /// Reads up to `buf.len()` bytes; `Ok(0)` means end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Writes `buf` to the open object and returns the bytes consumed.
    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError>;

    /// Whether `path` exists as a directory.
    fn check_directory(&mut self, path: &VirtualPath) -> Result<bool, StorageError>;

    /// Creates `path`; succeeds if it already exists.
    fn create_directory(&mut self, path: &VirtualPath) -> Result<(), StorageError>;

    /// Removes the object named by `transfer` without opening it.
    fn delete(&mut self, transfer: &TransferContext) -> Result<(), StorageError>;
}

/// Creates one backend per session.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Box<dyn Backend>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Box<dyn Backend> + Send + Sync,
{
    fn create(&self) -> Box<dyn Backend> {
        self()
    }
}
