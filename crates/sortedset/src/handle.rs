use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

/// Readable, seekable byte stream returned by [`StorageHandle::open_read`].
pub trait ReadStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadStream for T {}

/// Writable byte stream returned by [`StorageHandle::open_write`].
pub trait WriteStream: Write + Send {}

impl<T: Write + Send> WriteStream for T {}

/// One backing file. Handles are not reused across files. A deleted handle
/// reports errors or `-1` sizes until `open_write` recreates its file.
pub trait StorageHandle: fmt::Debug + Send + Sync {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>>;

    /// Opens the file for writing, truncating anything already there.
    fn open_write(&self) -> io::Result<Box<dyn WriteStream>>;

    /// Length in bytes, or `-1` if it cannot be determined.
    fn size(&self) -> i64;

    fn delete(&self) -> io::Result<()>;
}

/// Produces fresh [`StorageHandle`]s.
pub trait StorageHandleFactory: fmt::Debug + Send + Sync {
    fn create_handle(&self) -> io::Result<Arc<dyn StorageHandle>>;

    /// Whether this factory should be used right now (e.g. quota left).
    fn is_valid(&self) -> bool {
        true
    }

    /// Called after a handle from this factory failed to persist, so the
    /// factory can roll back any bookkeeping done in `create_handle`.
    fn on_failed_allocation(&self) {}
}
