use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::*;

/// Stored bytes of a [`MemHandle`]; `None` once deleted or never written.
type Shared = Arc<Mutex<Option<Vec<u8>>>>;

/// Handle backed by a shared in-memory buffer, with an optional hook that
/// tampers with what reads see.
#[derive(Debug, Default, Clone)]
pub struct MemHandle {
    data: Shared,
    tamper: Option<fn(&mut Vec<u8>)>,
}

impl MemHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tampered(tamper: fn(&mut Vec<u8>)) -> Self {
        Self {
            data: Shared::default(),
            tamper: Some(tamper),
        }
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.data.lock().unwrap().clone()
    }

    pub fn set_bytes(&self, bytes: Vec<u8>) {
        *self.data.lock().unwrap() = Some(bytes);
    }

    pub fn exists(&self) -> bool {
        self.data.lock().unwrap().is_some()
    }
}

struct MemWriter {
    buf: Vec<u8>,
    target: Shared,
}

impl Write for MemWriter {
    fn write(&mut self, b: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(b);
        Ok(b.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.target.lock().unwrap() = Some(self.buf.clone());
        Ok(())
    }
}

impl StorageHandle for MemHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        let mut bytes = self
            .bytes()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no data"))?;
        if let Some(tamper) = self.tamper {
            tamper(&mut bytes);
        }
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        *self.data.lock().unwrap() = Some(Vec::new());
        Ok(Box::new(MemWriter {
            buf: Vec::new(),
            target: Arc::clone(&self.data),
        }))
    }

    fn size(&self) -> i64 {
        self.bytes().map(|b| b.len() as i64).unwrap_or(-1)
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock().unwrap() = None;
        Ok(())
    }
}

/// Handle that accepts writes but never stores anything.
#[derive(Debug)]
pub struct DiscardingHandle;

impl StorageHandle for DiscardingHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        Ok(Box::new(io::sink()))
    }

    fn size(&self) -> i64 {
        0
    }

    fn delete(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Handle that cannot be opened at all.
#[derive(Debug)]
pub struct BrokenHandle;

impl StorageHandle for BrokenHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        Err(io::Error::new(io::ErrorKind::Other, "broken"))
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        Err(io::Error::new(io::ErrorKind::Other, "broken"))
    }

    fn size(&self) -> i64 {
        -1
    }

    fn delete(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Filesystem whose every call fails.
#[derive(Debug, Default)]
pub struct DeadFileSystem {
    pub calls: AtomicUsize,
}

impl DeadFileSystem {
    fn fail<T>(&self) -> io::Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(io::ErrorKind::Other, "filesystem unavailable"))
    }
}

impl FileSystem for DeadFileSystem {
    fn list(&self, _dir: &std::path::Path) -> io::Result<Vec<std::path::PathBuf>> {
        self.fail()
    }

    fn create(&self, _path: &std::path::Path) -> io::Result<Box<dyn WriteStream>> {
        self.fail()
    }

    fn open(&self, _path: &std::path::Path) -> io::Result<Box<dyn ReadStream>> {
        self.fail()
    }

    fn len(&self, _path: &std::path::Path) -> io::Result<u64> {
        self.fail()
    }

    fn remove(&self, _path: &std::path::Path) -> io::Result<()> {
        self.fail()
    }

    fn status(&self, _dir: &std::path::Path) -> io::Result<FsStatus> {
        self.fail()
    }
}

pub fn mem() -> (MemHandle, Arc<dyn StorageHandle>) {
    let h = MemHandle::new();
    let shared: Arc<dyn StorageHandle> = Arc::new(h.clone());
    (h, shared)
}

pub fn numbers(values: &[u64]) -> PersistedFile<u64> {
    let mut set = PersistedFile::new(SortOrder::natural());
    for v in values {
        set.add(*v).unwrap();
    }
    set
}

pub fn memory_set(values: &[u64]) -> RewritableOrderedSet<u64> {
    let mut set = RewritableOrderedSet::new(SortOrder::natural());
    set.extend(values.iter().copied());
    set
}

pub fn persisted_numbers(values: &[u64]) -> (MemHandle, PersistedFile<u64>) {
    let (raw, handle) = mem();
    let mut set = numbers(values);
    set.persist(handle).unwrap();
    (raw, set)
}
