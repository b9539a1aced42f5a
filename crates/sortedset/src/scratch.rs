use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempPath;

use crate::handle::{ReadStream, StorageHandle, StorageHandleFactory, WriteStream};

/// Local temporary file. [`StorageHandle::delete`] removes the bytes but
/// keeps the path reserved, so a later `open_write` recreates the file in
/// place. The path is removed for good when the handle is dropped.
#[derive(Debug)]
pub struct ScratchHandle {
    temp: TempPath,
    deleted: AtomicBool,
}

impl ScratchHandle {
    pub fn new_in(dir: &Path, prefix: &str) -> io::Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".set")
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self {
            temp,
            deleted: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.temp
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

impl StorageHandle for ScratchHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        if self.is_deleted() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scratch file deleted"));
        }
        Ok(Box::new(BufReader::new(File::open(self.path())?)))
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path())?;
        self.deleted.store(false, Ordering::Release);
        Ok(Box::new(BufWriter::new(f)))
    }

    fn size(&self) -> i64 {
        if self.is_deleted() {
            return -1;
        }
        std::fs::metadata(self.path())
            .map(|m| m.len() as i64)
            .unwrap_or(-1)
    }

    fn delete(&self) -> io::Result<()> {
        if self.is_deleted() {
            return Ok(());
        }
        match std::fs::remove_file(self.path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => {
                self.deleted.store(true, Ordering::Release);
                Ok(())
            }
        }
    }
}

/// Creates [`ScratchHandle`]s in one directory (the system temp dir by
/// default).
#[derive(Debug, Clone)]
pub struct ScratchHandleFactory {
    dir: PathBuf,
    prefix: String,
}

impl ScratchHandleFactory {
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "SortedSet".to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for ScratchHandleFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageHandleFactory for ScratchHandleFactory {
    fn create_handle(&self) -> io::Result<Arc<dyn StorageHandle>> {
        Ok(Arc::new(ScratchHandle::new_in(&self.dir, &self.prefix)?))
    }
}
