use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use config::SpillConfig;
use sortedset::*;

use crate::SpillingSortedSet;

/// Handle whose every open fails.
#[derive(Debug)]
pub struct BrokenHandle;

impl StorageHandle for BrokenHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        Err(io::Error::new(io::ErrorKind::Other, "broken handle"))
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        Err(io::Error::new(io::ErrorKind::Other, "broken handle"))
    }

    fn size(&self) -> i64 {
        -1
    }

    fn delete(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Wraps a handle so that only its first `open_write` succeeds.
#[derive(Debug)]
pub struct WriteOnceHandle {
    inner: Arc<dyn StorageHandle>,
    written: AtomicBool,
}

impl StorageHandle for WriteOnceHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        self.inner.open_read()
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        if self.written.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "handle already written"));
        }
        self.inner.open_write()
    }

    fn size(&self) -> i64 {
        self.inner.size()
    }

    fn delete(&self) -> io::Result<()> {
        self.inner.delete()
    }
}

/// Factory whose handles can never be written. Counts handles issued and
/// failures reported back.
#[derive(Debug, Default)]
pub struct FailingFactory {
    pub created: AtomicUsize,
    pub failed: AtomicUsize,
}

impl StorageHandleFactory for FailingFactory {
    fn create_handle(&self) -> io::Result<Arc<dyn StorageHandle>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(BrokenHandle))
    }

    fn on_failed_allocation(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that reports itself unusable.
#[derive(Debug, Default)]
pub struct InvalidFactory {
    pub created: AtomicUsize,
}

impl StorageHandleFactory for InvalidFactory {
    fn create_handle(&self) -> io::Result<Arc<dyn StorageHandle>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(BrokenHandle))
    }

    fn is_valid(&self) -> bool {
        false
    }
}

/// Scratch factory that hands out only `remaining` writable handles; the
/// rest are broken.
#[derive(Debug)]
pub struct LimitedFactory {
    inner: ScratchHandleFactory,
    remaining: AtomicUsize,
    write_once: bool,
}

impl LimitedFactory {
    pub fn new(dir: &Path, remaining: usize) -> Self {
        Self {
            inner: ScratchHandleFactory::in_dir(dir),
            remaining: AtomicUsize::new(remaining),
            write_once: false,
        }
    }

    /// Like [`LimitedFactory::new`], but each granted handle can only be
    /// written once.
    pub fn write_once(dir: &Path, remaining: usize) -> Self {
        Self {
            write_once: true,
            ..Self::new(dir, remaining)
        }
    }

    pub fn set_remaining(&self, remaining: usize) {
        self.remaining.store(remaining, Ordering::SeqCst);
    }
}

impl StorageHandleFactory for LimitedFactory {
    fn create_handle(&self) -> io::Result<Arc<dyn StorageHandle>> {
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Ok(Arc::new(BrokenHandle));
        }
        let handle = self.inner.create_handle()?;
        if self.write_once {
            Ok(Arc::new(WriteOnceHandle {
                inner: handle,
                written: AtomicBool::new(false),
            }))
        } else {
            Ok(handle)
        }
    }
}

pub fn scratch(dir: &Path) -> Arc<dyn StorageHandleFactory> {
    Arc::new(ScratchHandleFactory::in_dir(dir))
}

pub fn config(threshold: usize) -> SpillConfig {
    SpillConfig::default()
        .with_buffer_persist_threshold(threshold)
        .with_max_open_segments(0)
}

/// Set of `u64` over scratch files in `dir`, compaction off.
pub fn spill_set(dir: &Path, threshold: usize) -> SpillingSortedSet<u64> {
    SpillingSortedSet::new(SortOrder::natural(), vec![scratch(dir)], config(threshold)).unwrap()
}

/// Number of files currently in `dir`.
pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

pub fn collect(set: &mut SpillingSortedSet<u64>) -> anyhow::Result<Vec<u64>> {
    Ok(set.iter()?.collect_all()?)
}
