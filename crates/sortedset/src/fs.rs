use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::handle::{ReadStream, StorageHandle, StorageHandleFactory, WriteStream};

/// Reserved file name prefix: files are named `SortedSetFile.<seq>.<millis>`.
pub const FILE_NAME_PREFIX: &str = "SortedSetFile";

/// Capacity report for the directory a factory writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStatus {
    pub capacity: u64,
    pub remaining: u64,
}

/// Minimal filesystem surface the directory handles need.
///
/// Stands in for a distributed filesystem client; [`LocalFileSystem`] maps
/// it onto a local directory.
pub trait FileSystem: std::fmt::Debug + Send + Sync {
    /// Files (not directories) directly inside `dir`.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Creates or truncates `path`, creating parent directories as needed.
    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteStream>>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadStream>>;

    fn len(&self, path: &Path) -> io::Result<u64>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn status(&self, dir: &Path) -> io::Result<FsStatus>;
}

/// [`FileSystem`] over the local disk.
///
/// Local disks expose no portable free-space query, so capacity is an
/// optional quota: with one, `remaining` is the quota minus the bytes
/// already stored in the directory; without one both report `u64::MAX`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    quota: Option<u64>,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self { quota: Some(quota) }
    }
}

impl FileSystem for LocalFileSystem {
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteStream>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(BufWriter::new(f)))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadStream>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn status(&self, dir: &Path) -> io::Result<FsStatus> {
        let Some(quota) = self.quota else {
            return Ok(FsStatus {
                capacity: u64::MAX,
                remaining: u64::MAX,
            });
        };
        let used = match self.list(dir) {
            Ok(files) => files
                .iter()
                .filter_map(|p| fs::metadata(p).ok())
                .map(|m| m.len())
                .sum(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(FsStatus {
            capacity: quota,
            remaining: quota.saturating_sub(used),
        })
    }
}

/// Parses `SortedSetFile.<seq>.<millis>` into `(seq, millis)`.
pub fn parse_file_name(name: &str) -> Option<(u64, u64)> {
    let mut parts = name.split('.');
    if parts.next()? != FILE_NAME_PREFIX {
        return None;
    }
    let seq = parts.next()?.parse().ok()?;
    let millis = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((seq, millis))
}

/// A named file on a [`FileSystem`].
#[derive(Debug)]
pub struct DirectoryHandle {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl DirectoryHandle {
    pub fn new(fs: Arc<dyn FileSystem>, path: PathBuf) -> Self {
        Self { fs, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageHandle for DirectoryHandle {
    fn open_read(&self) -> io::Result<Box<dyn ReadStream>> {
        self.fs.open(&self.path)
    }

    fn open_write(&self) -> io::Result<Box<dyn WriteStream>> {
        self.fs.create(&self.path)
    }

    fn size(&self) -> i64 {
        self.fs.len(&self.path).map(|n| n as i64).unwrap_or(-1)
    }

    fn delete(&self) -> io::Result<()> {
        match self.fs.remove(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Issues [`DirectoryHandle`]s named `SortedSetFile.<seq>.<millis>` in one
/// directory, with a sequence counter shared by every caller.
#[derive(Debug)]
pub struct DirectoryHandleFactory {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    next_seq: AtomicU64,
    min_available_bytes: u64,
    min_available_fraction: f64,
}

impl DirectoryHandleFactory {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
            next_seq: AtomicU64::new(1),
            min_available_bytes: 0,
            min_available_fraction: 0.0,
        }
    }

    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(LocalFileSystem::new()), dir)
    }

    /// Refuse new files once fewer than `bytes` remain.
    pub fn with_min_available_bytes(mut self, bytes: u64) -> Self {
        self.min_available_bytes = bytes;
        self
    }

    /// Refuse new files once less than `fraction` (0.0..=1.0) of capacity
    /// remains.
    pub fn with_min_available_fraction(mut self, fraction: f64) -> Self {
        self.min_available_fraction = fraction;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Sequence number the next handle will use.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn set_next_sequence(&self, seq: u64) {
        self.next_seq.store(seq, Ordering::SeqCst);
    }

    /// Existing `SortedSetFile.*` files in the directory, ordered by
    /// sequence, with their parsed sequence numbers.
    pub fn existing_files(&self) -> io::Result<Vec<(u64, PathBuf)>> {
        let paths = match self.fs.list(&self.dir) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut found: Vec<(u64, u64, PathBuf)> = paths
            .into_iter()
            .filter_map(|p| {
                let (seq, millis) = parse_file_name(p.file_name()?.to_str()?)?;
                Some((seq, millis, p))
            })
            .collect();
        found.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Ok(found.into_iter().map(|(seq, _, p)| (seq, p)).collect())
    }

    /// Wraps an existing file of this directory as a handle.
    pub fn handle_for(&self, path: PathBuf) -> Arc<dyn StorageHandle> {
        Arc::new(DirectoryHandle::new(Arc::clone(&self.fs), path))
    }
}

impl StorageHandleFactory for DirectoryHandleFactory {
    fn create_handle(&self) -> io::Result<Arc<dyn StorageHandle>> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let path = self.dir.join(format!("{FILE_NAME_PREFIX}.{seq}.{millis}"));
        Ok(self.handle_for(path))
    }

    fn is_valid(&self) -> bool {
        let status = match self.fs.status(&self.dir) {
            Ok(s) => s,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "unable to read filesystem status");
                return false;
            }
        };
        if status.remaining < self.min_available_bytes {
            return false;
        }
        if status.capacity > 0
            && (status.remaining as f64 / status.capacity as f64) < self.min_available_fraction
        {
            return false;
        }
        true
    }

    fn on_failed_allocation(&self) {
        let _ = self
            .next_seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}
