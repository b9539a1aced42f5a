use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use config::PersistOptions;
use tracing::{debug, warn};

use crate::codec::{FramedCodec, RecordCodec, RecordRange, RecordReader};
use crate::error::{FetchKind, Result, SortedSetError};
use crate::handle::StorageHandle;
use crate::order::{RewriteStrategy, SortOrder};
use crate::record::Record;
use crate::rewritable::RewritableOrderedSet;
use crate::set::{MemoryCursor, MemoryCursorMut, SetCursor, SortedSet};

/// Sorted set whose contents live either in memory or in one file.
///
/// [`persist`](PersistedFile::persist) moves the elements into a file
/// behind a [`StorageHandle`] and verifies it; [`load`](PersistedFile::load)
/// reads them back and deletes the file. While persisted, reads go to the
/// file and every mutation fails with `IllegalState` until the set is loaded.
///
/// Range views of a persisted set (`sub_set`, `head_set`, `tail_set`) share
/// the handle and never delete the file.
pub struct PersistedFile<E: Record> {
    order: SortOrder<E>,
    memory: RewritableOrderedSet<E>,
    codec: Arc<dyn RecordCodec<E>>,
    options: PersistOptions,
    handle: Option<Arc<dyn StorageHandle>>,
    persisted: bool,
    /// Loaded with `load_retaining`: the file still matches `memory`.
    retained: bool,
    /// Shares another set's file; bounded by `range`.
    view: bool,
    range: RecordRange<E>,
}

impl<E: Record> PersistedFile<E> {
    pub fn new(order: SortOrder<E>) -> Self {
        Self::with_strategy(order, None)
    }

    pub fn with_strategy(order: SortOrder<E>, strategy: Option<RewriteStrategy<E>>) -> Self {
        Self {
            memory: RewritableOrderedSet::with_strategy(order.clone(), strategy),
            order,
            codec: Arc::new(FramedCodec),
            options: PersistOptions::default(),
            handle: None,
            persisted: false,
            retained: false,
            view: false,
            range: RecordRange::all(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn RecordCodec<E>>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_options(mut self, options: PersistOptions) -> Self {
        self.options = options;
        self
    }

    /// Wraps a file written earlier as an already persisted set.
    pub fn from_handle(
        handle: Arc<dyn StorageHandle>,
        order: SortOrder<E>,
        strategy: Option<RewriteStrategy<E>>,
    ) -> Self {
        let mut set = Self::with_strategy(order, strategy);
        set.handle = Some(handle);
        set.persisted = true;
        set
    }

    /// Empty, unpersisted set with the same order, strategy, codec and
    /// options.
    pub fn sibling(&self) -> Self {
        Self {
            order: self.order.clone(),
            memory: self.empty_memory(),
            codec: Arc::clone(&self.codec),
            options: self.options,
            handle: None,
            persisted: false,
            retained: false,
            view: false,
            range: RecordRange::all(),
        }
    }

    fn empty_memory(&self) -> RewritableOrderedSet<E> {
        RewritableOrderedSet::with_strategy(self.order.clone(), self.memory.strategy().cloned())
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_view(&self) -> bool {
        self.view
    }

    pub fn handle(&self) -> Option<&Arc<dyn StorageHandle>> {
        self.handle.as_ref()
    }

    pub fn options(&self) -> PersistOptions {
        self.options
    }

    pub fn strategy(&self) -> Option<&RewriteStrategy<E>> {
        self.memory.strategy()
    }

    fn require_handle(&self) -> Result<Arc<dyn StorageHandle>> {
        self.handle
            .clone()
            .ok_or_else(|| SortedSetError::IllegalState("persisted set has no storage handle".into()))
    }

    fn open_reader(&self) -> Result<Box<dyn RecordReader<E>>> {
        let handle = self.require_handle()?;
        let input = handle.open_read()?;
        self.codec.reader(input, &self.order, &self.range)
    }

    // -------------------- persist / verify --------------------

    /// Writes the in-memory elements through `handle`, verifies the file and
    /// switches to persisted state. A no-op if already persisted.
    ///
    /// On any failure the partial file is deleted, the handle dropped and
    /// the set left in memory, so the call can be retried with another
    /// handle.
    pub fn persist(&mut self, handle: Arc<dyn StorageHandle>) -> Result<()> {
        if self.persisted {
            return Ok(());
        }
        let started = Instant::now();
        debug!(elements = self.memory.len(), handle = ?handle, "persisting sorted set");

        let written = self.write_and_verify(&handle, self.memory.iter().cloned().map(Ok));
        match written {
            Ok(count) => {
                self.memory.clear();
                self.handle = Some(handle);
                self.persisted = true;
                self.retained = false;
                self.view = false;
                self.range = RecordRange::all();
                debug!(
                    count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "persisted sorted set"
                );
                Ok(())
            }
            Err(e) => {
                discard(&handle);
                self.handle = None;
                Err(e)
            }
        }
    }

    /// Persists again to the handle this set was loaded from.
    pub fn repersist(&mut self) -> Result<()> {
        let handle = self.require_handle()?;
        self.persist(handle)
    }

    /// Persists an ordered stream straight to `handle` without holding it
    /// in memory. `source` must yield elements in ascending order without
    /// duplicates. The set must be empty and unpersisted.
    pub fn persist_from<I>(&mut self, handle: Arc<dyn StorageHandle>, source: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<E>>,
    {
        if self.persisted || !self.memory.is_empty() {
            return Err(SortedSetError::IllegalState(
                "persist_from requires an empty, unpersisted set".into(),
            ));
        }
        let started = Instant::now();
        match self.write_and_verify(&handle, source.into_iter()) {
            Ok(count) => {
                self.handle = Some(handle);
                self.persisted = true;
                debug!(
                    count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "persisted sorted set from stream"
                );
                Ok(())
            }
            Err(e) => {
                discard(&handle);
                Err(e)
            }
        }
    }

    fn write_and_verify<I>(&self, handle: &Arc<dyn StorageHandle>, records: I) -> Result<usize>
    where
        I: Iterator<Item = Result<E>>,
    {
        let sample_len = self.options.sample_len();
        let mut sample = Vec::new();
        let mut writer = self.codec.writer(handle.open_write()?);
        for record in records {
            let e = record?;
            writer.write_record(&e)?;
            if sample.len() < sample_len {
                sample.push(e);
            }
        }
        let count = writer.finish()?;
        self.verify(handle.as_ref(), &sample, count)?;
        Ok(count)
    }

    fn verify(&self, handle: &dyn StorageHandle, sample: &[E], count: usize) -> Result<()> {
        if handle.size() == 0 {
            return Err(SortedSetError::Verification(
                "file is empty after write".into(),
            ));
        }

        if !sample.is_empty() {
            let mut reader = self
                .codec
                .reader(handle.open_read()?, &self.order, &RecordRange::all())?;
            for (i, expected) in sample.iter().enumerate() {
                match reader.read_record()? {
                    Some(actual) if self.order.equal(expected, &actual) => {}
                    Some(_) => {
                        return Err(SortedSetError::Verification(format!(
                            "element {i} read back differs from what was written"
                        )))
                    }
                    None => {
                        return Err(SortedSetError::Verification(format!(
                            "file ended after {i} of {} sampled elements",
                            sample.len()
                        )))
                    }
                }
            }
        }

        if self.options.verify_size {
            let mut input = handle.open_read()?;
            let stored = self.codec.read_count(input.as_mut())?;
            if stored != count {
                return Err(SortedSetError::Verification(format!(
                    "count trailer says {stored}, wrote {count}"
                )));
            }
        }
        Ok(())
    }

    // -------------------- load / unload --------------------

    fn read_all(&self) -> Result<RewritableOrderedSet<E>> {
        let mut loaded = self.empty_memory();
        let mut reader = self.open_reader()?;
        while let Some(e) = reader.read_record()? {
            loaded.add(e);
        }
        Ok(loaded)
    }

    /// Reads the file back into memory and deletes it. The handle is kept
    /// so [`repersist`](PersistedFile::repersist) can write to the same
    /// place. A view loads only its range and leaves the shared file alone.
    pub fn load(&mut self) -> Result<()> {
        if !self.persisted {
            return Ok(());
        }
        let loaded = self.read_all()?;
        if self.view {
            self.detach_view();
        } else {
            self.require_handle()?.delete()?;
        }
        self.memory = loaded;
        self.persisted = false;
        self.retained = false;
        Ok(())
    }

    /// Reads the file back into memory but keeps it, so an unmodified set
    /// can return to persisted state with [`unload`](PersistedFile::unload).
    pub fn load_retaining(&mut self) -> Result<()> {
        if !self.persisted {
            return Ok(());
        }
        self.memory = self.read_all()?;
        self.persisted = false;
        self.retained = true;
        Ok(())
    }

    /// Drops the in-memory copy made by `load_retaining` after checking the
    /// file still holds the same number of elements.
    pub fn unload(&mut self) -> Result<()> {
        if self.persisted {
            return Ok(());
        }
        if !self.retained {
            return Err(SortedSetError::IllegalState(
                "unload requires a set loaded with load_retaining and not modified since".into(),
            ));
        }
        if !self.view {
            let mut input = self.require_handle()?.open_read()?;
            let stored = self.codec.read_count(input.as_mut())?;
            if stored != self.memory.len() {
                return Err(SortedSetError::Verification(format!(
                    "file holds {stored} elements, memory holds {}",
                    self.memory.len()
                )));
            }
        }
        self.memory.clear();
        self.persisted = true;
        self.retained = false;
        Ok(())
    }

    fn detach_view(&mut self) {
        self.view = false;
        self.handle = None;
        self.range = RecordRange::all();
    }

    fn ensure_mutable(&mut self, op: &str) -> Result<()> {
        if self.persisted {
            return Err(SortedSetError::persisted(op));
        }
        if self.retained {
            // the retained file no longer matches once we mutate
            self.retained = false;
            if self.view {
                self.detach_view();
            } else {
                self.require_handle()?.delete()?;
            }
        }
        Ok(())
    }

    // -------------------- mutation --------------------

    pub fn add(&mut self, elem: E) -> Result<bool> {
        self.ensure_mutable("add to")?;
        Ok(self.memory.add(elem))
    }

    pub fn add_all<I: IntoIterator<Item = E>>(&mut self, elems: I) -> Result<bool> {
        self.ensure_mutable("add to")?;
        let mut changed = false;
        for e in elems {
            changed |= self.memory.add(e);
        }
        Ok(changed)
    }

    pub fn remove(&mut self, elem: &E) -> Result<bool> {
        self.ensure_mutable("remove from")?;
        Ok(self.memory.remove(elem))
    }

    /// Removes every element matching `pred`; returns how many were removed.
    pub fn remove_if<F: FnMut(&E) -> bool>(&mut self, mut pred: F) -> Result<usize> {
        self.ensure_mutable("remove from")?;
        Ok(self.memory.retain(|e| !pred(e)))
    }

    /// Empties the set. A persisted (or retained) file is deleted, except
    /// for a view, which only forgets its range.
    pub fn clear(&mut self) -> Result<()> {
        if (self.persisted || self.retained) && !self.view {
            if let Some(handle) = self.handle.take() {
                handle.delete()?;
            }
        }
        if self.view {
            self.detach_view();
        }
        self.memory.clear();
        self.persisted = false;
        self.retained = false;
        Ok(())
    }

    // -------------------- range views --------------------

    fn view_of(&self, from: Option<&E>, to: Option<&E>) -> Self {
        if self.persisted {
            let mut view = self.sibling();
            view.handle = self.handle.clone();
            view.persisted = true;
            view.view = true;
            view.range = self.range.narrow(&self.order, from, to);
            return view;
        }
        let memory = match (from, to) {
            (Some(f), Some(t)) => self.memory.sub_set(f, t),
            (None, Some(t)) => self.memory.head_set(t),
            (Some(f), None) => self.memory.tail_set(f),
            (None, None) => self.memory.clone(),
        };
        let mut copy = self.sibling();
        copy.memory = memory;
        copy
    }

    /// Elements in `[from, to)`.
    pub fn sub_set(&self, from: &E, to: &E) -> Self {
        self.view_of(Some(from), Some(to))
    }

    /// Elements `< to`.
    pub fn head_set(&self, to: &E) -> Self {
        self.view_of(None, Some(to))
    }

    /// Elements `>= from`.
    pub fn tail_set(&self, from: &E) -> Self {
        self.view_of(Some(from), None)
    }

    // -------------------- file scans --------------------

    fn scan_last(&self) -> Result<E> {
        let mut reader = self.open_reader()?;
        let mut last = None;
        while let Some(e) = reader.read_record()? {
            last = Some(e);
        }
        last.ok_or(SortedSetError::NoSuchElement(FetchKind::Last))
    }

    fn scan_contains(&self, elem: &E) -> Result<bool> {
        if !self.range.contains(&self.order, elem) {
            return Ok(false);
        }
        let mut reader = self.open_reader()?;
        while let Some(e) = reader.read_record()? {
            match self.order.compare(&e, elem) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(true),
                Ordering::Greater => return Ok(false),
            }
        }
        Ok(false)
    }

    fn scan_contains_all(&self, elems: &[E]) -> Result<bool> {
        let mut wanted = RewritableOrderedSet::new(self.order.clone());
        wanted.extend(elems.iter().cloned());
        if wanted.is_empty() {
            return Ok(true);
        }
        let mut reader = self.open_reader()?;
        while let Some(e) = reader.read_record()? {
            wanted.remove(&e);
            let Some(lowest) = wanted.first() else {
                return Ok(true);
            };
            // everything still wanted sorts before this element: missing
            if self.order.compare(lowest, &e) == Ordering::Less {
                return Ok(false);
            }
        }
        Ok(wanted.is_empty())
    }
}

fn discard(handle: &Arc<dyn StorageHandle>) {
    if let Err(e) = handle.delete() {
        warn!(handle = ?handle, error = %e, "failed to delete partially written file");
    }
}

impl<E: Record> SortedSet for PersistedFile<E> {
    type Elem = E;

    fn order(&self) -> &SortOrder<E> {
        &self.order
    }

    /// Reads the count trailer when persisted. Views of a persisted set
    /// cannot be sized without loading.
    fn len(&self) -> Result<usize> {
        if !self.persisted {
            return Ok(self.memory.len());
        }
        if self.view {
            return Err(SortedSetError::IllegalState(
                "size of a persisted range view is unknown; load() it first".into(),
            ));
        }
        let mut input = self.require_handle()?.open_read()?;
        self.codec.read_count(input.as_mut())
    }

    fn is_empty(&self) -> Result<bool> {
        if !self.persisted {
            return Ok(self.memory.is_empty());
        }
        Ok(self.open_reader()?.read_record()?.is_none())
    }

    fn first(&self) -> Result<E> {
        if !self.persisted {
            return SortedSet::first(&self.memory);
        }
        self.open_reader()?
            .read_record()?
            .ok_or(SortedSetError::NoSuchElement(FetchKind::First))
    }

    fn last(&self) -> Result<E> {
        if !self.persisted {
            return SortedSet::last(&self.memory);
        }
        self.scan_last()
    }

    fn contains(&self, elem: &E) -> Result<bool> {
        if !self.persisted {
            return Ok(self.memory.contains(elem));
        }
        self.scan_contains(elem)
    }

    fn contains_all(&self, elems: &[E]) -> Result<bool> {
        if !self.persisted {
            return Ok(elems.iter().all(|e| self.memory.contains(e)));
        }
        self.scan_contains_all(elems)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<E> + '_>> {
        if !self.persisted {
            return Ok(Box::new(MemoryCursor::new(&self.memory)));
        }
        Ok(Box::new(FileCursor::new(self.open_reader()?)))
    }

    fn cursor_mut(&mut self) -> Result<Box<dyn SetCursor<E> + '_>> {
        if self.persisted {
            return self.cursor();
        }
        self.ensure_mutable("remove from")?;
        Ok(Box::new(MemoryCursorMut::new(&mut self.memory)))
    }
}

impl<E: Record> fmt::Debug for PersistedFile<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedFile")
            .field("persisted", &self.persisted)
            .field("retained", &self.retained)
            .field("view", &self.view)
            .field("in_memory", &self.memory.len())
            .field("handle", &self.handle)
            .field("codec", &self.codec)
            .finish()
    }
}

/// Cursor over a persisted file. The read stream is closed as soon as the
/// file is exhausted or a read fails, and otherwise when the cursor drops.
pub struct FileCursor<E> {
    reader: Option<Box<dyn RecordReader<E>>>,
}

impl<E> FileCursor<E> {
    pub fn new(reader: Box<dyn RecordReader<E>>) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

impl<E> SetCursor<E> for FileCursor<E> {
    fn next_record(&mut self) -> Result<Option<E>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.read_record() {
            Ok(Some(e)) => Ok(Some(e)),
            Ok(None) => {
                self.reader = None;
                Ok(None)
            }
            Err(e) => {
                self.reader = None;
                Err(e)
            }
        }
    }
}
