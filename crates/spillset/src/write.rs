/// Write path: `add()`, `add_all()`, `persist()` and the factory failover
/// shared with compaction and removal.
use std::sync::Arc;
use std::time::Instant;

use config::SpillConfig;
use sortedset::{
    PersistedFile, Record, Result, SortedSet, SortedSetError, StorageHandle,
    StorageHandleFactory,
};
use tracing::{debug, warn};

use crate::SpillingSortedSet;

impl<E: Record> SpillingSortedSet<E> {
    fn buffer_mut(&mut self) -> &mut PersistedFile<E> {
        let buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => self.new_file(),
        };
        self.buffer.insert(buffer)
    }

    /// Inserts `elem` into the buffer, persisting the buffer once it reaches
    /// the threshold.
    ///
    /// Returns whether the element was new to the buffer. Segments are not
    /// consulted, so an element already written out reports `true` again.
    ///
    /// # Errors
    ///
    /// A failed auto-persist is returned after the element was inserted; it
    /// stays buffered and the next persist retries it.
    pub fn add(&mut self, elem: E) -> Result<bool> {
        let added = self.buffer_mut().add(elem)?;
        self.mark_dirty();
        self.persist_if_full()?;
        Ok(added)
    }

    /// Inserts every element, then persists once if the buffer is full.
    pub fn add_all<I: IntoIterator<Item = E>>(&mut self, elems: I) -> Result<bool> {
        let changed = self.buffer_mut().add_all(elems)?;
        self.mark_dirty();
        self.persist_if_full()?;
        Ok(changed)
    }

    fn persist_if_full(&mut self) -> Result<()> {
        if self.buffer_len() >= self.config.buffer_persist_threshold {
            self.persist()?;
        }
        Ok(())
    }

    /// Writes the buffer out as a new segment.
    ///
    /// Factories are tried in order; an invalid one is skipped and each
    /// valid one gets `retries_per_factory + 1` attempts. On success the
    /// segment is appended and the segment list compacted if it grew past
    /// `max_open_segments`. An empty buffer is dropped without writing.
    ///
    /// # Errors
    ///
    /// `PersistFailed` once every attempt failed; the buffer is kept.
    pub fn persist(&mut self) -> Result<()> {
        let len = match &self.buffer {
            Some(buffer) => buffer.len()?,
            None => return Ok(()),
        };
        let Some(mut buffer) = self.buffer.take() else {
            return Ok(());
        };
        if len == 0 {
            return Ok(());
        }

        let started = Instant::now();
        let written = persist_with_factories(&self.factories, &self.config, "buffer", |handle| {
            buffer.persist(handle)
        });
        if let Err(e) = written {
            self.buffer = Some(buffer);
            return Err(e);
        }

        debug!(
            elements = len,
            segments = self.segments.member_count() + 1,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "buffer persisted as segment"
        );
        self.segments.push(buffer);
        self.compact(self.config.max_open_segments)
    }
}

/// Runs `attempt` with fresh handles until it succeeds.
///
/// Each factory that reports itself valid gets
/// [`SpillConfig::attempts_per_factory`] attempts. Transient failures
/// (I/O, verification, corruption) are logged, reported to the factory
/// through `on_failed_allocation` and retried; any other error is returned
/// at once.
pub(crate) fn persist_with_factories<F>(
    factories: &[Arc<dyn StorageHandleFactory>],
    config: &SpillConfig,
    what: &str,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(Arc<dyn StorageHandle>) -> Result<()>,
{
    let mut failures = 0usize;
    let mut last_error = String::from("no valid storage handle factory");

    for (index, factory) in factories.iter().enumerate() {
        if !factory.is_valid() {
            warn!(factory = index, what, "skipping invalid storage handle factory");
            continue;
        }
        for try_no in 1..=config.attempts_per_factory() {
            let handle = match factory.create_handle() {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(factory = index, attempt = try_no, what, error = %e, "failed to create storage handle");
                    factory.on_failed_allocation();
                    failures += 1;
                    last_error = e.to_string();
                    continue;
                }
            };
            match attempt(handle) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    warn!(factory = index, attempt = try_no, what, error = %e, "persist attempt failed");
                    factory.on_failed_allocation();
                    failures += 1;
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
    }

    Err(SortedSetError::PersistFailed(format!(
        "unable to persist {what} after {failures} failed attempts across {} factories: {last_error}",
        factories.len()
    )))
}
