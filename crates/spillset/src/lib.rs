//! # Spillset - a sorted set that spills to storage
//!
//! [`SpillingSortedSet`] keeps new elements in an in-memory buffer and, once
//! the buffer reaches `buffer_persist_threshold`, writes it out as a sorted,
//! verified segment file through the first handle factory that accepts it.
//! Reads merge the buffer and every segment into one deduplicated stream.
//!
//! ```text
//!  add() ──► buffer (PersistedFile, in memory)
//!              │  len >= threshold
//!              ▼
//!           persist() ── factory 1 ──x── factory 2 ──✓
//!              │                (retries + 1 attempts each)
//!              ▼
//!           segments [seg, seg, seg, ...]
//!              │  count > max_open_segments
//!              ▼
//!           compact() ── smallest segments merged into one
//!
//!  iter() / contains() / first() ──► MergeSortIterator(buffer + segments)
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                                |
//! |-----------------|--------------------------------------------------------|
//! | `lib.rs`        | `SpillingSortedSet` struct, constructor, accessors, `Debug` |
//! | [`write`]       | `add()`, `add_all()`, `persist()`, factory failover     |
//! | [`read`]        | `iter()`, `SortedSet` impl, size cache                  |
//! | [`remove`]      | `remove()`, `remove_all()`, `retain_all()`, `remove_if()`, `clear()` |
//! | [`compaction`]  | `compact()` of the smallest segments                    |
//! | [`distributed`] | `DistributedSpillingSortedSet`: recovery from a directory |
//!
//! One owner at a time: nothing here locks, and every persist, load and
//! compaction runs on the calling thread.

mod compaction;
mod distributed;
mod read;
mod remove;
mod write;

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use config::SpillConfig;
use sortedset::{
    FramedCodec, PersistedFile, Record, RecordCodec, RewriteStrategy, SortOrder,
    SortedSetError, StorageHandle, StorageHandleFactory, UnionSortedSet,
};

pub use distributed::DistributedSpillingSortedSet;
pub use sortedset::Result;

/// Sorted set with a bounded in-memory buffer and file-backed segments.
///
/// # Write Path
///
/// 1. Insert into the buffer (created on first use).
/// 2. If the buffer holds `buffer_persist_threshold` elements, persist it
///    through the handle factories, in order, with `retries_per_factory`
///    retries each.
/// 3. Append the new segment and compact if more than `max_open_segments`
///    are open.
///
/// A failed persist leaves the buffer in memory, so the call can be
/// retried.
///
/// # Read Path
///
/// Every read merges the buffer with all segments; a value held by several
/// of them is seen once.
pub struct SpillingSortedSet<E: Record> {
    pub(crate) order: SortOrder<E>,
    pub(crate) strategy: Option<RewriteStrategy<E>>,
    pub(crate) codec: Arc<dyn RecordCodec<E>>,
    /// Elements not yet written to a segment. `None` until the first add
    /// after a persist.
    pub(crate) buffer: Option<PersistedFile<E>>,
    pub(crate) segments: UnionSortedSet<PersistedFile<E>>,
    pub(crate) factories: Vec<Arc<dyn StorageHandleFactory>>,
    pub(crate) config: SpillConfig,
    /// Distinct element count; `None` when a mutation made it stale.
    pub(crate) size: Cell<Option<usize>>,
}

impl<E: Record> fmt::Debug for SpillingSortedSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillingSortedSet")
            .field("buffer_len", &self.buffer_len())
            .field("segment_count", &self.segment_count())
            .field("factory_count", &self.factories.len())
            .field("cached_size", &self.size.get())
            .field("config", &self.config)
            .field("codec", &self.codec)
            .finish()
    }
}

impl<E: Record> SpillingSortedSet<E> {
    /// Creates an empty set that persists through `factories`, tried in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` does not validate or no factory
    /// was supplied.
    pub fn new(
        order: SortOrder<E>,
        factories: Vec<Arc<dyn StorageHandleFactory>>,
        config: SpillConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SortedSetError::InvalidArgument(e.to_string()))?;
        if factories.is_empty() {
            return Err(SortedSetError::InvalidArgument(
                "at least one storage handle factory is required".into(),
            ));
        }
        Ok(Self {
            segments: UnionSortedSet::new(order.clone()),
            order,
            strategy: None,
            codec: Arc::new(FramedCodec),
            buffer: None,
            factories,
            config,
            size: Cell::new(Some(0)),
        })
    }

    /// Policy applied when an element equal to a buffered one is added.
    /// Only affects buffers created after the call.
    pub fn with_strategy(mut self, strategy: RewriteStrategy<E>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Record codec for segments written after the call.
    pub fn with_codec(mut self, codec: Arc<dyn RecordCodec<E>>) -> Self {
        self.codec = codec;
        self
    }

    /// Empty, unpersisted file configured like every segment of this set.
    pub(crate) fn new_file(&self) -> PersistedFile<E> {
        PersistedFile::with_strategy(self.order.clone(), self.strategy.clone())
            .with_codec(Arc::clone(&self.codec))
            .with_options(self.config.persist_options)
    }

    /// Adopts a file written earlier as a segment.
    pub(crate) fn adopt_segment(&mut self, handle: Arc<dyn StorageHandle>) {
        let segment = PersistedFile::from_handle(handle, self.order.clone(), self.strategy.clone())
            .with_codec(Arc::clone(&self.codec))
            .with_options(self.config.persist_options);
        self.segments.push(segment);
        self.size.set(None);
    }

    pub(crate) fn mark_dirty(&self) {
        self.size.set(None);
    }

    #[must_use]
    pub fn config(&self) -> &SpillConfig {
        &self.config
    }

    #[must_use]
    pub fn factories(&self) -> &[Arc<dyn StorageHandleFactory>] {
        &self.factories
    }

    /// Returns `true` once at least one segment has been written.
    #[must_use]
    pub fn has_persisted_data(&self) -> bool {
        self.segments.member_count() > 0
    }

    /// Returns `true` when nothing is waiting in the buffer.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.buffer_len() == 0
    }

    /// Number of elements waiting in the in-memory buffer.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer
            .as_ref()
            .and_then(|b| sortedset::SortedSet::len(b).ok())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.member_count()
    }

    /// Backing handles of every persisted segment, oldest compaction first.
    pub fn segment_handles(&self) -> Vec<Arc<dyn StorageHandle>> {
        self.segments
            .members()
            .iter()
            .filter_map(|s| s.handle().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests;
