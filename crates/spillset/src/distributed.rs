/// Recovery: a spilling set over one directory that adopts the segment
/// files already there.
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use config::SpillConfig;
use sortedset::{
    DirectoryHandleFactory, Record, Result, RewriteStrategy, SetCursor, SortOrder, SortedSet,
    StorageHandleFactory,
};
use tracing::{info, warn};

use crate::SpillingSortedSet;

/// [`SpillingSortedSet`] whose segments are `SortedSetFile.<seq>.<millis>`
/// files in a single directory.
///
/// # Recovery
///
/// On construction every matching file in the directory becomes a
/// persisted segment, in sequence order, and the factory's sequence counter
/// moves past the highest recovered sequence so new files never collide
/// with old ones.
pub struct DistributedSpillingSortedSet<E: Record> {
    inner: SpillingSortedSet<E>,
    factory: Arc<DirectoryHandleFactory>,
}

impl<E: Record> DistributedSpillingSortedSet<E> {
    /// Opens the set over `factory`'s directory, adopting existing files.
    ///
    /// Recovered files are trusted as written by a set with the same order
    /// and codec; they are not re-verified.
    pub fn new(
        order: SortOrder<E>,
        strategy: Option<RewriteStrategy<E>>,
        factory: Arc<DirectoryHandleFactory>,
        config: SpillConfig,
    ) -> Result<Self> {
        let factories: Vec<Arc<dyn StorageHandleFactory>> =
            vec![Arc::clone(&factory) as Arc<dyn StorageHandleFactory>];
        let mut inner = SpillingSortedSet::new(order, factories, config)?;
        if let Some(strategy) = strategy {
            inner = inner.with_strategy(strategy);
        }

        let existing = factory.existing_files()?;
        let max_seq = existing.iter().map(|(seq, _)| *seq).max().unwrap_or(0);
        let recovered = existing.len() as u64;
        for (_, path) in existing {
            inner.adopt_segment(factory.handle_for(path));
        }
        let next_seq = (recovered + 1).max(max_seq + 1);
        factory.set_next_sequence(next_seq);

        if recovered > 0 {
            info!(
                dir = %factory.dir().display(),
                segments = recovered,
                next_seq,
                "recovered existing segment files"
            );
        }
        Ok(Self { inner, factory })
    }

    #[must_use]
    pub fn factory(&self) -> &Arc<DirectoryHandleFactory> {
        &self.factory
    }

    pub fn inner(&self) -> &SpillingSortedSet<E> {
        &self.inner
    }

    pub fn into_inner(self) -> SpillingSortedSet<E> {
        self.inner
    }

    /// Clears the set, then deletes every former segment file again.
    ///
    /// # Errors
    ///
    /// The first failed second-pass delete, after every file was tried.
    pub fn clear(&mut self) -> Result<()> {
        let handles = self.inner.segment_handles();
        self.inner.clear();

        let mut first_error = None;
        for handle in handles {
            if let Err(e) = handle.delete() {
                warn!(handle = ?handle, error = %e, "failed to delete segment file");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl<E: Record> Deref for DistributedSpillingSortedSet<E> {
    type Target = SpillingSortedSet<E>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<E: Record> DerefMut for DistributedSpillingSortedSet<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<E: Record> SortedSet for DistributedSpillingSortedSet<E> {
    type Elem = E;

    fn order(&self) -> &SortOrder<E> {
        self.inner.order()
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn is_empty(&self) -> Result<bool> {
        self.inner.is_empty()
    }

    fn first(&self) -> Result<E> {
        self.inner.first()
    }

    fn last(&self) -> Result<E> {
        self.inner.last()
    }

    fn contains(&self, elem: &E) -> Result<bool> {
        self.inner.contains(elem)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<E> + '_>> {
        self.inner.cursor()
    }
}

impl<E: Record> std::fmt::Debug for DistributedSpillingSortedSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedSpillingSortedSet")
            .field("dir", &self.factory.dir())
            .field("next_seq", &self.factory.next_sequence())
            .field("inner", &self.inner)
            .finish()
    }
}
