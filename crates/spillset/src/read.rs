/// Read path: `iter()` and the [`SortedSet`] implementation.
///
/// All reads see the buffer and every segment merged; the distinct element
/// count is cached and only recomputed after a mutation.
use sortedset::{
    MergeSortIterator, PersistedFile, Record, Result, SetCursor, SortOrder, SortedSet,
    UnionSortedSet,
};

use crate::SpillingSortedSet;

impl<E: Record> SpillingSortedSet<E> {
    /// Buffer first, then every segment.
    fn parts(&self) -> impl Iterator<Item = &PersistedFile<E>> + '_ {
        self.buffer.iter().chain(self.segments.members().iter())
    }

    fn merged(&self) -> Result<MergeSortIterator<'_, E>> {
        let cursors = self
            .parts()
            .map(|part| part.cursor())
            .collect::<Result<Vec<_>>>()?;
        Ok(MergeSortIterator::new(self.order.clone(), cursors))
    }

    fn union_view(&self) -> UnionSortedSet<&PersistedFile<E>> {
        UnionSortedSet::from_members(self.order.clone(), self.parts().collect())
    }

    /// Every element in order, each once.
    ///
    /// When segments exist the buffer is persisted first, so the merge only
    /// reads stable files. A buffer on its own is read in place.
    ///
    /// # Errors
    ///
    /// Propagates a failed persist; nothing is read in that case.
    pub fn iter(&mut self) -> Result<MergeSortIterator<'_, E>> {
        if self.buffer.is_some() && self.has_persisted_data() {
            self.persist()?;
        }
        self.merged()
    }
}

impl<E: Record> SortedSet for SpillingSortedSet<E> {
    type Elem = E;

    fn order(&self) -> &SortOrder<E> {
        &self.order
    }

    /// Distinct elements. Walks every segment when the cached count is
    /// stale.
    fn len(&self) -> Result<usize> {
        if let Some(n) = self.size.get() {
            return Ok(n);
        }
        let n = self.merged()?.count_remaining()?;
        self.size.set(Some(n));
        Ok(n)
    }

    fn is_empty(&self) -> Result<bool> {
        if let Some(n) = self.size.get() {
            return Ok(n == 0);
        }
        self.union_view().is_empty()
    }

    fn first(&self) -> Result<E> {
        self.union_view().first()
    }

    fn last(&self) -> Result<E> {
        self.union_view().last()
    }

    fn contains(&self, elem: &E) -> Result<bool> {
        self.union_view().contains(elem)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<E> + '_>> {
        Ok(Box::new(self.merged()?))
    }
}
