use std::fmt;

use crate::error::{FetchKind, Result, SortedSetError};
use crate::merge::MergeSortIterator;
use crate::order::SortOrder;
use crate::rewritable::RewritableOrderedSet;
use crate::set::{SetCursor, SortedSet};

/// Several sorted sets sharing one order, read as a single deduplicated
/// set. Owns no storage: members are only added and removed whole.
pub struct UnionSortedSet<S: SortedSet> {
    order: SortOrder<S::Elem>,
    members: Vec<S>,
}

impl<S: SortedSet> UnionSortedSet<S>
where
    S::Elem: 'static,
{
    pub fn new(order: SortOrder<S::Elem>) -> Self {
        Self::from_members(order, Vec::new())
    }

    pub fn from_members(order: SortOrder<S::Elem>, members: Vec<S>) -> Self {
        Self { order, members }
    }

    pub fn push(&mut self, member: S) {
        self.members.push(member);
    }

    pub fn members(&self) -> &[S] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut Vec<S> {
        &mut self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn take_members(&mut self) -> Vec<S> {
        std::mem::take(&mut self.members)
    }

    pub fn into_members(self) -> Vec<S> {
        self.members
    }

    /// Merge over every member.
    pub fn merge(&self) -> Result<MergeSortIterator<'_, S::Elem>> {
        let cursors = self
            .members
            .iter()
            .map(|m| m.cursor())
            .collect::<Result<Vec<_>>>()?;
        Ok(MergeSortIterator::new(self.order.clone(), cursors))
    }

    /// Merge whose `remove` reaches into the members.
    pub fn merge_mut(&mut self) -> Result<MergeSortIterator<'_, S::Elem>> {
        let cursors = self
            .members
            .iter_mut()
            .map(|m| m.cursor_mut())
            .collect::<Result<Vec<_>>>()?;
        Ok(MergeSortIterator::new(self.order.clone(), cursors))
    }

    /// Collects one end value from each non-empty member into a scratch set.
    fn ends(&self, pick: fn(&S) -> Result<S::Elem>) -> Result<RewritableOrderedSet<S::Elem>> {
        let mut scratch = RewritableOrderedSet::new(self.order.clone());
        for member in &self.members {
            match pick(member) {
                Ok(v) => {
                    scratch.add(v);
                }
                Err(SortedSetError::NoSuchElement(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(scratch)
    }
}

impl<S: SortedSet> SortedSet for UnionSortedSet<S>
where
    S::Elem: 'static,
{
    type Elem = S::Elem;

    fn order(&self) -> &SortOrder<S::Elem> {
        &self.order
    }

    /// Walks the whole merge: O(total elements).
    fn len(&self) -> Result<usize> {
        self.merge()?.count_remaining()
    }

    fn is_empty(&self) -> Result<bool> {
        for member in &self.members {
            if !member.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn first(&self) -> Result<S::Elem> {
        self.ends(|m| m.first())?
            .first()
            .cloned()
            .ok_or(SortedSetError::NoSuchElement(FetchKind::First))
    }

    fn last(&self) -> Result<S::Elem> {
        self.ends(|m| m.last())?
            .last()
            .cloned()
            .ok_or(SortedSetError::NoSuchElement(FetchKind::Last))
    }

    fn contains(&self, elem: &S::Elem) -> Result<bool> {
        for member in &self.members {
            if member.contains(elem)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<S::Elem> + '_>> {
        Ok(Box::new(self.merge()?))
    }

    fn cursor_mut(&mut self) -> Result<Box<dyn SetCursor<S::Elem> + '_>> {
        Ok(Box::new(self.merge_mut()?))
    }
}

impl<S: SortedSet + fmt::Debug> fmt::Debug for UnionSortedSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionSortedSet")
            .field("members", &self.members)
            .finish()
    }
}
