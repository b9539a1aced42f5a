use crate::error::{FetchKind, Result, SortedSetError};
use crate::order::SortOrder;
use crate::rewritable::RewritableOrderedSet;

/// Pull-style cursor over a sorted set.
///
/// Cursors hold whatever resources their source needs (an open file for a
/// persisted set) and release them when exhausted or dropped.
pub trait SetCursor<E> {
    /// Next element in ascending order, `None` once exhausted.
    fn next_record(&mut self) -> Result<Option<E>>;

    /// Like [`SetCursor::next_record`], but an exhausted cursor is an error.
    fn next_required(&mut self) -> Result<E> {
        self.next_record()?
            .ok_or(SortedSetError::NoSuchElement(FetchKind::Next))
    }

    /// Removes the element most recently returned from the underlying set.
    fn remove_current(&mut self) -> Result<()> {
        Err(SortedSetError::Unsupported("remove through this cursor"))
    }
}

impl<E, C: SetCursor<E> + ?Sized> SetCursor<E> for Box<C> {
    fn next_record(&mut self) -> Result<Option<E>> {
        (**self).next_record()
    }

    fn remove_current(&mut self) -> Result<()> {
        (**self).remove_current()
    }
}

/// Read side shared by every sorted set in this crate.
///
/// Methods are fallible because a set may be backed by a file.
pub trait SortedSet {
    type Elem: Clone;

    fn order(&self) -> &SortOrder<Self::Elem>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        match self.first() {
            Ok(_) => Ok(false),
            Err(SortedSetError::NoSuchElement(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn first(&self) -> Result<Self::Elem>;

    fn last(&self) -> Result<Self::Elem>;

    fn contains(&self, elem: &Self::Elem) -> Result<bool>;

    fn contains_all(&self, elems: &[Self::Elem]) -> Result<bool> {
        for e in elems {
            if !self.contains(e)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<Self::Elem> + '_>>;

    /// Cursor whose `remove_current` mutates this set, where supported.
    fn cursor_mut(&mut self) -> Result<Box<dyn SetCursor<Self::Elem> + '_>> {
        self.cursor()
    }

    /// Every element, in order.
    fn to_vec(&self) -> Result<Vec<Self::Elem>> {
        let mut cursor = self.cursor()?;
        let mut out = Vec::new();
        while let Some(e) = cursor.next_record()? {
            out.push(e);
        }
        Ok(out)
    }
}

impl<S: SortedSet + ?Sized> SortedSet for &S {
    type Elem = S::Elem;

    fn order(&self) -> &SortOrder<Self::Elem> {
        (**self).order()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn is_empty(&self) -> Result<bool> {
        (**self).is_empty()
    }

    fn first(&self) -> Result<Self::Elem> {
        (**self).first()
    }

    fn last(&self) -> Result<Self::Elem> {
        (**self).last()
    }

    fn contains(&self, elem: &Self::Elem) -> Result<bool> {
        (**self).contains(elem)
    }

    fn contains_all(&self, elems: &[Self::Elem]) -> Result<bool> {
        (**self).contains_all(elems)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<Self::Elem> + '_>> {
        (**self).cursor()
    }
}

impl<S: SortedSet + ?Sized> SortedSet for Box<S> {
    type Elem = S::Elem;

    fn order(&self) -> &SortOrder<Self::Elem> {
        (**self).order()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn is_empty(&self) -> Result<bool> {
        (**self).is_empty()
    }

    fn first(&self) -> Result<Self::Elem> {
        (**self).first()
    }

    fn last(&self) -> Result<Self::Elem> {
        (**self).last()
    }

    fn contains(&self, elem: &Self::Elem) -> Result<bool> {
        (**self).contains(elem)
    }

    fn contains_all(&self, elems: &[Self::Elem]) -> Result<bool> {
        (**self).contains_all(elems)
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<Self::Elem> + '_>> {
        (**self).cursor()
    }

    fn cursor_mut(&mut self) -> Result<Box<dyn SetCursor<Self::Elem> + '_>> {
        (**self).cursor_mut()
    }
}

// -------------------- in-memory cursors --------------------

/// Read-only cursor over a [`RewritableOrderedSet`].
pub(crate) struct MemoryCursor<'a, E> {
    inner: Box<dyn Iterator<Item = &'a E> + 'a>,
}

impl<'a, E: Clone> MemoryCursor<'a, E> {
    pub(crate) fn new(set: &'a RewritableOrderedSet<E>) -> Self {
        Self {
            inner: Box::new(set.iter()),
        }
    }
}

impl<E: Clone> SetCursor<E> for MemoryCursor<'_, E> {
    fn next_record(&mut self) -> Result<Option<E>> {
        Ok(self.inner.next().cloned())
    }
}

/// Cursor that can remove from the set it walks.
///
/// Position is tracked by value, so removals never invalidate it.
pub(crate) struct MemoryCursorMut<'a, E> {
    set: &'a mut RewritableOrderedSet<E>,
    current: Option<E>,
    started: bool,
}

impl<'a, E: Clone> MemoryCursorMut<'a, E> {
    pub(crate) fn new(set: &'a mut RewritableOrderedSet<E>) -> Self {
        Self {
            set,
            current: None,
            started: false,
        }
    }
}

impl<E: Clone> SetCursor<E> for MemoryCursorMut<'_, E> {
    fn next_record(&mut self) -> Result<Option<E>> {
        let next = match (&self.current, self.started) {
            (_, false) => self.set.first().cloned(),
            (Some(cur), true) => self.set.iter_after(cur).next().cloned(),
            (None, true) => None,
        };
        self.started = true;
        self.current = next.clone();
        Ok(next)
    }

    fn remove_current(&mut self) -> Result<()> {
        let cur = self
            .current
            .as_ref()
            .ok_or_else(|| SortedSetError::IllegalState("no current element to remove".into()))?;
        self.set.remove(cur);
        Ok(())
    }
}

impl<E: Clone + 'static> SortedSet for RewritableOrderedSet<E> {
    type Elem = E;

    fn order(&self) -> &SortOrder<E> {
        RewritableOrderedSet::order(self)
    }

    fn len(&self) -> Result<usize> {
        Ok(RewritableOrderedSet::len(self))
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(RewritableOrderedSet::is_empty(self))
    }

    fn first(&self) -> Result<E> {
        RewritableOrderedSet::first(self)
            .cloned()
            .ok_or(SortedSetError::NoSuchElement(FetchKind::First))
    }

    fn last(&self) -> Result<E> {
        RewritableOrderedSet::last(self)
            .cloned()
            .ok_or(SortedSetError::NoSuchElement(FetchKind::Last))
    }

    fn contains(&self, elem: &E) -> Result<bool> {
        Ok(RewritableOrderedSet::contains(self, elem))
    }

    fn cursor(&self) -> Result<Box<dyn SetCursor<E> + '_>> {
        Ok(Box::new(MemoryCursor::new(self)))
    }

    fn cursor_mut(&mut self) -> Result<Box<dyn SetCursor<E> + '_>> {
        Ok(Box::new(MemoryCursorMut::new(self)))
    }
}
