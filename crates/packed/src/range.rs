use std::cell::Cell;
use std::cmp::Ordering;

use crate::comparator::compare_bytes;
use crate::set::{Cursor, Iter, PackedByteSet};
use crate::PackedSetError;

#[derive(Debug, Clone, Copy)]
struct Bounds {
    mod_count: u64,
    start: usize,
    end: usize,
}

/// Bounded view over a [`PackedByteSet`]: values `>= from` and `< to`.
///
/// The view owns only its bounds. Every operation takes the backing set, so
/// changes made through the set are visible through the view and values added
/// through the view land in the set. The resolved index bounds are cached per
/// modification count of the set.
#[derive(Debug, Clone)]
pub struct RangeView {
    from: Option<Vec<u8>>,
    to: Option<Vec<u8>>,
    cache: Cell<Option<Bounds>>,
}

impl RangeView {
    pub(crate) fn new(from: Option<Vec<u8>>, to: Option<Vec<u8>>) -> Self {
        Self {
            from,
            to,
            cache: Cell::new(None),
        }
    }

    pub fn lower_bound(&self) -> Option<&[u8]> {
        self.from.as_deref()
    }

    pub fn upper_bound(&self) -> Option<&[u8]> {
        self.to.as_deref()
    }

    /// True if `value` falls inside this view's bounds.
    pub fn in_range(&self, value: &[u8]) -> bool {
        if let Some(from) = &self.from {
            if compare_bytes(value, from) == Ordering::Less {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if compare_bytes(value, to) != Ordering::Less {
                return false;
            }
        }
        true
    }

    fn bounds(&self, set: &PackedByteSet) -> (usize, usize) {
        if let Some(b) = self.cache.get() {
            if b.mod_count == set.mod_count() {
                return (b.start, b.end);
            }
        }
        let start = match &self.from {
            Some(from) => set.binary_search(from).unwrap_or_else(|i| i),
            None => 0,
        };
        let end = match &self.to {
            Some(to) => set.binary_search(to).unwrap_or_else(|i| i),
            None => set.len(),
        };
        let end = end.max(start);
        self.cache.set(Some(Bounds {
            mod_count: set.mod_count(),
            start,
            end,
        }));
        (start, end)
    }

    pub fn len(&self, set: &PackedByteSet) -> usize {
        let (start, end) = self.bounds(set);
        end - start
    }

    pub fn is_empty(&self, set: &PackedByteSet) -> bool {
        self.len(set) == 0
    }

    pub fn first<'s>(&self, set: &'s PackedByteSet) -> Option<&'s [u8]> {
        let (start, end) = self.bounds(set);
        (start < end).then(|| set.value_at(start))
    }

    pub fn last<'s>(&self, set: &'s PackedByteSet) -> Option<&'s [u8]> {
        let (start, end) = self.bounds(set);
        (start < end).then(|| set.value_at(end - 1))
    }

    pub fn contains(&self, set: &PackedByteSet, value: &[u8]) -> bool {
        self.in_range(value) && set.contains(value)
    }

    pub fn iter<'s>(&self, set: &'s PackedByteSet) -> Iter<'s> {
        let (start, end) = self.bounds(set);
        set.iter_range(start, end)
    }

    pub fn cursor(&self, set: &PackedByteSet) -> Cursor {
        let (start, end) = self.bounds(set);
        Cursor::new(set.mod_count(), start, end)
    }

    /// Adds `value` to the backing set; rejects values outside the bounds.
    pub fn add(&self, set: &mut PackedByteSet, value: &[u8]) -> Result<bool, PackedSetError> {
        if !self.in_range(value) {
            return Err(PackedSetError::OutOfRange);
        }
        set.add(value)
    }

    /// Removes `value` from the backing set if it lies inside the bounds.
    pub fn remove(&self, set: &mut PackedByteSet, value: &[u8]) -> bool {
        self.in_range(value) && set.remove(value)
    }

    /// Narrows this view; the result is bounded by both views.
    pub fn sub_set(&self, from: &[u8], to: &[u8]) -> RangeView {
        RangeView::new(Some(self.tighter_from(from)), Some(self.tighter_to(to)))
    }

    pub fn head_set(&self, to: &[u8]) -> RangeView {
        RangeView::new(self.from.clone(), Some(self.tighter_to(to)))
    }

    pub fn tail_set(&self, from: &[u8]) -> RangeView {
        RangeView::new(Some(self.tighter_from(from)), self.to.clone())
    }

    fn tighter_from(&self, from: &[u8]) -> Vec<u8> {
        match &self.from {
            Some(own) if compare_bytes(own, from) == Ordering::Greater => own.clone(),
            _ => from.to_vec(),
        }
    }

    fn tighter_to(&self, to: &[u8]) -> Vec<u8> {
        match &self.to {
            Some(own) if compare_bytes(own, to) == Ordering::Less => own.clone(),
            _ => to.to_vec(),
        }
    }
}
