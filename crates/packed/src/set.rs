use std::cmp::Ordering;
use std::fmt;

use crate::comparator::compare_bytes;
use crate::range::RangeView;
use crate::PackedSetError;

/// Longest value a [`PackedByteSet`] accepts; lengths are stored in one byte.
pub const MAX_VALUE_LEN: usize = 127;

const INITIAL_DATA_CAPACITY: usize = 1024;
const INITIAL_INDEX_CAPACITY: usize = 64;

/// Sorted set of short byte strings packed into a single growable buffer.
///
/// Values are appended to `data` in insertion order; `offsets` and `lens`
/// form the sorted index. Both index vectors always have the same length,
/// which is the number of elements in the set.
pub struct PackedByteSet {
    data: Vec<u8>,
    offsets: Vec<u32>,
    lens: Vec<u8>,
    mod_count: u64,
}

impl PackedByteSet {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_DATA_CAPACITY, INITIAL_INDEX_CAPACITY)
    }

    pub fn with_capacity(data_bytes: usize, entries: usize) -> Self {
        Self {
            data: Vec::with_capacity(data_bytes),
            offsets: Vec::with_capacity(entries),
            lens: Vec::with_capacity(entries),
            mod_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Bytes of packed value data currently in use.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Number of structural modifications since creation.
    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    /// Value at sorted position `index`.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len() {
            return None;
        }
        Some(self.value_at(index))
    }

    pub(crate) fn value_at(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = start + self.lens[index] as usize;
        &self.data[start..end]
    }

    /// Binary search over the sorted index.
    ///
    /// `Ok(i)` is the position of an equal value; `Err(i)` is the position
    /// where `term` would have to be inserted to keep the index sorted.
    pub fn binary_search(&self, term: &[u8]) -> Result<usize, usize> {
        let mut low = 0usize;
        let mut high = self.len();
        while low < high {
            let mid = low + (high - low) / 2;
            match compare_bytes(self.value_at(mid), term) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    pub fn contains(&self, value: &[u8]) -> bool {
        self.binary_search(value).is_ok()
    }

    /// Inserts `value`. Returns `Ok(false)` if an equal value was present.
    pub fn add(&mut self, value: &[u8]) -> Result<bool, PackedSetError> {
        if value.len() > MAX_VALUE_LEN {
            return Err(PackedSetError::ValueTooLong {
                len: value.len(),
                max: MAX_VALUE_LEN,
            });
        }
        let insert_at = match self.binary_search(value) {
            Ok(_) => return Ok(false),
            Err(i) => i,
        };

        let offset = self.data.len();
        if offset + value.len() > u32::MAX as usize {
            return Err(PackedSetError::CapacityExceeded(offset));
        }
        if offset + value.len() > self.data.capacity() {
            // grow geometrically, but always enough for this value
            let extra = self.data.capacity().max(value.len());
            self.data.reserve(extra);
        }
        self.data.extend_from_slice(value);
        self.offsets.insert(insert_at, offset as u32);
        self.lens.insert(insert_at, value.len() as u8);
        self.mod_count += 1;
        Ok(true)
    }

    /// Removes `value` if present.
    pub fn remove(&mut self, value: &[u8]) -> bool {
        match self.binary_search(value) {
            Ok(index) => {
                self.remove_at(index);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn remove_at(&mut self, index: usize) {
        let start = self.offsets[index];
        let len = self.lens[index];
        let from = start as usize;
        self.data.drain(from..from + len as usize);
        for off in self.offsets.iter_mut() {
            if *off > start {
                *off -= u32::from(len);
            }
        }
        self.offsets.remove(index);
        self.lens.remove(index);
        self.mod_count += 1;
    }

    pub fn first(&self) -> Option<&[u8]> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.len().checked_sub(1).map(|i| self.value_at(i))
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.offsets.clear();
        self.lens.clear();
        self.mod_count += 1;
    }

    /// Borrowing iterator in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            front: 0,
            back: self.len(),
        }
    }

    pub(crate) fn iter_range(&self, start: usize, end: usize) -> Iter<'_> {
        Iter {
            set: self,
            front: start,
            back: end,
        }
    }

    /// Detached fail-fast cursor over the whole set.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.mod_count, 0, self.len())
    }

    /// View of values `>= from` and `< to`.
    pub fn sub_set(&self, from: &[u8], to: &[u8]) -> RangeView {
        RangeView::new(Some(from.to_vec()), Some(to.to_vec()))
    }

    /// View of values `< to`.
    pub fn head_set(&self, to: &[u8]) -> RangeView {
        RangeView::new(None, Some(to.to_vec()))
    }

    /// View of values `>= from`.
    pub fn tail_set(&self, from: &[u8]) -> RangeView {
        RangeView::new(Some(from.to_vec()), None)
    }

    pub(crate) fn check_mod_count(&self, expected: u64) -> Result<(), PackedSetError> {
        if self.mod_count != expected {
            return Err(PackedSetError::ConcurrentModification);
        }
        Ok(())
    }
}

impl Default for PackedByteSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PackedByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedByteSet")
            .field("len", &self.len())
            .field("data_len", &self.data.len())
            .field("data_capacity", &self.data.capacity())
            .field("mod_count", &self.mod_count)
            .finish()
    }
}

impl<'a> IntoIterator for &'a PackedByteSet {
    type Item = &'a [u8];
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over a [`PackedByteSet`] or a slice of its index.
#[derive(Clone)]
pub struct Iter<'a> {
    set: &'a PackedByteSet,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let v = self.set.value_at(self.front);
        self.front += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back.saturating_sub(self.front);
        (n, Some(n))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.set.value_at(self.back))
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Cursor that does not borrow the set between calls.
///
/// Every call takes the set and fails with
/// [`PackedSetError::ConcurrentModification`] if it was modified by anything
/// other than this cursor since the cursor was created.
#[derive(Debug, Clone)]
pub struct Cursor {
    expected_mod_count: u64,
    next: usize,
    end: usize,
    current: Option<usize>,
}

impl Cursor {
    pub(crate) fn new(expected_mod_count: u64, start: usize, end: usize) -> Self {
        Self {
            expected_mod_count,
            next: start,
            end,
            current: None,
        }
    }

    pub fn has_next(&self, set: &PackedByteSet) -> Result<bool, PackedSetError> {
        set.check_mod_count(self.expected_mod_count)?;
        Ok(self.next < self.end)
    }

    pub fn next<'s>(&mut self, set: &'s PackedByteSet) -> Result<Option<&'s [u8]>, PackedSetError> {
        set.check_mod_count(self.expected_mod_count)?;
        if self.next >= self.end {
            self.current = None;
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        self.current = Some(index);
        Ok(Some(set.value_at(index)))
    }

    /// Removes the value most recently returned by [`Cursor::next`].
    pub fn remove(&mut self, set: &mut PackedByteSet) -> Result<(), PackedSetError> {
        set.check_mod_count(self.expected_mod_count)?;
        let index = self.current.take().ok_or(PackedSetError::NoCurrent)?;
        set.remove_at(index);
        self.next -= 1;
        self.end -= 1;
        self.expected_mod_count = set.mod_count();
        Ok(())
    }
}
