//! # Packed - byte-array ordering and a packed sorted byte set
//!
//! Leaf crate shared by the sorted set layers above it.
//!
//! * [`compare_bytes`] / [`ByteComparator`] order opaque byte strings
//!   lexicographically (unsigned), with a strict prefix sorting first.
//! * [`PackedByteSet`] keeps small byte strings (at most
//!   [`MAX_VALUE_LEN`] bytes each) in one contiguous buffer with a parallel
//!   sorted index, so a set of millions of short terms costs one allocation
//!   for the bytes plus five bytes of index per entry.
//!
//! ## Layout
//!
//! ```text
//! data:    [ b"pear" | b"apple" | b"fig" ]           (insertion order)
//! offsets: [ 4, 9, 0 ]                               (value order)
//! lens:    [ 5, 3, 4 ]
//! ```
//!
//! The index is kept sorted by the bytes it points at; lookups are binary
//! searches over the index. Removing a value closes its gap in `data` and
//! shifts every later offset down by the removed length.
//!
//! ## Fail-fast traversal
//!
//! [`PackedByteSet::iter`] borrows the set, so the borrow checker already
//! rules out mutation while iterating. [`Cursor`] and [`RangeView`] are
//! detached: they take the set as an argument on every call and compare the
//! set's modification counter against the one they last saw, returning
//! [`PackedSetError::ConcurrentModification`] on mismatch.

mod comparator;
mod range;
mod set;

pub use comparator::{compare_bytes, ByteComparator};
pub use range::RangeView;
pub use set::{Cursor, Iter, PackedByteSet, MAX_VALUE_LEN};

use thiserror::Error;

/// Errors raised by [`PackedByteSet`] and its views.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackedSetError {
    /// The value is longer than [`MAX_VALUE_LEN`] bytes.
    #[error("value of {len} bytes exceeds the maximum of {max} bytes")]
    ValueTooLong { len: usize, max: usize },

    /// The packed buffer cannot be addressed with 32-bit offsets any more.
    #[error("packed buffer is full ({0} bytes)")]
    CapacityExceeded(usize),

    /// A range view was asked to hold a value outside its bounds.
    #[error("value is outside the bounds of this view")]
    OutOfRange,

    /// The set was structurally modified behind a cursor or view.
    #[error("set was modified during traversal")]
    ConcurrentModification,

    /// `Cursor::remove` called before `next` or twice in a row.
    #[error("no current element to remove")]
    NoCurrent,
}
