use std::cmp::Ordering;

/// Compares two byte strings lexicographically, treating bytes as unsigned.
///
/// When one input is a prefix of the other the shorter one sorts first, so
/// `b"ab" < b"abc"` and `b"" < b"\x00"`.
#[must_use]
pub fn compare_bytes(a: &[u8], b: &[u8]) -> Ordering {
    let common = a.len().min(b.len());
    for i in 0..common {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Stateless comparator object wrapping [`compare_bytes`].
///
/// Useful where an ordering has to be passed around as a value, e.g. when
/// building a sort order for `Vec<u8>` elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteComparator;

impl ByteComparator {
    #[must_use]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare_bytes(a, b)
    }
}
