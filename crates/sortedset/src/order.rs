use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Shared total order over elements of type `E`.
///
/// Cloning is cheap; every set, view and merge built from one set shares the
/// same comparator instance.
pub struct SortOrder<E: ?Sized> {
    cmp: Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>,
}

impl<E: ?Sized> SortOrder<E> {
    pub fn new<F>(cmp: F) -> Self
    where
        F: Fn(&E, &E) -> Ordering + Send + Sync + 'static,
    {
        Self { cmp: Arc::new(cmp) }
    }

    #[inline]
    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        (self.cmp)(a, b)
    }

    #[inline]
    pub fn equal(&self, a: &E, b: &E) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl<E: ?Sized + 'static> SortOrder<E> {
    pub fn reversed(&self) -> Self {
        let inner = self.clone();
        Self::new(move |a, b| inner.compare(b, a))
    }
}

impl<E: Ord + ?Sized + 'static> SortOrder<E> {
    /// The element type's own `Ord`.
    pub fn natural() -> Self {
        Self::new(|a: &E, b: &E| a.cmp(b))
    }
}

impl SortOrder<Vec<u8>> {
    /// Unsigned lexicographic byte order, shorter prefix first.
    pub fn bytes() -> Self {
        Self::new(|a: &Vec<u8>, b: &Vec<u8>| packed::compare_bytes(a, b))
    }
}

impl<E: ?Sized> Clone for SortOrder<E> {
    fn clone(&self) -> Self {
        Self {
            cmp: Arc::clone(&self.cmp),
        }
    }
}

impl<E: ?Sized> fmt::Debug for SortOrder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SortOrder")
    }
}

/// Decides, for an incoming element equal to one already stored, whether the
/// incoming one replaces it. Called as `strategy(existing, incoming)`.
pub type RewriteStrategy<E> = Arc<dyn Fn(&E, &E) -> bool + Send + Sync>;
