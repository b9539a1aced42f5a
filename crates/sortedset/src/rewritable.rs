use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;

use crate::order::{RewriteStrategy, SortOrder};

/// Element paired with the order it is sorted by, so a `BTreeSet` can hold
/// elements under a runtime comparator.
struct OrderKey<E> {
    elem: E,
    order: SortOrder<E>,
}

impl<E> PartialEq for OrderKey<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for OrderKey<E> {}

impl<E> PartialOrd for OrderKey<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for OrderKey<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.elem, &other.elem)
    }
}

/// Ordered set with a pluggable policy for equal-element collisions.
///
/// Without a strategy the first stored instance of an element wins, like any
/// ordered set. With one, `strategy(existing, incoming)` decides whether the
/// incoming instance becomes the stored one.
///
/// Range operations return owned sets holding clones of the selected
/// elements; they share the order and strategy with this set.
pub struct RewritableOrderedSet<E> {
    items: BTreeSet<OrderKey<E>>,
    order: SortOrder<E>,
    strategy: Option<RewriteStrategy<E>>,
}

impl<E: Clone> RewritableOrderedSet<E> {
    pub fn new(order: SortOrder<E>) -> Self {
        Self::with_strategy(order, None)
    }

    pub fn with_strategy(order: SortOrder<E>, strategy: Option<RewriteStrategy<E>>) -> Self {
        Self {
            items: BTreeSet::new(),
            order,
            strategy,
        }
    }

    pub fn order(&self) -> &SortOrder<E> {
        &self.order
    }

    pub fn strategy(&self) -> Option<&RewriteStrategy<E>> {
        self.strategy.as_ref()
    }

    fn key(&self, elem: E) -> OrderKey<E> {
        OrderKey {
            elem,
            order: self.order.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts `elem`, returning `true` if no equal element was present.
    ///
    /// On a collision the strategy (if any) may swap in the incoming
    /// instance; that still returns `false`.
    pub fn add(&mut self, elem: E) -> bool {
        let key = self.key(elem);
        let replace = self.items.get(&key).map(|existing| {
            self.strategy
                .as_ref()
                .is_some_and(|s| s(&existing.elem, &key.elem))
        });
        match replace {
            None => {
                self.items.insert(key);
                true
            }
            Some(true) => {
                self.items.replace(key);
                false
            }
            Some(false) => false,
        }
    }

    pub fn remove(&mut self, elem: &E) -> bool {
        let key = self.key(elem.clone());
        self.items.remove(&key)
    }

    pub fn contains(&self, elem: &E) -> bool {
        self.get(elem).is_some()
    }

    /// The stored instance equal to `elem`.
    pub fn get(&self, elem: &E) -> Option<&E> {
        let key = self.key(elem.clone());
        self.items.get(&key).map(|k| &k.elem)
    }

    pub fn first(&self) -> Option<&E> {
        self.items.first().map(|k| &k.elem)
    }

    pub fn last(&self) -> Option<&E> {
        self.items.last().map(|k| &k.elem)
    }

    pub fn pop_first(&mut self) -> Option<E> {
        self.items.pop_first().map(|k| k.elem)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Keeps only elements for which `keep` returns true; returns how many
    /// were removed.
    pub fn retain<F: FnMut(&E) -> bool>(&mut self, mut keep: F) -> usize {
        let before = self.items.len();
        self.items.retain(|k| keep(&k.elem));
        before - self.items.len()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &E> + '_ {
        self.items.iter().map(|k| &k.elem)
    }

    /// Elements strictly after `elem`.
    pub fn iter_after(&self, elem: &E) -> impl Iterator<Item = &E> + '_ {
        let key = self.key(elem.clone());
        self.items
            .range((Bound::Excluded(key), Bound::Unbounded))
            .map(|k| &k.elem)
    }

    fn slice(&self, from: Bound<&E>, to: Bound<&E>) -> Self {
        let mut out = Self::with_strategy(self.order.clone(), self.strategy.clone());
        if let (Bound::Included(f) | Bound::Excluded(f), Bound::Included(t) | Bound::Excluded(t)) =
            (from, to)
        {
            // BTreeSet::range panics on inverted bounds
            if self.order.compare(f, t) == Ordering::Greater {
                return out;
            }
        }
        let lower = from.map(|e| self.key(e.clone()));
        let upper = to.map(|e| self.key(e.clone()));
        for k in self.items.range((lower, upper)) {
            out.items.insert(self.key(k.elem.clone()));
        }
        out
    }

    /// Elements in `[from, to)`.
    pub fn sub_set(&self, from: &E, to: &E) -> Self {
        self.slice(Bound::Included(from), Bound::Excluded(to))
    }

    /// Elements `< to`.
    pub fn head_set(&self, to: &E) -> Self {
        self.slice(Bound::Unbounded, Bound::Excluded(to))
    }

    /// Elements `>= from`.
    pub fn tail_set(&self, from: &E) -> Self {
        self.slice(Bound::Included(from), Bound::Unbounded)
    }
}

impl<E: Clone> Clone for RewritableOrderedSet<E> {
    fn clone(&self) -> Self {
        let mut out = Self::with_strategy(self.order.clone(), self.strategy.clone());
        for k in &self.items {
            out.items.insert(self.key(k.elem.clone()));
        }
        out
    }
}

impl<E: Clone> Extend<E> for RewritableOrderedSet<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        for e in iter {
            self.add(e);
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for RewritableOrderedSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter().map(|k| &k.elem)).finish()
    }
}
