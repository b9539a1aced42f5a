//! K-way merge with duplicate suppression.
//!
//! Each source keeps its most recently pulled value (`pending`). A round
//! pulls the next value from every *active* source into a small lookahead
//! set, emits the lookahead minimum, and re-activates exactly the sources
//! whose pending value equals what was emitted. Equal values from several
//! sources collapse into one lookahead entry, so each distinct value comes
//! out once and every contributing source advances once.

use std::fmt;

use crate::error::{Result, SortedSetError};
use crate::order::SortOrder;
use crate::rewritable::RewritableOrderedSet;
use crate::set::SetCursor;

struct Source<'a, E> {
    cursor: Box<dyn SetCursor<E> + 'a>,
    pending: Option<E>,
    active: bool,
    finished: bool,
}

/// Merges N sorted cursors sharing one order into one ascending,
/// deduplicated stream.
pub struct MergeSortIterator<'a, E> {
    order: SortOrder<E>,
    sources: Vec<Source<'a, E>>,
    lookahead: RewritableOrderedSet<E>,
    /// Sources that produced the last returned value.
    contributors: Vec<usize>,
    /// Set by `fill`; a pull since the last `next` invalidates `remove`.
    pulled_ahead: bool,
}

impl<'a, E: Clone> MergeSortIterator<'a, E> {
    pub fn new(order: SortOrder<E>, cursors: Vec<Box<dyn SetCursor<E> + 'a>>) -> Self {
        let sources = cursors
            .into_iter()
            .map(|cursor| Source {
                cursor,
                pending: None,
                active: true,
                finished: false,
            })
            .collect();
        Self {
            lookahead: RewritableOrderedSet::new(order.clone()),
            order,
            sources,
            contributors: Vec::new(),
            pulled_ahead: false,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Pulls one value from every active source into the lookahead set.
    fn fill(&mut self) -> Result<()> {
        for source in self.sources.iter_mut() {
            if !source.active || source.finished {
                continue;
            }
            let next = source.cursor.next_record()?;
            self.pulled_ahead = true;
            source.active = false;
            match next {
                Some(v) => {
                    self.lookahead.add(v.clone());
                    source.pending = Some(v);
                }
                None => {
                    source.pending = None;
                    source.finished = true;
                }
            }
        }
        Ok(())
    }

    /// True while another value can be produced. May pull from sources.
    pub fn has_next(&mut self) -> Result<bool> {
        self.fill()?;
        Ok(!self.lookahead.is_empty())
    }

    /// Next distinct value in order, or `None` once every source is done.
    pub fn next_entry(&mut self) -> Result<Option<E>> {
        self.fill()?;
        self.pulled_ahead = false;
        self.contributors.clear();

        let Some(min) = self.lookahead.pop_first() else {
            return Ok(None);
        };
        for (i, source) in self.sources.iter_mut().enumerate() {
            if source.finished {
                continue;
            }
            if let Some(p) = &source.pending {
                if self.order.equal(p, &min) {
                    source.active = true;
                    self.contributors.push(i);
                }
            }
        }
        Ok(Some(min))
    }

    /// Removes the last returned value from every source that produced it.
    ///
    /// Removal is attempted on every contributor even if one fails; an
    /// unsupported removal is reported after the rest were tried.
    pub fn remove(&mut self) -> Result<()> {
        if self.contributors.is_empty() || self.pulled_ahead {
            return Err(SortedSetError::IllegalState(
                "remove() must directly follow a successful next()".into(),
            ));
        }
        let mut unsupported = None;
        for i in std::mem::take(&mut self.contributors) {
            match self.sources[i].cursor.remove_current() {
                Ok(()) => {}
                Err(SortedSetError::Unsupported(what)) => unsupported = Some(what),
                Err(e) => return Err(e),
            }
        }
        match unsupported {
            Some(what) => Err(SortedSetError::Unsupported(what)),
            None => Ok(()),
        }
    }

    /// Drains the merge into a vector.
    pub fn collect_all(mut self) -> Result<Vec<E>> {
        let mut out = Vec::new();
        while let Some(v) = self.next_entry()? {
            out.push(v);
        }
        Ok(out)
    }

    /// Counts the remaining distinct values.
    pub fn count_remaining(mut self) -> Result<usize> {
        let mut n = 0;
        while self.next_entry()?.is_some() {
            n += 1;
        }
        Ok(n)
    }
}

impl<E: Clone> SetCursor<E> for MergeSortIterator<'_, E> {
    fn next_record(&mut self) -> Result<Option<E>> {
        self.next_entry()
    }

    fn remove_current(&mut self) -> Result<()> {
        self.remove()
    }
}

impl<E: Clone> Iterator for MergeSortIterator<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<E: Clone> fmt::Debug for MergeSortIterator<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeSortIterator")
            .field("sources", &self.sources.len())
            .field("lookahead", &self.lookahead.len())
            .field("contributors", &self.contributors)
            .finish()
    }
}
