/// Removal: `remove()`, `remove_all()`, `retain_all()`, `remove_if()` and
/// `clear()`.
///
/// The buffer is edited in place. A segment is first scanned for a match;
/// only then is it loaded, edited and written back, to its own handle when
/// possible and through the factories otherwise. A segment left empty is
/// dropped.
use sortedset::{
    PersistedFile, Record, Result, RewritableOrderedSet, SetCursor, SortedSet, SortedSetError,
};
use tracing::{debug, warn};

use crate::write::persist_with_factories;
use crate::SpillingSortedSet;

impl<E: Record> SpillingSortedSet<E> {
    /// Removes `elem` wherever it is stored. Returns whether it was found.
    pub fn remove(&mut self, elem: &E) -> Result<bool> {
        let order = self.order.clone();
        let target = elem.clone();
        Ok(self.remove_if(move |e| order.equal(e, &target))? > 0)
    }

    /// Removes every element of `elems`. Returns whether anything changed.
    pub fn remove_all(&mut self, elems: &[E]) -> Result<bool> {
        let mut wanted = RewritableOrderedSet::new(self.order.clone());
        wanted.extend(elems.iter().cloned());
        if wanted.is_empty() {
            return Ok(false);
        }
        Ok(self.remove_if(|e| wanted.contains(e))? > 0)
    }

    /// Keeps only the elements of `keep`. Returns whether anything changed.
    pub fn retain_all(&mut self, keep: &[E]) -> Result<bool> {
        let mut kept = RewritableOrderedSet::new(self.order.clone());
        kept.extend(keep.iter().cloned());
        Ok(self.remove_if(|e| !kept.contains(e))? > 0)
    }

    /// Removes every element matching `pred`.
    ///
    /// Returns the number of stored copies removed; a value held by both the
    /// buffer and a segment counts twice.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if a segment matched while scanning but nothing
    /// matched after loading it. A segment that cannot be written back
    /// stays loaded in memory and remains part of the set.
    pub fn remove_if<F: FnMut(&E) -> bool>(&mut self, mut pred: F) -> Result<usize> {
        self.mark_dirty();
        let mut removed = 0;
        if let Some(buffer) = self.buffer.as_mut() {
            removed += buffer.remove_if(&mut pred)?;
        }

        let segments = self.segments.take_members();
        let mut kept = Vec::with_capacity(segments.len());
        let mut failure = None;
        for mut segment in segments {
            if failure.is_none() {
                match self.remove_from_segment(&mut segment, &mut pred) {
                    Ok(n) => removed += n,
                    Err(e) => failure = Some(e),
                }
            }
            let emptied = !segment.is_persisted() && matches!(segment.len(), Ok(0));
            if emptied {
                debug!(handle = ?segment.handle(), "dropping emptied segment");
                continue;
            }
            kept.push(segment);
        }
        *self.segments.members_mut() = kept;

        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    fn remove_from_segment<F: FnMut(&E) -> bool>(
        &self,
        segment: &mut PersistedFile<E>,
        pred: &mut F,
    ) -> Result<usize> {
        if !segment_matches(segment, pred)? {
            return Ok(0);
        }
        segment.load()?;
        let removed = segment.remove_if(&mut *pred)?;
        if removed == 0 {
            return Err(SortedSetError::InvariantViolation(
                "segment matched while scanning but nothing was removed after loading".into(),
            ));
        }
        if segment.len()? > 0 {
            self.rewrite_segment(segment)?;
        }
        Ok(removed)
    }

    /// Writes a loaded segment back, preferring the handle it came from.
    fn rewrite_segment(&self, segment: &mut PersistedFile<E>) -> Result<()> {
        if segment.handle().is_some() {
            match segment.repersist() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "rewriting segment to its own handle failed, trying factories");
                }
                Err(e) => return Err(e),
            }
        }
        persist_with_factories(&self.factories, &self.config, "rewritten segment", |handle| {
            segment.persist(handle)
        })
    }

    /// Drops the buffer and every segment, deleting segment files.
    ///
    /// Best effort: a segment whose file cannot be deleted is logged and
    /// forgotten, and the remaining segments are still cleared.
    pub fn clear(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            if let Err(e) = buffer.clear() {
                warn!(error = %e, "failed to clear buffer");
            }
        }
        for mut segment in self.segments.take_members() {
            let handle = segment.handle().cloned();
            if let Err(e) = segment.clear() {
                warn!(handle = ?handle, error = %e, "failed to delete segment");
            }
        }
        self.size.set(Some(0));
    }
}

fn segment_matches<E: Record, F: FnMut(&E) -> bool>(
    segment: &PersistedFile<E>,
    pred: &mut F,
) -> Result<bool> {
    let mut cursor = segment.cursor()?;
    while let Some(e) = cursor.next_record()? {
        if pred(&e) {
            return Ok(true);
        }
    }
    Ok(false)
}
