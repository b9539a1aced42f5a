/// Compaction: merges the smallest segments into one.
///
/// The chosen group is read through a [`UnionSortedSet`] and streamed
/// straight into a new segment with `persist_from`, so nothing is
/// materialized in memory. The segment list is only replaced after the new
/// segment was written and verified.
use std::time::Instant;

use sortedset::{Record, Result, SortedSet, UnionSortedSet};
use tracing::{debug, warn};

use crate::write::persist_with_factories;
use crate::SpillingSortedSet;

impl<E: Record> SpillingSortedSet<E> {
    /// Reduces the segment count to at most `max_segments`.
    ///
    /// With `n` segments and `n > max_segments`, the `n - max_segments / 2 + 1`
    /// smallest (capped at `n`) are merged into one new segment, which goes
    /// first in the list, followed by the untouched segments. The merged
    /// segments' files are deleted afterwards. `max_segments == 0` disables
    /// compaction.
    ///
    /// # Errors
    ///
    /// `PersistFailed` if no factory could take the merged segment; the
    /// segment list is then left exactly as it was.
    pub fn compact(&mut self, max_segments: usize) -> Result<()> {
        let count = self.segments.member_count();
        if max_segments == 0 || count <= max_segments {
            return Ok(());
        }
        let excess = count - max_segments / 2;
        let group_size = (excess + 1).min(count);

        let sizes = self
            .segments
            .members()
            .iter()
            .map(|s| s.len())
            .collect::<Result<Vec<_>>>()?;
        // largest first, so the smallest sit at the tail
        let mut by_size: Vec<usize> = (0..count).collect();
        by_size.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]));
        let group = by_size.split_off(count - group_size);
        let group_elements: usize = group.iter().map(|&i| sizes[i]).sum();

        debug!(
            segments = count,
            max_segments,
            group = group.len(),
            group_elements,
            "compacting segments"
        );
        let started = Instant::now();

        let mut merged = self.new_file();
        {
            let members = self.segments.members();
            let union = UnionSortedSet::from_members(
                self.order.clone(),
                group.iter().map(|&i| &members[i]).collect(),
            );
            persist_with_factories(&self.factories, &self.config, "compacted segment", |handle| {
                merged.persist_from(handle, union.merge()?)
            })?;
        }

        let mut kept = vec![merged];
        for (i, mut segment) in self.segments.take_members().into_iter().enumerate() {
            if !group.contains(&i) {
                kept.push(segment);
                continue;
            }
            let handle = segment.handle().cloned();
            if let Err(e) = segment.clear() {
                warn!(handle = ?handle, error = %e, "failed to delete compacted segment");
            }
        }
        *self.segments.members_mut() = kept;

        debug!(
            segments = self.segments.member_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction finished"
        );
        Ok(())
    }
}
