//! # Merge Algebra
//!
//! Folding per-segment summary rows under an id map, and the size threshold
//! that removes too-small segments. Sizes add, centroids average by size
//! weight, bounding boxes union; any other scalar field follows the record
//! with the largest original size. The threshold must run after every
//! structural merge stage, never before, because merging changes sizes.

use crate::error::{CoreError, Result};
use crate::idmap::IdMap;
use crate::model::{FullRecord, SegId, SegmentInfo, BACKGROUND};
use rustc_hash::FxHashMap;
use tracing::debug;

/// A summary row that can fold a smaller row into itself.
pub trait MergeRecord {
    /// Total accumulated voxel count.
    fn size(&self) -> u64;

    /// Fold `other` into `self`. Callers fold in descending original-size
    /// order, so `self` is always the running winner and keeps its
    /// winner-take-largest fields.
    fn absorb(&mut self, other: &Self);

    /// Rebind the row to the surviving id. No-op for rows keyed externally.
    fn rekey(&mut self, _id: SegId) {}
}

/// Size-weighted average of two centroids.
pub fn weighted_centroid(a: [f64; 3], size_a: u64, b: [f64; 3], size_b: u64) -> [f64; 3] {
    let total = (size_a + size_b) as f64;
    let fa = size_a as f64 / total;
    let fb = size_b as f64 / total;
    [
        a[0] * fa + b[0] * fb,
        a[1] * fa + b[1] * fb,
        a[2] * fa + b[2] * fb,
    ]
}

impl MergeRecord for SegmentInfo {
    fn size(&self) -> u64 {
        self.size
    }

    fn absorb(&mut self, other: &Self) {
        self.centroid = weighted_centroid(self.centroid, self.size, other.centroid, other.size);
        self.bbox = self.bbox.merge(&other.bbox);
        self.size += other.size;
    }
}

impl MergeRecord for FullRecord {
    fn size(&self) -> u64 {
        self.info.size
    }

    fn absorb(&mut self, other: &Self) {
        // Partner ids, weights, and partner sizes stay with the winner.
        self.info.absorb(&other.info);
    }

    fn rekey(&mut self, id: SegId) {
        self.seg = id;
    }
}

/// Apply an id map to a summary table: every mapped-away row folds into its
/// target, in descending original-size order (ties broken by ascending id),
/// and the surviving row is rekeyed to the map's target. Rows mapped to
/// background are dropped. A mapped id with no row is upstream corruption.
pub fn merge_table<T: MergeRecord + Clone>(
    table: &mut FxHashMap<SegId, T>,
    map: &IdMap,
) -> Result<()> {
    let mut groups: FxHashMap<SegId, Vec<SegId>> = FxHashMap::default();
    for (src, dst) in map.iter() {
        if src != dst {
            groups.entry(dst).or_default().push(src);
        }
    }

    let mut targets: Vec<SegId> = groups.keys().copied().collect();
    targets.sort_unstable();

    for target in targets {
        let sources = &groups[&target];

        if target == BACKGROUND {
            for src in sources {
                table.remove(src);
            }
            continue;
        }

        let mut members: Vec<(SegId, T)> = Vec::with_capacity(sources.len() + 1);
        for &src in sources {
            let row = table
                .remove(&src)
                .ok_or_else(|| CoreError::identity(src, "merge source row"))?;
            members.push((src, row));
        }
        let target_row = table
            .remove(&target)
            .ok_or_else(|| CoreError::identity(target, "merge target row"))?;
        members.push((target, target_row));

        members.sort_by(|(id_a, a), (id_b, b)| {
            b.size().cmp(&a.size()).then(id_a.cmp(id_b))
        });

        let mut iter = members.into_iter();
        let (_, mut acc) = iter.next().expect("at least the target row");
        for (_, row) in iter {
            acc.absorb(&row);
        }
        acc.rekey(target);
        table.insert(target, acc);
    }

    Ok(())
}

/// Remove every row whose accumulated size is strictly below `threshold`,
/// returning the map that sends the removed ids to background. The caller
/// composes this into the running chain; applying it before a merge stage
/// under-counts sizes and removes the wrong segments.
pub fn enforce_size_threshold<T: MergeRecord>(
    table: &mut FxHashMap<SegId, T>,
    threshold: u64,
) -> IdMap {
    let violations: Vec<SegId> = table
        .iter()
        .filter(|(_, row)| row.size() < threshold)
        .map(|(&id, _)| id)
        .collect();

    let mut map = IdMap::new();
    for id in violations {
        table.remove(&id);
        map.insert(id, BACKGROUND);
    }
    debug!(removed = map.len(), threshold, "enforced size threshold");
    map
}
