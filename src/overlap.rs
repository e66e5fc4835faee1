//! # Overlap Consolidation
//!
//! Sparse overlap-count matrices between a segmentation of interest and a
//! base segmentation. Each chunk contributes one matrix; consolidation
//! remaps rows through the chunk's id map, sums duplicate entries, and
//! extracts the best-matching base segment per row. Same partitioned-reduce
//! shape as stitching and dedup, different payload.

use crate::idmap::IdMap;
use crate::model::SegId;
use ndarray::Array3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A sparse matrix of voxel overlap counts, keyed `(row, col)` where rows
/// are segments of interest and columns are base segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapMatrix {
    entries: FxHashMap<(SegId, SegId), u64>,
}

impl OverlapMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triplets(triplets: impl IntoIterator<Item = (SegId, SegId, u64)>) -> Self {
        let mut out = Self::new();
        for (row, col, count) in triplets {
            out.add(row, col, count);
        }
        out
    }

    /// Add `count` to the `(row, col)` entry.
    pub fn add(&mut self, row: SegId, col: SegId, count: u64) {
        if count > 0 {
            *self.entries.entry((row, col)).or_insert(0) += count;
        }
    }

    pub fn get(&self, row: SegId, col: SegId) -> u64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nonzero triplets in ascending `(row, col)` order.
    pub fn triplets(&self) -> Vec<(SegId, SegId, u64)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(&(r, c), &v)| (r, c, v))
            .collect();
        out.sort_unstable_by_key(|&(r, c, _)| (r, c));
        out
    }

    /// Rewrite row ids through `map`; rows collapsing onto the same target
    /// have their counts summed. Column ids are base-segmentation ids and
    /// never remap.
    pub fn remap_rows(&self, map: &IdMap) -> Self {
        Self::from_triplets(
            self.entries
                .iter()
                .map(|(&(r, c), &v)| (map.resolve(r), c, v)),
        )
    }

    /// For each row, the column with the maximal count. Ties go to the
    /// smallest column id so the result is deterministic.
    pub fn max_overlaps(&self) -> FxHashMap<SegId, SegId> {
        let mut best: FxHashMap<SegId, (SegId, u64)> = FxHashMap::default();
        for (row, col, count) in self.triplets() {
            match best.get(&row) {
                Some(&(_, max)) if max >= count => {}
                _ => {
                    best.insert(row, (col, count));
                }
            }
        }
        best.into_iter().map(|(row, (col, _))| (row, col)).collect()
    }
}

/// Count pairwise overlaps between two label volumes of equal shape: entry
/// `(r, c)` is the number of voxels where `segs` holds `r` and `base`
/// holds `c`, both nonzero.
pub fn count_overlaps(segs: &Array3<u64>, base: &Array3<u64>) -> OverlapMatrix {
    debug_assert_eq!(segs.dim(), base.dim(), "overlap volumes must align");
    let mut matrix = OverlapMatrix::new();
    for (&s, &b) in segs.iter().zip(base.iter()) {
        if s != 0 && b != 0 {
            matrix.add(SegId(s), SegId(b), 1);
        }
    }
    matrix
}

/// Sum many chunk matrices into one. Chunks reporting the same `(row, col)`
/// pair accumulate.
pub fn consolidate_overlaps(matrices: impl IntoIterator<Item = OverlapMatrix>) -> OverlapMatrix {
    let mut out = OverlapMatrix::new();
    for matrix in matrices {
        for ((row, col), count) in matrix.entries {
            out.add(row, col, count);
        }
    }
    out
}
