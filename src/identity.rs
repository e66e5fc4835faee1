//! # Global Id Assignment
//!
//! Renumbers every chunk's local segment ids into one disjoint, strictly
//! increasing global id space. Offsets come from a prefix sum over per-chunk
//! object counts, so each chunk's block is a pure function of the counts and
//! the assignment could run per chunk in parallel.

use crate::grid::{ChunkCoord, ChunkGrid};
use crate::idmap::IdMap;
use crate::model::{SegId, SegmentInfo};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Result of global renumbering: one map per chunk plus the concatenated
/// global segment table.
#[derive(Debug, Clone)]
pub struct GlobalAssignment {
    pub chunk_maps: ChunkGrid<IdMap>,
    pub segments: FxHashMap<SegId, SegmentInfo>,
}

/// Assign global ids `1, 2, ...` across the grid in lexicographic chunk
/// order. Local ids within a chunk are visited in ascending order, so the
/// assignment is reproducible; the ordering carries no spatial meaning.
pub fn assign_global_ids(tables: &ChunkGrid<FxHashMap<SegId, SegmentInfo>>) -> GlobalAssignment {
    // Prefix sum over object counts fixes each chunk's id block.
    let mut offsets: FxHashMap<ChunkCoord, u64> = FxHashMap::default();
    let mut next_id = 1u64;
    for (coord, table) in tables.iter() {
        offsets.insert(coord, next_id);
        next_id += table.len() as u64;
    }
    debug!(total = next_id - 1, "assigned global id space");

    let mut chunk_maps = ChunkGrid::new(tables.shape());
    let mut segments: FxHashMap<SegId, SegmentInfo> = FxHashMap::default();

    for (coord, table) in tables.iter() {
        let base = offsets[&coord];
        let mut local_ids: Vec<SegId> = table.keys().copied().collect();
        local_ids.sort_unstable();

        let mut map = IdMap::new();
        for (i, local) in local_ids.into_iter().enumerate() {
            let global = SegId(base + i as u64);
            map.insert(local, global);
            segments.insert(global, table[&local]);
        }
        chunk_maps.insert(coord, map);
    }

    GlobalAssignment {
        chunk_maps,
        segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::grid::ChunkCoord;

    fn info(size: u64) -> SegmentInfo {
        SegmentInfo {
            size,
            centroid: [0.0; 3],
            bbox: BBox::new([0, 0, 0], [1, 1, 1]).unwrap(),
        }
    }

    fn table(ids: &[u64]) -> FxHashMap<SegId, SegmentInfo> {
        ids.iter().map(|&id| (SegId(id), info(id))).collect()
    }

    #[test]
    fn ids_are_disjoint_and_increasing_across_chunks() {
        let mut tables = ChunkGrid::new([2, 1, 2]);
        tables.insert(ChunkCoord::new(0, 0, 0), table(&[1, 2]));
        tables.insert(ChunkCoord::new(0, 0, 1), table(&[1]));
        tables.insert(ChunkCoord::new(1, 0, 0), table(&[1, 2, 3]));
        tables.insert(ChunkCoord::new(1, 0, 1), table(&[]));

        let assignment = assign_global_ids(&tables);
        assert_eq!(assignment.segments.len(), 6);

        // Lexicographic chunk order: (0,0,0), (0,0,1), (1,0,0), (1,0,1).
        let ranges: Vec<Vec<u64>> = [
            ChunkCoord::new(0, 0, 0),
            ChunkCoord::new(0, 0, 1),
            ChunkCoord::new(1, 0, 0),
        ]
        .iter()
        .map(|&c| {
            let mut ids: Vec<u64> = assignment
                .chunk_maps
                .get(c)
                .unwrap()
                .iter()
                .map(|(_, v)| v.0)
                .collect();
            ids.sort_unstable();
            ids
        })
        .collect();

        assert_eq!(ranges[0], vec![1, 2]);
        assert_eq!(ranges[1], vec![3]);
        assert_eq!(ranges[2], vec![4, 5, 6]);
    }

    #[test]
    fn local_order_is_ascending_within_a_chunk() {
        let mut tables = ChunkGrid::new([1, 1, 1]);
        tables.insert(ChunkCoord::new(0, 0, 0), table(&[9, 2, 5]));
        let assignment = assign_global_ids(&tables);
        let map = assignment.chunk_maps.get(ChunkCoord::new(0, 0, 0)).unwrap();
        assert_eq!(map.get(SegId(2)), Some(SegId(1)));
        assert_eq!(map.get(SegId(5)), Some(SegId(2)));
        assert_eq!(map.get(SegId(9)), Some(SegId(3)));
    }

    #[test]
    fn segment_stats_survive_renumbering() {
        let mut tables = ChunkGrid::new([1, 1, 1]);
        tables.insert(ChunkCoord::new(0, 0, 0), table(&[4]));
        let assignment = assign_global_ids(&tables);
        assert_eq!(assignment.segments[&SegId(1)].size, 4);
    }
}
