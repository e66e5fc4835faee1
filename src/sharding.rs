//! # Sharded Merge Coordination
//!
//! Splits the duplicate-merge and overlap-consolidation reductions across
//! independent parallel shards. Records are routed by a deterministic hash
//! of their join key, and the join key is exactly the key two records must
//! share to ever merge, so no merge candidate pair is ever split across
//! shards and the sharded result equals a single-threaded run.

use crate::dedup::merge_duplicates;
use crate::idmap::IdMap;
use crate::model::{FullRecord, PartnerPair, SegId};
use crate::overlap::{consolidate_overlaps, OverlapMatrix};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Deterministic shard index in `[0, hashmax)` for a join key. Stable
/// across processes and workers, so independent invocations route the same
/// key to the same shard.
pub fn shard_index<K: Hash>(key: &K, hashmax: usize) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() % hashmax.max(1) as u64) as usize
}

/// Partition records into `hashmax` buckets by a join key.
pub fn partition_by_key<T, K: Hash>(
    records: impl IntoIterator<Item = T>,
    hashmax: usize,
    key_fn: impl Fn(&T) -> K,
) -> Vec<Vec<T>> {
    let mut buckets: Vec<Vec<T>> = (0..hashmax.max(1)).map(|_| Vec::new()).collect();
    for record in records {
        let shard = shard_index(&key_fn(&record), hashmax);
        buckets[shard].push(record);
    }
    buckets
}

/// Duplicate merging split across shards keyed by partner pair, the same
/// key dedup groups by, so a duplicate group can never straddle shards.
/// Per-shard maps have disjoint domains and concatenate into the global
/// map.
pub fn sharded_merge_duplicates(
    records: &FxHashMap<SegId, FullRecord>,
    dist_thr: f64,
    voxel_res: [f64; 3],
    hashmax: usize,
) -> IdMap {
    let shards = partition_by_key(
        records.iter().map(|(&id, r)| (id, *r)),
        hashmax,
        |(_, r): &(SegId, FullRecord)| -> PartnerPair { r.partners },
    );
    debug!(shards = shards.len(), records = records.len(), "sharded duplicate merge");

    let shard_maps: Vec<IdMap> = shards
        .into_par_iter()
        .map(|shard| {
            let table: FxHashMap<SegId, FullRecord> = shard.into_iter().collect();
            merge_duplicates(&table, dist_thr, voxel_res)
        })
        .collect();

    let mut combined = IdMap::new();
    for map in shard_maps {
        for (k, v) in map.iter() {
            combined.insert(k, v);
        }
    }
    combined
}

/// Overlap consolidation split across shards keyed by (already remapped)
/// destination row id, the key under which duplicate triplets sum.
pub fn sharded_consolidate_overlaps(
    matrices: impl IntoIterator<Item = OverlapMatrix>,
    hashmax: usize,
) -> OverlapMatrix {
    let triplets: Vec<(SegId, SegId, u64)> = matrices
        .into_iter()
        .flat_map(|m| m.triplets())
        .collect();
    let shards = partition_by_key(triplets, hashmax, |&(row, _, _)| row);

    let shard_matrices: Vec<OverlapMatrix> = shards
        .into_par_iter()
        .map(OverlapMatrix::from_triplets)
        .collect();

    consolidate_overlaps(shard_matrices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::model::SegmentInfo;

    fn record(seg: u64, pre: u64, post: u64, centroid: [f64; 3]) -> (SegId, FullRecord) {
        (
            SegId(seg),
            FullRecord {
                seg: SegId(seg),
                partners: PartnerPair::new(SegId(pre), SegId(post)),
                presyn_weight: 0.5,
                postsyn_weight: 0.5,
                presyn_size: 1,
                postsyn_size: 1,
                info: SegmentInfo {
                    size: 10,
                    centroid,
                    bbox: BBox::new([0, 0, 0], [1, 1, 1]).unwrap(),
                },
            },
        )
    }

    #[test]
    fn shard_index_is_deterministic_and_bounded() {
        let pair = PartnerPair::new(SegId(5), SegId(9));
        let first = shard_index(&pair, 16);
        let second = shard_index(&pair, 16);
        assert_eq!(first, second);
        assert!(first < 16);
    }

    #[test]
    fn partition_routes_equal_keys_together() {
        let records = vec![(1u64, "a"), (1, "b"), (2, "c")];
        let buckets = partition_by_key(records, 8, |&(k, _)| k);
        let bucket_of_one = shard_index(&1u64, 8);
        assert_eq!(buckets[bucket_of_one].len(), 2);
        assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), 3);
    }

    #[test]
    fn sharded_dedup_matches_single_threaded() {
        let records: FxHashMap<SegId, FullRecord> = [
            record(1, 5, 9, [0.0, 0.0, 0.0]),
            record(2, 5, 9, [1.0, 0.0, 0.0]),
            record(3, 7, 9, [0.0, 0.0, 0.0]),
            record(4, 7, 9, [0.5, 0.0, 0.0]),
            record(5, 7, 8, [0.0, 0.0, 0.0]),
            record(6, 5, 9, [100.0, 0.0, 0.0]),
        ]
        .into_iter()
        .collect();

        let single = merge_duplicates(&records, 10.0, [4.0, 4.0, 40.0]);
        for hashmax in [1, 2, 7, 64] {
            let sharded = sharded_merge_duplicates(&records, 10.0, [4.0, 4.0, 40.0], hashmax);
            for id in 1..=6u64 {
                assert_eq!(
                    sharded.resolve(SegId(id)),
                    single.resolve(SegId(id)),
                    "hashmax={hashmax} id={id}"
                );
            }
        }
    }

    #[test]
    fn sharded_overlap_matches_single_threaded() {
        let chunks = || {
            [
                OverlapMatrix::from_triplets([(SegId(42), SegId(2), 3), (SegId(1), SegId(9), 2)]),
                OverlapMatrix::from_triplets([(SegId(42), SegId(2), 4)]),
                OverlapMatrix::from_triplets([(SegId(42), SegId(2), 5), (SegId(1), SegId(3), 7)]),
            ]
        };
        let single = consolidate_overlaps(chunks());
        let sharded = sharded_consolidate_overlaps(chunks(), 8);
        assert_eq!(single, sharded);
        assert_eq!(sharded.get(SegId(42), SegId(2)), 12);
    }
}
