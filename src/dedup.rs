//! # Duplicate Merging
//!
//! Two records describe the same physical contact when they connect the
//! same ordered partner pair and sit within a distance threshold of each
//! other. Grouping is by exact partner pair; distances are anisotropic,
//! scaled by the per-axis voxel resolution.

use crate::dsu::DisjointSet;
use crate::idmap::IdMap;
use crate::model::{EdgeRecord, FullRecord, PartnerPair, SegId, SegmentInfo};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Resolve one winning edge record per segment: several chunks may report a
/// candidate for the same segment, and the one with the largest size wins
/// (first seen wins ties).
pub fn pick_largest_edges(
    edges: impl IntoIterator<Item = EdgeRecord>,
) -> FxHashMap<SegId, EdgeRecord> {
    let mut winners: FxHashMap<SegId, EdgeRecord> = FxHashMap::default();
    for edge in edges {
        match winners.get(&edge.seg) {
            Some(current) if current.size >= edge.size => {}
            _ => {
                winners.insert(edge.seg, edge);
            }
        }
    }
    winners
}

/// Join segment summaries with their winning edge assignments. Only
/// segments present on both sides produce a record; the summary table's
/// size is authoritative (the edge-side size may come from a downsampled
/// view).
pub fn join_full_records(
    segments: &FxHashMap<SegId, SegmentInfo>,
    edges: &FxHashMap<SegId, EdgeRecord>,
) -> FxHashMap<SegId, FullRecord> {
    segments
        .iter()
        .filter_map(|(&seg, info)| {
            edges.get(&seg).map(|edge| {
                (
                    seg,
                    FullRecord {
                        seg,
                        partners: edge.partners,
                        presyn_weight: edge.presyn_weight,
                        postsyn_weight: edge.postsyn_weight,
                        presyn_size: edge.presyn_size,
                        postsyn_size: edge.postsyn_size,
                        info: *info,
                    },
                )
            })
        })
        .collect()
}

/// Physical distance between two centroids under an anisotropic voxel
/// resolution.
pub fn scaled_distance(a: [f64; 3], b: [f64; 3], voxel_res: [f64; 3]) -> f64 {
    let mut sum = 0.0;
    for axis in 0..3 {
        let d = (a[axis] - b[axis]) * voxel_res[axis];
        sum += d * d;
    }
    sum.sqrt()
}

/// Group records by partner pair, in ascending pair order so downstream
/// work is deterministic.
pub fn group_by_partners(
    records: &FxHashMap<SegId, FullRecord>,
) -> Vec<(PartnerPair, Vec<&FullRecord>)> {
    let mut groups: FxHashMap<PartnerPair, Vec<&FullRecord>> = FxHashMap::default();
    for record in records.values() {
        groups.entry(record.partners).or_default().push(record);
    }

    let mut out: Vec<_> = groups.into_iter().collect();
    out.sort_by_key(|(pair, _)| (pair.presyn, pair.postsyn));
    for (_, members) in &mut out {
        members.sort_by_key(|r| r.seg);
    }
    out
}

/// The id map merging duplicate records: same partner pair, centroids
/// within `dist_thr` of each other (transitively). Each duplicate component
/// collapses onto its minimum id.
pub fn merge_duplicates(
    records: &FxHashMap<SegId, FullRecord>,
    dist_thr: f64,
    voxel_res: [f64; 3],
) -> IdMap {
    let mut dsu = DisjointSet::new();

    for (_, members) in group_by_partners(records) {
        if members.len() < 2 {
            continue;
        }
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let dist = scaled_distance(
                    members[i].info.centroid,
                    members[j].info.centroid,
                    voxel_res,
                );
                if dist < dist_thr {
                    dsu.union(members[i].seg, members[j].seg);
                }
            }
        }
    }

    let map = dsu.merge_map();
    debug!(merged = map.len(), "matched duplicate records");
    map
}
