//! # Cross-Chunk Stitching
//!
//! Matches continuations across every interior face pair of the grid and
//! collapses each connected set of touching segments onto one id. Faces on
//! the grid boundary have no opposite and are skipped.

use crate::continuation::{match_continuations, ChunkContinuations};
use crate::dsu::DisjointSet;
use crate::grid::{ChunkGrid, GridGeometry};
use crate::idmap::IdMap;
use crate::model::{Face, SegId};
use tracing::debug;

/// Find all cross-chunk match edges. Each interior face pair is visited
/// exactly once: for every chunk, only its high faces are paired with the
/// neighbor's opposing low face.
pub fn find_stitch_edges(
    geometry: &GridGeometry,
    continuations: &ChunkGrid<ChunkContinuations>,
) -> Vec<(SegId, SegId)> {
    let mut edges = Vec::new();

    for (coord, here) in continuations.iter() {
        for axis in 0..3 {
            let face = Face::new(axis, true);
            let Some(neighbor) = geometry.neighbor(coord, face) else {
                continue;
            };
            let Some(there) = continuations.get(neighbor) else {
                continue;
            };
            let matches =
                match_continuations(here.at_face(face), there.at_face(face.opposite()));
            edges.extend(matches);
        }
    }

    debug!(edges = edges.len(), "matched continuations across seams");
    edges
}

/// The id map merging every connected set of cross-chunk-touching segments
/// onto `min(component)`. Unmatched segments are left out of the map and
/// pass through as identity. Re-running on already-merged ids produces no
/// further merges.
pub fn merge_continuations(
    geometry: &GridGeometry,
    continuations: &ChunkGrid<ChunkContinuations>,
) -> IdMap {
    let edges = find_stitch_edges(geometry, continuations);
    let mut dsu = DisjointSet::new();
    for (a, b) in edges {
        dsu.union(a, b);
    }
    dsu.merge_map()
}
