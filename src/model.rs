//! # Data Model
//!
//! Core types for chunkwise segmentation consolidation: segment ids, chunk
//! faces, partner pairs, and the per-segment summary records exchanged
//! between pipeline stages.

use crate::bbox::BBox;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment identifier. Ids are chunk-local straight out of labeling and
/// global after renumbering; both live in the same space so id maps compose.
/// `SegId(0)` is reserved for background / removed segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegId(pub u64);

/// Background / removed marker. Never assigned to a real segment.
pub const BACKGROUND: SegId = SegId(0);

impl SegId {
    pub fn is_background(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// One of the 6 directed faces of a chunk: an axis and whether the face sits
/// at the high end of that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Face {
    pub axis: usize,
    pub hi: bool,
}

impl Face {
    pub fn new(axis: usize, hi: bool) -> Self {
        debug_assert!(axis < 3);
        Self { axis, hi }
    }

    /// The matching face on the neighboring chunk.
    pub fn opposite(&self) -> Self {
        Self {
            axis: self.axis,
            hi: !self.hi,
        }
    }

    /// All 6 faces of a chunk.
    pub fn all() -> impl Iterator<Item = Face> {
        (0..3).flat_map(|axis| [true, false].into_iter().map(move |hi| Face { axis, hi }))
    }

    /// The two axes spanning this face's plane, in ascending order.
    pub fn plane_axes(&self) -> [usize; 2] {
        match self.axis {
            0 => [1, 2],
            1 => [0, 2],
            _ => [0, 1],
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            ["x", "y", "z"][self.axis],
            if self.hi { "+" } else { "-" }
        )
    }
}

/// An ordered pair of partner segment ids. Two records can only ever be
/// duplicates of each other when their pairs are equal, and the same value
/// is the shard routing key, so partitioning can never separate merge
/// candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartnerPair {
    pub presyn: SegId,
    pub postsyn: SegId,
}

impl PartnerPair {
    pub fn new(presyn: SegId, postsyn: SegId) -> Self {
        Self { presyn, postsyn }
    }
}

impl fmt::Display for PartnerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.presyn, self.postsyn)
    }
}

/// Summary of one segment: voxel count, centroid, and bounding box, all in
/// global coordinates once the chunk offset has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub size: u64,
    pub centroid: [f64; 3],
    pub bbox: BBox,
}

/// A segment summary joined with its winning edge assignment: the partner
/// pair, the assignment weights, and the partner overlap sizes. This is the
/// record shape consumed by duplicate merging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FullRecord {
    pub seg: SegId,
    pub partners: PartnerPair,
    pub presyn_weight: f64,
    pub postsyn_weight: f64,
    pub presyn_size: u64,
    pub postsyn_size: u64,
    pub info: SegmentInfo,
}

/// An edge candidate reported by one chunk for one segment. Several chunks
/// may report candidates for the same segment; the one with the largest size
/// wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub seg: SegId,
    pub partners: PartnerPair,
    pub presyn_weight: f64,
    pub postsyn_weight: f64,
    pub presyn_size: u64,
    pub postsyn_size: u64,
    pub size: u64,
}
