//! # Bounding Boxes
//!
//! Axis-aligned half-open integer boxes `[min, max)` and the canonical chunk
//! tag encoding used to key a chunk's artifacts across stores.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 3d integer coordinate.
pub type Vec3 = [i64; 3];

/// An axis-aligned half-open box `[min, max)`. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    min: Vec3,
    max: Vec3,
}

impl BBox {
    /// Create a box, checking `min[i] < max[i]` on every axis.
    pub fn new(min: Vec3, max: Vec3) -> Result<Self> {
        for axis in 0..3 {
            if min[axis] >= max[axis] {
                return Err(CoreError::shape(format!(
                    "degenerate box on axis {axis}: {} >= {}",
                    min[axis], max[axis]
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// Create a box from voxel extents, without translation.
    pub fn from_shape(shape: [usize; 3]) -> Result<Self> {
        Self::new([0, 0, 0], [shape[0] as i64, shape[1] as i64, shape[2] as i64])
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Extent along each axis (`max - min`).
    pub fn shape(&self) -> [usize; 3] {
        [
            (self.max[0] - self.min[0]) as usize,
            (self.max[1] - self.min[1]) as usize,
            (self.max[2] - self.min[2]) as usize,
        ]
    }

    pub fn volume(&self) -> usize {
        let s = self.shape();
        s[0] * s[1] * s[2]
    }

    /// Shift both corners by `v`, returning a copy.
    pub fn translate(&self, v: Vec3) -> Self {
        Self {
            min: [self.min[0] + v[0], self.min[1] + v[1], self.min[2] + v[2]],
            max: [self.max[0] + v[0], self.max[1] + v[1], self.max[2] + v[2]],
        }
    }

    /// Smallest box containing both `self` and `other`.
    pub fn merge(&self, other: &BBox) -> Self {
        Self {
            min: [
                self.min[0].min(other.min[0]),
                self.min[1].min(other.min[1]),
                self.min[2].min(other.min[2]),
            ],
            max: [
                self.max[0].max(other.max[0]),
                self.max[1].max(other.max[1]),
                self.max[2].max(other.max[2]),
            ],
        }
    }

    /// Intersection of two boxes. `None` when they do not overlap.
    pub fn intersect(&self, other: &BBox) -> Option<Self> {
        let min = [
            self.min[0].max(other.min[0]),
            self.min[1].max(other.min[1]),
            self.min[2].max(other.min[2]),
        ];
        let max = [
            self.max[0].min(other.max[0]),
            self.max[1].min(other.max[1]),
            self.max[2].min(other.max[2]),
        ];
        BBox::new(min, max).ok()
    }

    /// Grow every face outward by `v`.
    pub fn grow_by(&self, v: Vec3) -> Self {
        Self {
            min: [self.min[0] - v[0], self.min[1] - v[1], self.min[2] - v[2]],
            max: [self.max[0] + v[0], self.max[1] + v[1], self.max[2] + v[2]],
        }
    }

    /// Shrink every face inward by `v`. Errors if the box collapses.
    pub fn shrink_by(&self, v: Vec3) -> Result<Self> {
        BBox::new(
            [self.min[0] + v[0], self.min[1] + v[1], self.min[2] + v[2]],
            [self.max[0] - v[0], self.max[1] - v[1], self.max[2] - v[2]],
        )
    }

    pub fn contains(&self, p: Vec3) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] < self.max[i])
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{})-[{},{},{})",
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2]
        )
    }
}

/// Encode a box as the canonical sortable chunk tag
/// `"{bx}_{by}_{bz}-{ex}_{ey}_{ez}"`.
pub fn encode_chunk_tag(bbox: &BBox) -> String {
    let b = bbox.min();
    let e = bbox.max();
    format!("{}_{}_{}-{}_{}_{}", b[0], b[1], b[2], e[0], e[1], e[2])
}

/// Decode a chunk tag back into its box. Exact inverse of
/// [`encode_chunk_tag`].
pub fn decode_chunk_tag(tag: &str) -> Result<BBox> {
    let malformed = || CoreError::Tag(tag.to_string());

    // A '-' splits min from max, but coordinates may themselves be negative.
    // The separator is the only '-' directly following a digit.
    let bytes = tag.as_bytes();
    let split = (1..bytes.len())
        .find(|&i| bytes[i] == b'-' && bytes[i - 1].is_ascii_digit())
        .ok_or_else(malformed)?;

    let parse3 = |s: &str| -> Result<Vec3> {
        let mut out = [0i64; 3];
        let mut parts = s.split('_');
        for slot in out.iter_mut() {
            *slot = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(malformed)?;
        }
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(out)
    };

    let min = parse3(&tag[..split])?;
    let max = parse3(&tag[split + 1..])?;
    BBox::new(min, max).map_err(|_| malformed())
}
