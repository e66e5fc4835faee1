use ndarray::Array3;

use volstitch::model::{EdgeRecord, PartnerPair, SegId};

/// A score volume with the given voxels set to 1.0 and everything else 0.
#[allow(dead_code)]
pub fn scores_with(points: &[(usize, usize, usize)], shape: (usize, usize, usize)) -> Array3<f32> {
    let mut volume = Array3::<f32>::zeros(shape);
    for &p in points {
        volume[p] = 1.0;
    }
    volume
}

/// A score volume with a filled axis-aligned block `[min, max)`.
#[allow(dead_code)]
pub fn scores_with_block(
    min: (usize, usize, usize),
    max: (usize, usize, usize),
    shape: (usize, usize, usize),
) -> Array3<f32> {
    let mut volume = Array3::<f32>::zeros(shape);
    for x in min.0..max.0 {
        for y in min.1..max.1 {
            for z in min.2..max.2 {
                volume[(x, y, z)] = 1.0;
            }
        }
    }
    volume
}

/// An edge candidate row with the given segment, partners, and size.
#[allow(dead_code)]
pub fn edge_row(seg: u64, pre: u64, post: u64, size: u64) -> EdgeRecord {
    EdgeRecord {
        seg: SegId(seg),
        partners: PartnerPair::new(SegId(pre), SegId(post)),
        presyn_weight: 0.9,
        postsyn_weight: 0.7,
        presyn_size: 40,
        postsyn_size: 50,
        size,
    }
}
