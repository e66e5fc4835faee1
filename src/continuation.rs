//! # Continuations
//!
//! The boundary footprint of a segment on one face of its chunk. A segment
//! touching a face may continue into the neighboring chunk; continuations
//! are the only information the stitching stage needs to decide that.

use crate::error::{CoreError, Result};
use crate::idmap::IdMap;
use crate::model::{Face, SegId};
use ndarray::{Array3, ArrayView2, Axis};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// One segment's footprint on one face: the 2d in-plane coordinates of its
/// boundary voxels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub seg: SegId,
    pub face: Face,
    pub coords: Vec<[u32; 2]>,
}

/// All continuations of one chunk, grouped per face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkContinuations {
    faces: FxHashMap<Face, Vec<Continuation>>,
}

impl ChunkContinuations {
    pub fn at_face(&self, face: Face) -> &[Continuation] {
        self.faces.get(&face).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of all segments touching any face.
    pub fn segment_ids(&self) -> FxHashSet<SegId> {
        self.faces
            .values()
            .flat_map(|conts| conts.iter().map(|c| c.seg))
            .collect()
    }

    /// Rewrite all continuation ids through `map`. The map must cover every
    /// continuation id; a miss means the chunk's segment table and its
    /// continuations disagree, which is upstream corruption.
    pub fn apply_id_map(&mut self, map: &IdMap) -> Result<()> {
        for conts in self.faces.values_mut() {
            for cont in conts.iter_mut() {
                cont.seg = map
                    .get(cont.seg)
                    .ok_or_else(|| CoreError::identity(cont.seg, "continuation remap"))?;
            }
        }
        Ok(())
    }
}

/// The 2d slice of a label volume at a face: the first or last plane along
/// the face's axis.
pub fn face_slice(labels: &Array3<u64>, face: Face) -> ArrayView2<'_, u64> {
    let len = labels.len_of(Axis(face.axis));
    let index = if face.hi { len - 1 } else { 0 };
    labels.index_axis(Axis(face.axis), index)
}

/// Extract the continuations at every face of a chunk. Linear in face area.
pub fn extract_continuations(labels: &Array3<u64>) -> ChunkContinuations {
    let mut faces: FxHashMap<Face, Vec<Continuation>> = FxHashMap::default();

    for face in Face::all() {
        let plane = face_slice(labels, face);
        let mut by_seg: FxHashMap<SegId, Vec<[u32; 2]>> = FxHashMap::default();
        for ((r, c), &v) in plane.indexed_iter() {
            if v != 0 {
                by_seg
                    .entry(SegId(v))
                    .or_default()
                    .push([r as u32, c as u32]);
            }
        }

        let mut conts: Vec<Continuation> = by_seg
            .into_iter()
            .map(|(seg, coords)| Continuation { seg, face, coords })
            .collect();
        conts.sort_by_key(|c| c.seg);
        faces.insert(face, conts);
    }

    ChunkContinuations { faces }
}

/// Match two opposing faces' continuations: a pair matches iff some 2d
/// boundary position is occupied on both sides of the seam. Returns each
/// matched id pair once.
pub fn match_continuations(
    here: &[Continuation],
    there: &[Continuation],
) -> Vec<(SegId, SegId)> {
    let mut occupied: FxHashMap<[u32; 2], SegId> = FxHashMap::default();
    for cont in here {
        for &coord in &cont.coords {
            occupied.insert(coord, cont.seg);
        }
    }

    let mut matches: FxHashSet<(SegId, SegId)> = FxHashSet::default();
    for cont in there {
        for coord in &cont.coords {
            if let Some(&seg_here) = occupied.get(coord) {
                matches.insert((seg_here, cont.seg));
            }
        }
    }

    let mut out: Vec<_> = matches.into_iter().collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn labeled(points: &[((usize, usize, usize), u64)], shape: (usize, usize, usize)) -> Array3<u64> {
        let mut v = Array3::<u64>::zeros(shape);
        for &(p, id) in points {
            v[p] = id;
        }
        v
    }

    #[test]
    fn face_slice_picks_first_and_last_planes() {
        let v = labeled(&[((0, 1, 2), 7), ((3, 1, 2), 9)], (4, 3, 3));
        assert_eq!(face_slice(&v, Face::new(0, false))[(1, 2)], 7);
        assert_eq!(face_slice(&v, Face::new(0, true))[(1, 2)], 9);
    }

    #[test]
    fn extracts_one_continuation_per_face_per_segment() {
        // Segment 5 spans the x-high face twice and the y-low face once.
        let v = labeled(
            &[((2, 0, 0), 5), ((2, 0, 1), 5), ((0, 0, 0), 3)],
            (3, 2, 2),
        );
        let conts = extract_continuations(&v);

        let x_hi = conts.at_face(Face::new(0, true));
        assert_eq!(x_hi.len(), 1);
        assert_eq!(x_hi[0].seg, SegId(5));
        assert_eq!(x_hi[0].coords, vec![[0, 0], [0, 1]]);

        let y_lo = conts.at_face(Face::new(1, false));
        let ids: Vec<SegId> = y_lo.iter().map(|c| c.seg).collect();
        assert_eq!(ids, vec![SegId(3), SegId(5)]);
    }

    #[test]
    fn matching_requires_shared_coordinates() {
        let a = Continuation {
            seg: SegId(1),
            face: Face::new(0, true),
            coords: vec![[0, 0], [1, 1]],
        };
        let b = Continuation {
            seg: SegId(2),
            face: Face::new(0, false),
            coords: vec![[1, 1]],
        };
        let c = Continuation {
            seg: SegId(3),
            face: Face::new(0, false),
            coords: vec![[2, 2]],
        };
        let matches = match_continuations(std::slice::from_ref(&a), &[b, c]);
        assert_eq!(matches, vec![(SegId(1), SegId(2))]);
    }

    #[test]
    fn apply_id_map_requires_total_coverage() {
        let v = labeled(&[((0, 0, 0), 1), ((2, 1, 1), 2)], (3, 2, 2));
        let mut conts = extract_continuations(&v);

        let partial: IdMap = [(SegId(1), SegId(10))].into_iter().collect();
        assert!(matches!(
            conts.apply_id_map(&partial),
            Err(CoreError::Identity { .. })
        ));

        let total: IdMap = [(SegId(1), SegId(10)), (SegId(2), SegId(11))]
            .into_iter()
            .collect();
        conts.apply_id_map(&total).unwrap();
        let ids = conts.segment_ids();
        assert!(ids.contains(&SegId(10)) && ids.contains(&SegId(11)));
    }
}
