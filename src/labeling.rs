//! # Chunk Labeling
//!
//! Connected-component labeling of one chunk's dense score volume, the
//! dilate-then-prune variant that bridges nearby detections, per-segment
//! summary statistics, and id-map relabeling of label volumes.
//!
//! Volumes are indexed `[x, y, z]`; dilation operates within each Z slice.

use crate::bbox::{BBox, Vec3};
use crate::error::{CoreError, Result};
use crate::idmap::IdMap;
use crate::model::{SegId, SegmentInfo};
use ndarray::Array3;
use rustc_hash::{FxHashMap, FxHashSet};

/// Threshold a score volume and label its 6-connected components.
/// Labels are `1..=N`, local to the chunk; background stays 0.
pub fn connected_components(scores: &Array3<f32>, threshold: f32) -> Result<Array3<u64>> {
    check_shape(scores.dim())?;
    let (nx, ny, nz) = scores.dim();
    let mut labels = Array3::<u64>::zeros((nx, ny, nz));
    let mut next_label = 1u64;
    let mut stack: Vec<(usize, usize, usize)> = Vec::new();

    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                if scores[(x, y, z)] <= threshold || labels[(x, y, z)] != 0 {
                    continue;
                }

                let label = next_label;
                next_label += 1;
                labels[(x, y, z)] = label;
                stack.push((x, y, z));

                while let Some(p) = stack.pop() {
                    for q in neighbors6(p, (nx, ny, nz)) {
                        if labels[q] == 0 && scores[q] > threshold {
                            labels[q] = label;
                            stack.push(q);
                        }
                    }
                }
            }
        }
    }

    Ok(labels)
}

/// Connected components with a dilation bridge.
///
/// Thresholds into a binary mask, dilates the mask by `radius` within each
/// Z slice (Manhattan ball), labels the dilated mask, then zeroes any voxel
/// outside the original mask. Detections separated by a gap of up to
/// `2 * radius` voxels in-plane merge into one label while the output
/// footprint stays equal to the undilated support. With `radius == 0` the
/// result is bit-identical to [`connected_components`].
pub fn dilated_components(
    scores: &Array3<f32>,
    threshold: f32,
    radius: usize,
) -> Result<Array3<u64>> {
    if radius == 0 {
        return connected_components(scores, threshold);
    }
    check_shape(scores.dim())?;

    let mask = scores.mapv(|v| v > threshold);
    let dilated = dilate_mask_2d(&mask, radius);

    let dilated_scores = dilated.mapv(|m| if m { 1.0f32 } else { 0.0 });
    let mut labels = connected_components(&dilated_scores, 0.0)?;

    // Prune voxels grown by the dilation.
    ndarray::Zip::from(&mut labels).and(&mask).for_each(|l, &m| {
        if !m {
            *l = 0;
        }
    });

    Ok(labels)
}

/// Dilate a binary mask by `radius` steps of 4-connectivity within each Z
/// slice, i.e. a Manhattan ball of the given radius in the XY plane.
fn dilate_mask_2d(mask: &Array3<bool>, radius: usize) -> Array3<bool> {
    let (nx, ny, nz) = mask.dim();
    let mut current = mask.clone();

    for _ in 0..radius {
        let mut next = current.clone();
        for z in 0..nz {
            for x in 0..nx {
                for y in 0..ny {
                    if current[(x, y, z)] {
                        continue;
                    }
                    let hit = (x > 0 && current[(x - 1, y, z)])
                        || (x + 1 < nx && current[(x + 1, y, z)])
                        || (y > 0 && current[(x, y - 1, z)])
                        || (y + 1 < ny && current[(x, y + 1, z)]);
                    if hit {
                        next[(x, y, z)] = true;
                    }
                }
            }
        }
        current = next;
    }

    current
}

fn check_shape(dim: (usize, usize, usize)) -> Result<()> {
    if dim.0 == 0 || dim.1 == 0 || dim.2 == 0 {
        return Err(CoreError::shape(format!(
            "empty volume: {}x{}x{}",
            dim.0, dim.1, dim.2
        )));
    }
    Ok(())
}

fn neighbors6(
    (x, y, z): (usize, usize, usize),
    (nx, ny, nz): (usize, usize, usize),
) -> impl Iterator<Item = (usize, usize, usize)> {
    let mut out = [(0usize, 0usize, 0usize); 6];
    let mut n = 0;
    if x > 0 {
        out[n] = (x - 1, y, z);
        n += 1;
    }
    if x + 1 < nx {
        out[n] = (x + 1, y, z);
        n += 1;
    }
    if y > 0 {
        out[n] = (x, y - 1, z);
        n += 1;
    }
    if y + 1 < ny {
        out[n] = (x, y + 1, z);
        n += 1;
    }
    if z > 0 {
        out[n] = (x, y, z - 1);
        n += 1;
    }
    if z + 1 < nz {
        out[n] = (x, y, z + 1);
        n += 1;
    }
    out.into_iter().take(n)
}

/// Voxel counts of every nonzero segment.
pub fn segment_sizes(labels: &Array3<u64>) -> FxHashMap<SegId, u64> {
    let mut sizes: FxHashMap<SegId, u64> = FxHashMap::default();
    for &v in labels.iter() {
        if v != 0 {
            *sizes.entry(SegId(v)).or_insert(0) += 1;
        }
    }
    sizes
}

/// Sizes, centroids, and bounding boxes of every nonzero segment, shifted
/// into global coordinates by the chunk `offset`. Single pass.
pub fn describe_segments(labels: &Array3<u64>, offset: Vec3) -> FxHashMap<SegId, SegmentInfo> {
    struct Acc {
        count: u64,
        sum: [f64; 3],
        min: [i64; 3],
        max: [i64; 3],
    }

    let mut accs: FxHashMap<SegId, Acc> = FxHashMap::default();
    for ((x, y, z), &v) in labels.indexed_iter() {
        if v == 0 {
            continue;
        }
        let p = [x as i64, y as i64, z as i64];
        let acc = accs.entry(SegId(v)).or_insert_with(|| Acc {
            count: 0,
            sum: [0.0; 3],
            min: p,
            max: p,
        });
        acc.count += 1;
        for i in 0..3 {
            acc.sum[i] += p[i] as f64;
            acc.min[i] = acc.min[i].min(p[i]);
            acc.max[i] = acc.max[i].max(p[i]);
        }
    }

    accs.into_iter()
        .map(|(id, acc)| {
            let n = acc.count as f64;
            let centroid = [
                acc.sum[0] / n + offset[0] as f64,
                acc.sum[1] / n + offset[1] as f64,
                acc.sum[2] / n + offset[2] as f64,
            ];
            let bbox = BBox::new(
                [
                    acc.min[0] + offset[0],
                    acc.min[1] + offset[1],
                    acc.min[2] + offset[2],
                ],
                [
                    acc.max[0] + offset[0] + 1,
                    acc.max[1] + offset[1] + 1,
                    acc.max[2] + offset[2] + 1,
                ],
            )
            .expect("voxel accumulation yields a valid box");
            (
                id,
                SegmentInfo {
                    size: acc.count,
                    centroid,
                    bbox,
                },
            )
        })
        .collect()
}

/// Zero out segments smaller than `threshold` voxels, except ids in
/// `ignore` (segments that continue into a neighboring chunk have unknown
/// true size and must survive until stitching). Returns the sizes of the
/// remaining segments.
pub fn filter_segments_by_size(
    labels: &mut Array3<u64>,
    threshold: u64,
    ignore: &FxHashSet<SegId>,
) -> FxHashMap<SegId, u64> {
    let sizes = segment_sizes(labels);
    let to_remove: FxHashSet<SegId> = sizes
        .iter()
        .filter(|(id, &sz)| sz < threshold && !ignore.contains(id))
        .map(|(&id, _)| id)
        .collect();

    if !to_remove.is_empty() {
        for v in labels.iter_mut() {
            if *v != 0 && to_remove.contains(&SegId(*v)) {
                *v = 0;
            }
        }
    }

    sizes
        .into_iter()
        .filter(|(id, _)| !to_remove.contains(id))
        .collect()
}

/// Rewrite a label volume through an id map. Values the map does not cover
/// pass through unchanged, matching id-map composition semantics.
pub fn relabel(labels: &mut Array3<u64>, map: &IdMap) {
    if map.is_empty() {
        return;
    }
    for v in labels.iter_mut() {
        if *v != 0 {
            *v = map.resolve(SegId(*v)).0;
        }
    }
}

/// Compact the nonzero values of a volume onto `1..=N` in ascending id
/// order, returning the applied map.
pub fn relabel_1n(labels: &mut Array3<u64>) -> IdMap {
    let mut ids: Vec<u64> = segment_sizes(labels).into_keys().map(|id| id.0).collect();
    ids.sort_unstable();
    let map: IdMap = ids
        .into_iter()
        .enumerate()
        .map(|(i, v)| (SegId(v), SegId(i as u64 + 1)))
        .collect();
    relabel(labels, &map);
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_with(points: &[(usize, usize, usize)], shape: (usize, usize, usize)) -> Array3<f32> {
        let mut v = Array3::<f32>::zeros(shape);
        for &p in points {
            v[p] = 1.0;
        }
        v
    }

    #[test]
    fn empty_volume_fails_fast() {
        let v = Array3::<f32>::zeros((0, 4, 4));
        assert!(matches!(
            connected_components(&v, 0.5),
            Err(CoreError::Shape(_))
        ));
    }

    #[test]
    fn six_connectivity_splits_diagonals() {
        // Two voxels touching only diagonally must get distinct labels.
        let v = volume_with(&[(0, 0, 0), (1, 1, 0)], (3, 3, 1));
        let labels = connected_components(&v, 0.5).unwrap();
        assert_ne!(labels[(0, 0, 0)], 0);
        assert_ne!(labels[(1, 1, 0)], 0);
        assert_ne!(labels[(0, 0, 0)], labels[(1, 1, 0)]);
    }

    #[test]
    fn face_adjacency_joins_components() {
        let v = volume_with(&[(0, 0, 0), (1, 0, 0), (1, 1, 0), (1, 1, 1)], (3, 3, 3));
        let labels = connected_components(&v, 0.5).unwrap();
        let l = labels[(0, 0, 0)];
        assert!(l != 0);
        assert_eq!(labels[(1, 0, 0)], l);
        assert_eq!(labels[(1, 1, 0)], l);
        assert_eq!(labels[(1, 1, 1)], l);
    }

    #[test]
    fn zero_radius_matches_plain_labeling() {
        let mut v = Array3::<f32>::zeros((6, 5, 4));
        for (i, val) in v.iter_mut().enumerate() {
            *val = ((i * 31 + 7) % 10) as f32 / 10.0;
        }
        let plain = connected_components(&v, 0.5).unwrap();
        let dilated = dilated_components(&v, 0.5, 0).unwrap();
        assert_eq!(plain, dilated);
    }

    #[test]
    fn dilation_bridges_in_plane_gaps() {
        // Two voxels 2 apart in x within one slice: distinct at radius 0,
        // merged at radius 1, and the bridge voxel stays background.
        let v = volume_with(&[(1, 2, 0), (3, 2, 0)], (6, 5, 1));

        let plain = connected_components(&v, 0.5).unwrap();
        assert_ne!(plain[(1, 2, 0)], plain[(3, 2, 0)]);

        let bridged = dilated_components(&v, 0.5, 1).unwrap();
        assert_eq!(bridged[(1, 2, 0)], bridged[(3, 2, 0)]);
        assert_ne!(bridged[(1, 2, 0)], 0);
        assert_eq!(bridged[(2, 2, 0)], 0);
    }

    #[test]
    fn dilation_does_not_bridge_across_slices() {
        // Same gap but across z; per-slice dilation must not close it.
        let v = volume_with(&[(2, 2, 0), (2, 2, 2)], (5, 5, 3));
        let labels = dilated_components(&v, 0.5, 1).unwrap();
        assert_ne!(labels[(2, 2, 0)], labels[(2, 2, 2)]);
    }

    #[test]
    fn describe_computes_size_centroid_bbox() {
        let v = volume_with(&[(1, 1, 1), (2, 1, 1)], (4, 4, 4));
        let labels = connected_components(&v, 0.5).unwrap();
        let infos = describe_segments(&labels, [10, 0, 0]);
        assert_eq!(infos.len(), 1);
        let info = infos.values().next().unwrap();
        assert_eq!(info.size, 2);
        assert_eq!(info.centroid, [11.5, 1.0, 1.0]);
        assert_eq!(info.bbox.min(), [11, 1, 1]);
        assert_eq!(info.bbox.max(), [13, 2, 2]);
    }

    #[test]
    fn size_filter_respects_ignore_set() {
        let v = volume_with(&[(0, 0, 0), (4, 4, 0), (4, 4, 1)], (5, 5, 2));
        let mut labels = connected_components(&v, 0.5).unwrap();
        let lone = SegId(labels[(0, 0, 0)]);

        let mut ignore = FxHashSet::default();
        ignore.insert(lone);
        let kept = filter_segments_by_size(&mut labels, 2, &ignore);
        assert_eq!(labels[(0, 0, 0)], lone.0);
        assert_eq!(kept.len(), 2);

        let kept = filter_segments_by_size(&mut labels, 2, &FxHashSet::default());
        assert_eq!(labels[(0, 0, 0)], 0);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn relabel_passes_unmapped_values_through() {
        let v = volume_with(&[(0, 0, 0), (2, 2, 0)], (3, 3, 1));
        let mut labels = connected_components(&v, 0.5).unwrap();
        let map: IdMap = [(SegId(1), SegId(41))].into_iter().collect();
        relabel(&mut labels, &map);
        assert_eq!(labels[(0, 0, 0)], 41);
        assert_eq!(labels[(2, 2, 0)], 2);
    }

    #[test]
    fn relabel_1n_compacts_ascending() {
        let v = volume_with(&[(0, 0, 0), (2, 2, 0)], (3, 3, 1));
        let mut labels = connected_components(&v, 0.5).unwrap();
        let map: IdMap = [(SegId(1), SegId(500)), (SegId(2), SegId(90))]
            .into_iter()
            .collect();
        relabel(&mut labels, &map);

        let compaction = relabel_1n(&mut labels);
        assert_eq!(labels[(2, 2, 0)], 1); // 90 is the smaller id
        assert_eq!(labels[(0, 0, 0)], 2);
        assert_eq!(compaction.resolve(SegId(90)), SegId(1));
        assert_eq!(compaction.resolve(SegId(500)), SegId(2));
    }
}
