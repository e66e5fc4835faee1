//! # Pipeline Tasks
//!
//! The staged tasks a worker runs: per-chunk labeling (embarrassingly
//! parallel), the global consolidation reductions, duplicate merging,
//! overlap consolidation, and the final relabeling of chunk volumes. Every
//! keyed task starts with a completion probe, so rerunning a finished unit
//! is a cheap no-op. The size threshold runs after each merge stage and is
//! composed into the running id-map chain, never applied on its own.

use crate::bbox::BBox;
use crate::config::PipelineConfig;
use crate::continuation::extract_continuations;
use crate::dedup::{join_full_records, pick_largest_edges};
use crate::grid::{ChunkGrid, GridGeometry};
use crate::identity::{assign_global_ids, GlobalAssignment};
use crate::idmap::IdMap;
use crate::labeling::{dilated_components, describe_segments, filter_segments_by_size, relabel};
use crate::merging::{enforce_size_threshold, merge_table};
use crate::model::{EdgeRecord, SegId, SegmentInfo};
use crate::overlap::{count_overlaps, OverlapMatrix};
use crate::sharding::{sharded_consolidate_overlaps, sharded_merge_duplicates};
use crate::stitching::merge_continuations;
use crate::store::{ChunkStore, IdMapStore, RecordStore, StoreKey};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info, instrument};

/// Edge inference over one chunk. The network and the volume readers behind
/// it live outside the core; the pipeline only consumes the candidate
/// records it returns.
pub trait ScoringOracle: Send + Sync {
    fn infer_edges(
        &self,
        image: &ndarray::Array3<f32>,
        clefts: &ndarray::Array3<u64>,
        segmentation: &ndarray::Array3<u64>,
    ) -> Result<Vec<EdgeRecord>>;
}

/// Label one chunk: threshold + connected components (with the dilation
/// bridge), extract continuations, drop complete segments under the size
/// threshold, and commit the label volume plus the summary rows. Returns
/// `false` without doing work when the chunk was already committed.
#[instrument(skip(chunks, records, config), fields(tag = %StoreKey::chunk(bbox)))]
pub fn chunk_cc_task(
    chunks: &dyn ChunkStore,
    records: &dyn RecordStore,
    config: &PipelineConfig,
    desc_volume: &str,
    cc_volume: &str,
    bbox: &BBox,
) -> Result<bool> {
    let key = StoreKey::chunk(bbox);
    if records.has_segments(&key) && chunks.has_labels(cc_volume, bbox) {
        debug!("chunk already labeled, skipping");
        return Ok(false);
    }

    let scores = chunks
        .read_scores(desc_volume, bbox)?
        .ok_or_else(|| anyhow!("missing score chunk {key}"))?;

    let mut labels = dilated_components(&scores, config.cc_threshold, config.dilation_radius)?;

    let continuations = extract_continuations(&labels);
    let continuation_ids = continuations.segment_ids();

    // Segments that reach a face have unknown true size until stitching;
    // only complete segments are filtered here.
    filter_segments_by_size(&mut labels, config.size_threshold, &continuation_ids);

    let segments = describe_segments(&labels, bbox.min());
    info!(segments = segments.len(), "labeled chunk");

    chunks.write_labels(cc_volume, bbox, labels)?;
    records.write_continuations(&key, continuations)?;
    records.write_segments(&key, segments)?;
    Ok(true)
}

/// Run edge inference over one chunk and commit the candidate rows. Skips
/// chunks whose rows are already present.
#[instrument(skip(oracle, chunks, records), fields(tag = %StoreKey::chunk(bbox)))]
pub fn chunk_edge_task(
    oracle: &dyn ScoringOracle,
    chunks: &dyn ChunkStore,
    records: &dyn RecordStore,
    image_volume: &str,
    cc_volume: &str,
    seg_volume: &str,
    bbox: &BBox,
) -> Result<bool> {
    let key = StoreKey::chunk(bbox);
    if records.read_edges(&key)?.is_some() {
        debug!("chunk edges already inferred, skipping");
        return Ok(false);
    }

    let image = chunks
        .read_scores(image_volume, bbox)?
        .ok_or_else(|| anyhow!("missing image chunk {key}"))?;
    let clefts = chunks
        .read_labels(cc_volume, bbox)?
        .ok_or_else(|| anyhow!("missing label chunk {key}"))?;
    let segmentation = chunks
        .read_labels(seg_volume, bbox)?
        .ok_or_else(|| anyhow!("missing segmentation chunk {key}"))?;

    let edges = oracle.infer_edges(&image, &clefts, &segmentation)?;
    info!(edges = edges.len(), "inferred chunk edges");
    records.write_edges(&key, edges)?;
    Ok(true)
}

/// Count overlaps between the labeled chunk and a base segmentation and
/// commit the chunk's sparse matrix.
#[instrument(skip(chunks, records), fields(tag = %StoreKey::chunk(bbox)))]
pub fn chunk_overlap_task(
    chunks: &dyn ChunkStore,
    records: &dyn RecordStore,
    cc_volume: &str,
    base_volume: &str,
    bbox: &BBox,
) -> Result<bool> {
    let key = StoreKey::chunk(bbox);
    if records.read_overlaps(&key)?.is_some() {
        debug!("chunk overlaps already counted, skipping");
        return Ok(false);
    }

    let segs = chunks
        .read_labels(cc_volume, bbox)?
        .ok_or_else(|| anyhow!("missing label chunk {key}"))?;
    let base = chunks
        .read_labels(base_volume, bbox)?
        .ok_or_else(|| anyhow!("missing base chunk {key}"))?;

    records.write_overlaps(&key, count_overlaps(&segs, &base))?;
    Ok(true)
}

/// The global consolidation reduction: renumber every chunk's local ids
/// into a disjoint global space, stitch segments whose continuations touch
/// across seams, fold the summary table under the stitch map, then enforce
/// the size threshold over the merged sizes. Requires the full grid to be
/// present; an incomplete grid aborts before any write.
#[instrument(skip_all)]
pub fn consolidate_task(
    records: &dyn RecordStore,
    id_maps: &dyn IdMapStore,
    geometry: &GridGeometry,
    size_threshold: u64,
) -> Result<()> {
    let shape = geometry.grid_shape();
    let mut tables: ChunkGrid<FxHashMap<SegId, SegmentInfo>> = ChunkGrid::new(shape);
    let mut continuations = ChunkGrid::new(shape);
    for coord in geometry.coords() {
        let key = StoreKey::chunk(&geometry.chunk_bbox(coord));
        if let Some(rows) = records.read_segments(&key)? {
            tables.insert(coord, rows);
        }
        if let Some(conts) = records.read_continuations(&key)? {
            continuations.insert(coord, conts);
        }
    }
    tables.complete().context("segment tables")?;
    continuations.complete().context("continuations")?;

    let GlobalAssignment {
        mut chunk_maps,
        mut segments,
    } = assign_global_ids(&tables);

    for coord in geometry.coords() {
        let map = chunk_maps.get(coord).expect("grid checked complete");
        continuations
            .get_mut(coord)
            .expect("grid checked complete")
            .apply_id_map(map)?;
    }

    let stitch_map = merge_continuations(geometry, &continuations);
    merge_table(&mut segments, &stitch_map)?;

    // Stitching changed sizes; only now is the threshold meaningful.
    let threshold_map = enforce_size_threshold(&mut segments, size_threshold);

    info!(
        segments = segments.len(),
        stitched = stitch_map.len(),
        removed = threshold_map.len(),
        "consolidated chunk segments"
    );

    for coord in geometry.coords() {
        let map = chunk_maps.get_mut(coord).expect("grid checked complete");
        map.compose(&stitch_map);
        map.compose(&threshold_map);
        id_maps.write_id_map(&StoreKey::chunk(&geometry.chunk_bbox(coord)), map.clone())?;
    }
    records.write_segments(&StoreKey::Merged, segments)?;
    Ok(())
}

/// Resolve one winning edge per merged segment, join with the merged
/// summaries, merge duplicates (sharded by partner pair), and enforce the
/// size threshold over the post-merge sizes. Commits the final record table
/// and the dedup id map.
#[instrument(skip_all)]
pub fn merge_duplicates_task(
    records: &dyn RecordStore,
    id_maps: &dyn IdMapStore,
    geometry: &GridGeometry,
    config: &PipelineConfig,
) -> Result<()> {
    let mut all_edges = Vec::new();
    for coord in geometry.coords() {
        let key = StoreKey::chunk(&geometry.chunk_bbox(coord));
        let Some(rows) = records.read_edges(&key)? else {
            continue;
        };
        let map = id_maps
            .read_id_map(&key)?
            .ok_or_else(|| anyhow!("missing id map for {key}"))?;
        for mut edge in rows {
            edge.seg = map.resolve(edge.seg);
            if !edge.seg.is_background() {
                all_edges.push(edge);
            }
        }
    }

    let winners = pick_largest_edges(all_edges);
    let segments = records
        .read_segments(&StoreKey::Merged)?
        .ok_or_else(|| anyhow!("merged segment table not yet committed"))?;
    let mut full = join_full_records(&segments, &winners);

    let dup_map = sharded_merge_duplicates(
        &full,
        config.dist_threshold,
        config.voxel_res,
        config.hashmax,
    );
    merge_table(&mut full, &dup_map)?;

    // Duplicate merging changed sizes as well; threshold again and fold
    // both into one map.
    let threshold_map = enforce_size_threshold(&mut full, config.size_threshold);
    let final_map = IdMap::chained(&dup_map, &threshold_map);

    info!(
        records = full.len(),
        merged = dup_map.len(),
        removed = threshold_map.len(),
        "merged duplicate records"
    );

    id_maps.write_id_map(&StoreKey::Dedup, final_map)?;
    records.write_full_records(&StoreKey::Final, full)?;
    Ok(())
}

/// Consolidate every chunk's overlap matrix into the global matrix, with
/// rows remapped through the chunks' id maps, and return the per-row best
/// matching base segment.
#[instrument(skip_all)]
pub fn consolidate_overlaps_task(
    records: &dyn RecordStore,
    id_maps: &dyn IdMapStore,
    geometry: &GridGeometry,
    hashmax: usize,
) -> Result<FxHashMap<SegId, SegId>> {
    let mut matrices = Vec::new();
    for coord in geometry.coords() {
        let key = StoreKey::chunk(&geometry.chunk_bbox(coord));
        let Some(matrix) = records.read_overlaps(&key)? else {
            continue;
        };
        let map = id_maps
            .read_id_map(&key)?
            .ok_or_else(|| anyhow!("missing id map for {key}"))?;
        matrices.push(matrix.remap_rows(&map));
    }

    let consolidated = sharded_consolidate_overlaps(matrices, hashmax);
    let best = consolidated.max_overlaps();
    info!(entries = consolidated.len(), rows = best.len(), "consolidated overlaps");
    records.write_overlaps(&StoreKey::Merged, consolidated)?;
    Ok(best)
}

/// Relabel every chunk volume through its full id-map chain (renumber +
/// stitch + threshold, then dedup + threshold). Chunks relabel in parallel;
/// each only touches its own keyed artifacts.
#[instrument(skip_all)]
pub fn remap_task(
    chunks: &dyn ChunkStore,
    id_maps: &dyn IdMapStore,
    geometry: &GridGeometry,
    cc_volume: &str,
) -> Result<()> {
    let dedup_map = id_maps.read_id_map(&StoreKey::Dedup)?.unwrap_or_default();

    let coords: Vec<_> = geometry.coords().collect();
    coords.par_iter().try_for_each(|&coord| -> Result<()> {
        let bbox = geometry.chunk_bbox(coord);
        let key = StoreKey::chunk(&bbox);
        let chunk_map = id_maps
            .read_id_map(&key)?
            .ok_or_else(|| anyhow!("missing id map for {key}"))?;
        let full_map = IdMap::chained(&chunk_map, &dedup_map);

        let mut labels = chunks
            .read_labels(cc_volume, &bbox)?
            .ok_or_else(|| anyhow!("missing label chunk {key}"))?;
        relabel(&mut labels, &full_map);
        chunks.write_labels(cc_volume, &bbox, labels)
    })
}

/// An [`OverlapMatrix`] already consolidated for the whole dataset, read
/// back from the store.
pub fn read_consolidated_overlaps(records: &dyn RecordStore) -> Result<Option<OverlapMatrix>> {
    records.read_overlaps(&StoreKey::Merged)
}
