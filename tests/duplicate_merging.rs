#[path = "../src/test_support.rs"]
mod test_support;

use test_support::{edge_row, scores_with};
use volstitch::{
    BBox, ChunkStore, GridGeometry, MemoryStore, PartnerPair, PipelineConfig, RecordStore, SegId,
    StoreKey, Volstitch,
};

/// Two single-voxel detections in the left chunk, 3 voxels apart along x,
/// plus edge rows assigning both to the same partner pair (5, 9).
fn setup(dist_threshold: f64) -> anyhow::Result<Volstitch<MemoryStore>> {
    let geometry = GridGeometry::new([0, 0, 0], [20, 10, 10], [10, 10, 10]).unwrap();
    let store = MemoryStore::new();

    let left_bbox = BBox::new([0, 0, 0], [10, 10, 10]).unwrap();
    let right_bbox = BBox::new([10, 0, 0], [20, 10, 10]).unwrap();
    let left = scores_with(&[(1, 1, 1), (4, 1, 1)], (10, 10, 10));
    let right = scores_with(&[], (10, 10, 10));
    store.write_scores("desc", &left_bbox, left)?;
    store.write_scores("desc", &right_bbox, right)?;

    let config = PipelineConfig {
        cc_threshold: 0.5,
        size_threshold: 1,
        dilation_radius: 0,
        dist_threshold,
        voxel_res: [4.0, 4.0, 40.0],
        hashmax: 8,
        ..PipelineConfig::default()
    };
    let engine = Volstitch::new(store, geometry, config);

    engine.process_all_chunks("desc", "ccs")?;
    engine.consolidate()?;

    // Scan order labels (1,1,1) first: local ids 1 and 2, global 1 and 2.
    engine.store().write_edges(
        &StoreKey::chunk(&left_bbox),
        vec![edge_row(1, 5, 9, 1), edge_row(2, 5, 9, 1)],
    )?;
    Ok(engine)
}

#[test]
fn close_records_with_same_partners_merge() -> anyhow::Result<()> {
    // Centroids 3 voxels apart at (4,4,40) nm/voxel: 12 nm < 1000.
    let engine = setup(1000.0)?;
    engine.merge_duplicates()?;

    let finals = engine.final_records()?.unwrap();
    assert_eq!(finals.len(), 1);
    let record = &finals[&SegId(1)];
    assert_eq!(record.seg, SegId(1));
    assert_eq!(record.info.size, 2);
    assert_eq!(record.partners, PartnerPair::new(SegId(5), SegId(9)));
    assert_eq!(record.info.centroid, [2.5, 1.0, 1.0]);
    Ok(())
}

#[test]
fn distant_records_stay_separate() -> anyhow::Result<()> {
    // Same layout, but 12 nm is beyond a 5 nm threshold.
    let engine = setup(5.0)?;
    engine.merge_duplicates()?;

    let finals = engine.final_records()?.unwrap();
    assert_eq!(finals.len(), 2);
    assert!(finals.contains_key(&SegId(1)));
    assert!(finals.contains_key(&SegId(2)));
    Ok(())
}

#[test]
fn winner_fields_come_from_the_largest_record() -> anyhow::Result<()> {
    let geometry = GridGeometry::new([0, 0, 0], [10, 10, 10], [10, 10, 10]).unwrap();
    let store = MemoryStore::new();
    let bbox = BBox::new([0, 0, 0], [10, 10, 10]).unwrap();

    // Segment 2 is larger (3 voxels vs 1), so its edge fields win even
    // though the surviving id is the smaller 1.
    let scores = scores_with(&[(1, 1, 1), (4, 1, 1), (4, 2, 1), (4, 1, 2)], (10, 10, 10));
    store.write_scores("desc", &bbox, scores)?;

    let config = PipelineConfig {
        cc_threshold: 0.5,
        size_threshold: 1,
        dilation_radius: 0,
        dist_threshold: 1000.0,
        voxel_res: [4.0, 4.0, 40.0],
        hashmax: 8,
        ..PipelineConfig::default()
    };
    let engine = Volstitch::new(store, geometry, config);
    engine.process_all_chunks("desc", "ccs")?;
    engine.consolidate()?;

    engine.store().write_edges(
        &StoreKey::chunk(&bbox),
        vec![edge_row(1, 5, 9, 1), {
            let mut e = edge_row(2, 5, 9, 3);
            e.presyn_weight = 0.42;
            e
        }],
    )?;

    engine.merge_duplicates()?;
    let finals = engine.final_records()?.unwrap();
    assert_eq!(finals.len(), 1);
    let record = &finals[&SegId(1)];
    assert_eq!(record.info.size, 4);
    assert_eq!(record.presyn_weight, 0.42);
    Ok(())
}

#[test]
fn segments_without_edges_drop_out_of_the_final_table() -> anyhow::Result<()> {
    let engine = setup(1000.0)?;
    // Only give segment 1 an edge row.
    engine.store().write_edges(
        &StoreKey::chunk(&BBox::new([0, 0, 0], [10, 10, 10]).unwrap()),
        vec![edge_row(1, 5, 9, 1)],
    )?;
    engine.merge_duplicates()?;

    let finals = engine.final_records()?.unwrap();
    assert_eq!(finals.len(), 1);
    assert!(finals.contains_key(&SegId(1)));
    Ok(())
}
