//! # Collaborator Stores
//!
//! Storage-abstraction traits the pipeline runs against: dense chunk
//! volumes, tabular per-chunk records, and id maps. Backends may be flat
//! files, object storage, or a database; the core only sees these traits.
//! Absent artifacts come back as `Ok(None)`; "absent, treat as empty" is a
//! caller decision, distinct from an I/O failure.

use crate::bbox::{encode_chunk_tag, BBox};
use crate::continuation::ChunkContinuations;
use crate::idmap::IdMap;
use crate::model::{EdgeRecord, FullRecord, SegId, SegmentInfo};
use crate::overlap::OverlapMatrix;
use anyhow::Result;
use ndarray::Array3;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;

/// Key for tabular and id-map artifacts: per-chunk rows are keyed by the
/// canonical chunk tag, sharded artifacts by shard index, and the global
/// reduction outputs by fixed names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Chunk(String),
    Shard(usize),
    Merged,
    Dedup,
    Final,
}

impl StoreKey {
    /// The per-chunk key for a chunk covering `bbox`.
    pub fn chunk(bbox: &BBox) -> Self {
        StoreKey::Chunk(encode_chunk_tag(bbox))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Chunk(tag) => write!(f, "chunk:{tag}"),
            StoreKey::Shard(idx) => write!(f, "shard:{idx}"),
            StoreKey::Merged => write!(f, "merged"),
            StoreKey::Dedup => write!(f, "dedup"),
            StoreKey::Final => write!(f, "final"),
        }
    }
}

/// Dense volume storage keyed by volume name and covered box.
pub trait ChunkStore: Send + Sync {
    fn read_scores(&self, volume: &str, bbox: &BBox) -> Result<Option<Array3<f32>>>;
    fn write_scores(&self, volume: &str, bbox: &BBox, data: Array3<f32>) -> Result<()>;
    fn read_labels(&self, volume: &str, bbox: &BBox) -> Result<Option<Array3<u64>>>;
    fn write_labels(&self, volume: &str, bbox: &BBox, data: Array3<u64>) -> Result<()>;
    /// Cheap completion probe for idempotent task reruns.
    fn has_labels(&self, volume: &str, bbox: &BBox) -> bool;
}

/// Tabular record storage keyed by [`StoreKey`].
pub trait RecordStore: Send + Sync {
    fn read_segments(&self, key: &StoreKey) -> Result<Option<FxHashMap<SegId, SegmentInfo>>>;
    fn write_segments(&self, key: &StoreKey, rows: FxHashMap<SegId, SegmentInfo>) -> Result<()>;

    fn read_continuations(&self, key: &StoreKey) -> Result<Option<ChunkContinuations>>;
    fn write_continuations(&self, key: &StoreKey, rows: ChunkContinuations) -> Result<()>;

    fn read_edges(&self, key: &StoreKey) -> Result<Option<Vec<EdgeRecord>>>;
    fn write_edges(&self, key: &StoreKey, rows: Vec<EdgeRecord>) -> Result<()>;

    fn read_full_records(&self, key: &StoreKey) -> Result<Option<FxHashMap<SegId, FullRecord>>>;
    fn write_full_records(&self, key: &StoreKey, rows: FxHashMap<SegId, FullRecord>)
        -> Result<()>;

    fn read_overlaps(&self, key: &StoreKey) -> Result<Option<OverlapMatrix>>;
    fn write_overlaps(&self, key: &StoreKey, matrix: OverlapMatrix) -> Result<()>;

    /// Cheap completion probe: has a segment table been committed under
    /// `key`?
    fn has_segments(&self, key: &StoreKey) -> bool;
}

/// Id-map storage keyed by [`StoreKey`].
pub trait IdMapStore: Send + Sync {
    fn read_id_map(&self, key: &StoreKey) -> Result<Option<IdMap>>;
    fn write_id_map(&self, key: &StoreKey, map: IdMap) -> Result<()>;
}

type VolumeKey = (String, BBox);

/// In-memory implementation of all three stores, used by tests and by
/// single-process runs. Interior mutability so parallel chunk workers can
/// commit results concurrently.
#[derive(Default)]
pub struct MemoryStore {
    scores: RwLock<FxHashMap<VolumeKey, Array3<f32>>>,
    labels: RwLock<FxHashMap<VolumeKey, Array3<u64>>>,
    segments: RwLock<FxHashMap<StoreKey, FxHashMap<SegId, SegmentInfo>>>,
    continuations: RwLock<FxHashMap<StoreKey, ChunkContinuations>>,
    edges: RwLock<FxHashMap<StoreKey, Vec<EdgeRecord>>>,
    full_records: RwLock<FxHashMap<StoreKey, FxHashMap<SegId, FullRecord>>>,
    overlaps: RwLock<FxHashMap<StoreKey, OverlapMatrix>>,
    id_maps: RwLock<FxHashMap<StoreKey, IdMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for MemoryStore {
    fn read_scores(&self, volume: &str, bbox: &BBox) -> Result<Option<Array3<f32>>> {
        Ok(self.scores.read().get(&(volume.to_string(), *bbox)).cloned())
    }

    fn write_scores(&self, volume: &str, bbox: &BBox, data: Array3<f32>) -> Result<()> {
        self.scores.write().insert((volume.to_string(), *bbox), data);
        Ok(())
    }

    fn read_labels(&self, volume: &str, bbox: &BBox) -> Result<Option<Array3<u64>>> {
        Ok(self.labels.read().get(&(volume.to_string(), *bbox)).cloned())
    }

    fn write_labels(&self, volume: &str, bbox: &BBox, data: Array3<u64>) -> Result<()> {
        self.labels.write().insert((volume.to_string(), *bbox), data);
        Ok(())
    }

    fn has_labels(&self, volume: &str, bbox: &BBox) -> bool {
        self.labels.read().contains_key(&(volume.to_string(), *bbox))
    }
}

impl RecordStore for MemoryStore {
    fn read_segments(&self, key: &StoreKey) -> Result<Option<FxHashMap<SegId, SegmentInfo>>> {
        Ok(self.segments.read().get(key).cloned())
    }

    fn write_segments(&self, key: &StoreKey, rows: FxHashMap<SegId, SegmentInfo>) -> Result<()> {
        self.segments.write().insert(key.clone(), rows);
        Ok(())
    }

    fn read_continuations(&self, key: &StoreKey) -> Result<Option<ChunkContinuations>> {
        Ok(self.continuations.read().get(key).cloned())
    }

    fn write_continuations(&self, key: &StoreKey, rows: ChunkContinuations) -> Result<()> {
        self.continuations.write().insert(key.clone(), rows);
        Ok(())
    }

    fn read_edges(&self, key: &StoreKey) -> Result<Option<Vec<EdgeRecord>>> {
        Ok(self.edges.read().get(key).cloned())
    }

    fn write_edges(&self, key: &StoreKey, rows: Vec<EdgeRecord>) -> Result<()> {
        self.edges.write().insert(key.clone(), rows);
        Ok(())
    }

    fn read_full_records(&self, key: &StoreKey) -> Result<Option<FxHashMap<SegId, FullRecord>>> {
        Ok(self.full_records.read().get(key).cloned())
    }

    fn write_full_records(
        &self,
        key: &StoreKey,
        rows: FxHashMap<SegId, FullRecord>,
    ) -> Result<()> {
        self.full_records.write().insert(key.clone(), rows);
        Ok(())
    }

    fn read_overlaps(&self, key: &StoreKey) -> Result<Option<OverlapMatrix>> {
        Ok(self.overlaps.read().get(key).cloned())
    }

    fn write_overlaps(&self, key: &StoreKey, matrix: OverlapMatrix) -> Result<()> {
        self.overlaps.write().insert(key.clone(), matrix);
        Ok(())
    }

    fn has_segments(&self, key: &StoreKey) -> bool {
        self.segments.read().contains_key(key)
    }
}

impl IdMapStore for MemoryStore {
    fn read_id_map(&self, key: &StoreKey) -> Result<Option<IdMap>> {
        Ok(self.id_maps.read().get(key).cloned())
    }

    fn write_id_map(&self, key: &StoreKey, map: IdMap) -> Result<()> {
        self.id_maps.write().insert(key.clone(), map);
        Ok(())
    }
}
