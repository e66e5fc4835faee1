//! # Volstitch
//!
//! Chunkwise connected-component labeling and cross-chunk consolidation for
//! 3D volumes too large to label in one pass.
//!
//! The volume is split into a regular grid of chunks, each chunk is labeled
//! independently, and the per-chunk results are reconciled into one globally
//! consistent labeling: segments touching across chunk seams are stitched,
//! records describing the same physical contact are merged, and size
//! corrections propagate through a composable chain of id maps
//! (renumber, stitch, dedup, size filter) applied once to the raw volumes.

pub mod bbox;
pub mod config;
pub mod continuation;
pub mod dedup;
pub mod dsu;
pub mod error;
pub mod grid;
pub mod identity;
pub mod idmap;
pub mod labeling;
pub mod merging;
pub mod model;
pub mod overlap;
pub mod pipeline;
pub mod sharding;
pub mod stitching;
pub mod store;

// Re-export main types for convenience
pub use bbox::{decode_chunk_tag, encode_chunk_tag, BBox};
pub use config::PipelineConfig;
pub use error::CoreError;
pub use grid::{ChunkCoord, ChunkGrid, GridGeometry};
pub use idmap::IdMap;
pub use model::{Face, FullRecord, PartnerPair, SegId, SegmentInfo, BACKGROUND};
pub use pipeline::ScoringOracle;
pub use store::{ChunkStore, IdMapStore, MemoryStore, RecordStore, StoreKey};

use anyhow::Result;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Main API for a consolidation run: owns the collaborator store, the grid
/// geometry, and the configuration, and drives the staged tasks.
pub struct Volstitch<S> {
    store: S,
    geometry: GridGeometry,
    config: PipelineConfig,
}

impl<S> Volstitch<S>
where
    S: ChunkStore + RecordStore + IdMapStore,
{
    pub fn new(store: S, geometry: GridGeometry, config: PipelineConfig) -> Self {
        Self {
            store,
            geometry,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Label a single chunk. Returns `false` when the chunk had already
    /// been committed.
    pub fn process_chunk(
        &self,
        desc_volume: &str,
        cc_volume: &str,
        coord: ChunkCoord,
    ) -> Result<bool> {
        let bbox = self.geometry.chunk_bbox(coord);
        pipeline::chunk_cc_task(
            &self.store,
            &self.store,
            &self.config,
            desc_volume,
            cc_volume,
            &bbox,
        )
    }

    /// Label every chunk of the grid in parallel.
    pub fn process_all_chunks(&self, desc_volume: &str, cc_volume: &str) -> Result<()> {
        let coords: Vec<_> = self.geometry.coords().collect();
        coords.par_iter().try_for_each(|&coord| {
            self.process_chunk(desc_volume, cc_volume, coord).map(|_| ())
        })
    }

    /// Run edge inference over one chunk through the supplied oracle.
    pub fn infer_chunk_edges(
        &self,
        oracle: &dyn ScoringOracle,
        image_volume: &str,
        cc_volume: &str,
        seg_volume: &str,
        coord: ChunkCoord,
    ) -> Result<bool> {
        let bbox = self.geometry.chunk_bbox(coord);
        pipeline::chunk_edge_task(
            oracle,
            &self.store,
            &self.store,
            image_volume,
            cc_volume,
            seg_volume,
            &bbox,
        )
    }

    /// Count one chunk's overlaps against a base segmentation.
    pub fn count_chunk_overlaps(
        &self,
        cc_volume: &str,
        base_volume: &str,
        coord: ChunkCoord,
    ) -> Result<bool> {
        let bbox = self.geometry.chunk_bbox(coord);
        pipeline::chunk_overlap_task(&self.store, &self.store, cc_volume, base_volume, &bbox)
    }

    /// Global consolidation: renumber, stitch across seams, size-filter the
    /// merged table, and commit the per-chunk id maps.
    pub fn consolidate(&self) -> Result<()> {
        pipeline::consolidate_task(
            &self.store,
            &self.store,
            &self.geometry,
            self.config.size_threshold,
        )
    }

    /// Merge duplicate records and commit the final record table.
    pub fn merge_duplicates(&self) -> Result<()> {
        pipeline::merge_duplicates_task(&self.store, &self.store, &self.geometry, &self.config)
    }

    /// Consolidate overlap matrices, returning the best-matching base
    /// segment per row.
    pub fn consolidate_overlaps(&self) -> Result<FxHashMap<SegId, SegId>> {
        pipeline::consolidate_overlaps_task(
            &self.store,
            &self.store,
            &self.geometry,
            self.config.hashmax,
        )
    }

    /// Apply the composed id-map chain to every chunk's label volume.
    pub fn relabel_volumes(&self, cc_volume: &str) -> Result<()> {
        pipeline::remap_task(&self.store, &self.store, &self.geometry, cc_volume)
    }

    /// The merged segment table committed by [`Volstitch::consolidate`].
    pub fn merged_segments(&self) -> Result<Option<FxHashMap<SegId, SegmentInfo>>> {
        self.store.read_segments(&StoreKey::Merged)
    }

    /// The final record table committed by [`Volstitch::merge_duplicates`].
    pub fn final_records(&self) -> Result<Option<FxHashMap<SegId, FullRecord>>> {
        self.store.read_full_records(&StoreKey::Final)
    }
}
