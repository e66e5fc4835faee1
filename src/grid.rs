//! # Chunk Grid Geometry
//!
//! Partitioning of a volume into a dense rectangular lattice of chunks, and
//! a flat container indexed by chunk coordinate. Pure coordinate math; the
//! grid must be complete before any global stage runs over it.

use crate::bbox::{BBox, Vec3};
use crate::error::{CoreError, Result};
use crate::model::Face;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid index of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl ChunkCoord {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    fn get(&self, axis: usize) -> usize {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    fn with(&self, axis: usize, value: usize) -> Self {
        let mut out = *self;
        match axis {
            0 => out.x = value,
            1 => out.y = value,
            _ => out.z = value,
        }
        out
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Describes how a volume splits into axis-aligned chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    offset: Vec3,
    volume_shape: [usize; 3],
    chunk_shape: [usize; 3],
    grid_shape: [usize; 3],
}

impl GridGeometry {
    pub fn new(offset: Vec3, volume_shape: [usize; 3], chunk_shape: [usize; 3]) -> Result<Self> {
        for axis in 0..3 {
            if volume_shape[axis] == 0 {
                return Err(CoreError::shape(format!("empty volume on axis {axis}")));
            }
            if chunk_shape[axis] == 0 {
                return Err(CoreError::shape(format!("zero chunk width on axis {axis}")));
            }
        }
        let grid_shape = [
            volume_shape[0].div_ceil(chunk_shape[0]),
            volume_shape[1].div_ceil(chunk_shape[1]),
            volume_shape[2].div_ceil(chunk_shape[2]),
        ];
        Ok(Self {
            offset,
            volume_shape,
            chunk_shape,
            grid_shape,
        })
    }

    pub fn grid_shape(&self) -> [usize; 3] {
        self.grid_shape
    }

    pub fn num_chunks(&self) -> usize {
        self.grid_shape[0] * self.grid_shape[1] * self.grid_shape[2]
    }

    /// The box covered by the chunk at `coord`. The trailing chunk along an
    /// axis keeps the full chunk width, matching how the chunking windows
    /// are laid out upstream of the stores.
    pub fn chunk_bbox(&self, coord: ChunkCoord) -> BBox {
        let min = [
            self.offset[0] + (coord.x * self.chunk_shape[0]) as i64,
            self.offset[1] + (coord.y * self.chunk_shape[1]) as i64,
            self.offset[2] + (coord.z * self.chunk_shape[2]) as i64,
        ];
        let max = [
            min[0] + self.chunk_shape[0] as i64,
            min[1] + self.chunk_shape[1] as i64,
            min[2] + self.chunk_shape[2] as i64,
        ];
        BBox::new(min, max).expect("chunk shape is nonzero")
    }

    /// All chunk coordinates in lexicographic order. Every global stage
    /// visits chunks in exactly this order, which makes id assignment
    /// reproducible.
    pub fn coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        let [nx, ny, nz] = self.grid_shape;
        (0..nx).flat_map(move |x| {
            (0..ny).flat_map(move |y| (0..nz).map(move |z| ChunkCoord::new(x, y, z)))
        })
    }

    /// All chunk boxes in the same order as [`GridGeometry::coords`].
    pub fn chunk_bboxes(&self) -> Vec<BBox> {
        self.coords().map(|c| self.chunk_bbox(c)).collect()
    }

    /// The neighbor across `face`, or `None` at the grid boundary.
    pub fn neighbor(&self, coord: ChunkCoord, face: Face) -> Option<ChunkCoord> {
        let along = coord.get(face.axis);
        if face.hi {
            if along + 1 >= self.grid_shape[face.axis] {
                None
            } else {
                Some(coord.with(face.axis, along + 1))
            }
        } else if along == 0 {
            None
        } else {
            Some(coord.with(face.axis, along - 1))
        }
    }
}

/// A dense container with one slot per chunk coordinate, stored as a flat
/// vec with an explicit shape. Slots fill in any order as chunk tasks
/// complete; global stages call [`ChunkGrid::complete`] first.
#[derive(Debug, Clone)]
pub struct ChunkGrid<T> {
    shape: [usize; 3],
    cells: Vec<Option<T>>,
}

impl<T> ChunkGrid<T> {
    pub fn new(shape: [usize; 3]) -> Self {
        let len = shape[0] * shape[1] * shape[2];
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || None);
        Self { shape, cells }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn index(&self, coord: ChunkCoord) -> usize {
        debug_assert!(
            coord.x < self.shape[0] && coord.y < self.shape[1] && coord.z < self.shape[2],
            "chunk coord {coord} out of grid {:?}",
            self.shape
        );
        (coord.x * self.shape[1] + coord.y) * self.shape[2] + coord.z
    }

    pub fn insert(&mut self, coord: ChunkCoord, value: T) -> Option<T> {
        let idx = self.index(coord);
        self.cells[idx].replace(value)
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<&T> {
        self.cells[self.index(coord)].as_ref()
    }

    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut T> {
        let idx = self.index(coord);
        self.cells[idx].as_mut()
    }

    /// Error unless every cell is populated. An incomplete grid means some
    /// chunk task has not been observed and global results would be wrong.
    pub fn complete(&self) -> Result<()> {
        let missing = self.cells.iter().filter(|c| c.is_none()).count();
        if missing > 0 {
            Err(CoreError::IncompleteGrid {
                missing,
                expected: self.cells.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Iterate populated cells in lexicographic coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkCoord, &T)> {
        let [_, ny, nz] = self.shape;
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.as_ref().map(|v| {
                let z = i % nz;
                let y = (i / nz) % ny;
                let x = i / (nz * ny);
                (ChunkCoord::new(x, y, z), v)
            })
        })
    }
}
