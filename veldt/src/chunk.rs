//! Chunk data structures. This module only provides the immutable terrain
//! containers; materialization and region queries live in the
//! [`engine`](crate::engine) module.

use std::fmt;

use crate::terrain::TerrainKind;
use crate::node::ResourceNode;


/// Chunk width in cells, in both X and Y directions.
pub const CHUNK_WIDTH: usize = 32;
/// Number of cells in one chunk.
pub const CHUNK_AREA: usize = CHUNK_WIDTH * CHUNK_WIDTH;


/// Calculate the row-major index of a local cell position.
#[inline]
pub fn calc_cell_index(local_x: usize, local_y: usize) -> usize {
    debug_assert!(local_x < CHUNK_WIDTH && local_y < CHUNK_WIDTH);
    local_y * CHUNK_WIDTH + local_x
}

/// Calculate the chunk position containing the given world cell.
#[inline]
pub fn calc_chunk_pos(x: i32, y: i32) -> (i32, i32) {
    (x >> 5, y >> 5)
}

/// Calculate the world position of a local cell in the given chunk.
#[inline]
pub fn calc_cell_pos(cx: i32, cy: i32, local_x: usize, local_y: usize) -> (i32, i32) {
    debug_assert!(local_x < CHUNK_WIDTH && local_y < CHUNK_WIDTH);
    (cx * CHUNK_WIDTH as i32 + local_x as i32, cy * CHUNK_WIDTH as i32 + local_y as i32)
}


/// Row-major 32x32 grid of terrain cells.
#[derive(Clone, PartialEq, Eq)]
pub struct TerrainGrid(Box<[TerrainKind; CHUNK_AREA]>);

impl TerrainGrid {

    /// A grid with every cell set to the given kind.
    pub fn new_filled(kind: TerrainKind) -> Self {
        Self(Box::new([kind; CHUNK_AREA]))
    }

    /// Rebuild a grid from exactly [`CHUNK_AREA`] decoded cells.
    pub fn from_cells(cells: Vec<TerrainKind>) -> Option<Self> {
        let array: Box<[TerrainKind; CHUNK_AREA]> = cells.into_boxed_slice().try_into().ok()?;
        Some(Self(array))
    }

    #[inline]
    pub fn get(&self, local_x: usize, local_y: usize) -> TerrainKind {
        self.0[calc_cell_index(local_x, local_y)]
    }

    #[inline]
    pub fn set(&mut self, local_x: usize, local_y: usize, kind: TerrainKind) {
        self.0[calc_cell_index(local_x, local_y)] = kind;
    }

    /// All cells in row-major order.
    #[inline]
    pub fn cells(&self) -> &[TerrainKind] {
        &self.0[..]
    }

}

impl fmt::Debug for TerrainGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 1024 cells are noise in debug output, summarize instead.
        write!(f, "TerrainGrid({} cells)", CHUNK_AREA)
    }
}


/// An immutable generated chunk. Once persisted, its terrain never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk X coordinate.
    pub cx: i32,
    /// Chunk Y coordinate.
    pub cy: i32,
    /// Seed echo of the world that generated this chunk.
    pub seed: i64,
    /// Generation time, unix seconds UTC.
    pub generated_at: u64,
    /// The terrain cells.
    pub terrain: TerrainGrid,
}

/// A chunk together with the resource nodes it contains, the unit returned
/// to collaborators by the chunk engine.
#[derive(Debug, Clone)]
pub struct ChunkWithNodes {
    pub chunk: Chunk,
    pub nodes: Vec<ResourceNode>,
}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn row_major_indexing() {
        assert_eq!(calc_cell_index(0, 0), 0);
        assert_eq!(calc_cell_index(31, 0), 31);
        assert_eq!(calc_cell_index(0, 1), 32);
        assert_eq!(calc_cell_index(31, 31), CHUNK_AREA - 1);
    }

    #[test]
    fn chunk_and_cell_positions() {
        assert_eq!(calc_chunk_pos(0, 0), (0, 0));
        assert_eq!(calc_chunk_pos(31, 31), (0, 0));
        assert_eq!(calc_chunk_pos(32, -1), (1, -1));
        assert_eq!(calc_chunk_pos(-33, 64), (-2, 2));
        assert_eq!(calc_cell_pos(1, -1, 0, 31), (32, -1));
    }

    #[test]
    fn grid_roundtrip() {
        let mut grid = TerrainGrid::new_filled(TerrainKind::Water);
        grid.set(3, 7, TerrainKind::Stone);
        assert_eq!(grid.get(3, 7), TerrainKind::Stone);
        assert_eq!(grid.get(7, 3), TerrainKind::Water);
        let rebuilt = TerrainGrid::from_cells(grid.cells().to_vec()).unwrap();
        assert_eq!(rebuilt, grid);
        assert!(TerrainGrid::from_cells(vec![TerrainKind::Water; 1023]).is_none());
    }

}
