//! Deterministic terrain and resource generation.

use crate::chunk::{calc_cell_pos, TerrainGrid, CHUNK_WIDTH};
use crate::terrain::{TerrainKind, TerrainShaper};

mod node;

pub use node::{GenConfig, NodeGenerator};


/// Generate the terrain grid of one chunk by classifying every cell.
pub fn generate_terrain(shaper: &TerrainShaper, cx: i32, cy: i32) -> TerrainGrid {
    let mut grid = TerrainGrid::new_filled(TerrainKind::Water);
    for local_y in 0..CHUNK_WIDTH {
        for local_x in 0..CHUNK_WIDTH {
            let (x, y) = calc_cell_pos(cx, cy, local_x, local_y);
            grid.set(local_x, local_y, shaper.classify(x, y));
        }
    }
    grid
}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn terrain_is_seed_deterministic() {
        let a = generate_terrain(&TerrainShaper::new(12345), 3, -2);
        let b = generate_terrain(&TerrainShaper::new(12345), 3, -2);
        assert_eq!(a, b);
        let c = generate_terrain(&TerrainShaper::new(54321), 3, -2);
        assert_ne!(a, c);
    }

    #[test]
    fn neighbor_chunks_share_their_border() {
        // The cell at the east border of chunk (0, 0) and the cell at the
        // west border of chunk (1, 0) are classified from the same world
        // coordinates they respectively own, so the terrain is continuous:
        // classifying the world cell directly must agree with both grids.
        let shaper = TerrainShaper::new(777);
        let west = generate_terrain(&shaper, 0, 0);
        let east = generate_terrain(&shaper, 1, 0);
        for local_y in 0..CHUNK_WIDTH {
            assert_eq!(west.get(CHUNK_WIDTH - 1, local_y), shaper.classify(31, local_y as i32));
            assert_eq!(east.get(0, local_y), shaper.classify(32, local_y as i32));
        }
    }

}
