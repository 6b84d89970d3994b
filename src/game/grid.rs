//! Authoritative tile grid and procedural generation

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Edge length of one tile in world units
pub const TILE_SIZE: f32 = 48.0;

/// Random draws allowed while scattering soft blocks
pub const SOFT_BLOCK_RETRY_BUDGET: u32 = 1000;

/// State of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    /// Indestructible wall
    Hard,
    /// Destructible block, drops loot when blasted
    Soft,
    Bomb,
    /// Uncollected loot lying on the tile
    Item(u32),
}

/// Integer tile coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbour offset by `(dx, dy)` tiles
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Tile containing the world point `(x, y)`
pub fn tile_of(x: f32, y: f32) -> TilePos {
    TilePos::new((x / TILE_SIZE).floor() as i32, (y / TILE_SIZE).floor() as i32)
}

/// World coordinates of a tile's centre
pub fn tile_center(tile: TilePos) -> (f32, f32) {
    (
        tile.x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        tile.y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
    )
}

/// The tile grid. Out-of-bounds reads behave exactly like `Cell::Hard`.
#[derive(Debug, Clone)]
pub struct GridWorld {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl GridWorld {
    /// An all-empty grid, mostly useful for building fixtures
    pub fn empty(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![Cell::Empty; (width * height) as usize],
        }
    }

    /// Build the arena: hard border and pillars, then scatter soft blocks
    /// outside the safe zones. Falls short of `soft_block_target` rather than
    /// failing when the retry budget runs out.
    pub fn generate<R: Rng + ?Sized>(
        width: i32,
        height: i32,
        soft_block_target: u32,
        safe_zones: &[TilePos],
        rng: &mut R,
    ) -> Self {
        let mut grid = Self::empty(width, height);

        for y in 0..grid.height {
            for x in 0..grid.width {
                let border = x == 0 || y == 0 || x == grid.width - 1 || y == grid.height - 1;
                if border || (x % 2 == 0 && y % 2 == 0) {
                    grid.set_cell(TilePos::new(x, y), Cell::Hard);
                }
            }
        }

        let mut placed = 0;
        let mut tries = 0;
        while placed < soft_block_target && tries < SOFT_BLOCK_RETRY_BUDGET {
            tries += 1;
            let tile = TilePos::new(rng.gen_range(0..grid.width), rng.gen_range(0..grid.height));
            if grid.query_cell(tile) != Cell::Empty || safe_zones.contains(&tile) {
                continue;
            }
            grid.set_cell(tile, Cell::Soft);
            placed += 1;
        }

        if placed < soft_block_target {
            debug!(
                placed,
                target = soft_block_target,
                "Soft block retry budget exhausted, continuing with fewer blocks"
            );
        }

        grid
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, tile: TilePos) -> bool {
        tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height
    }

    fn index(&self, tile: TilePos) -> Option<usize> {
        self.in_bounds(tile)
            .then(|| (tile.y * self.width + tile.x) as usize)
    }

    /// Cell state, or `Cell::Hard` outside the grid
    pub fn query_cell(&self, tile: TilePos) -> Cell {
        self.index(tile).map(|i| self.cells[i]).unwrap_or(Cell::Hard)
    }

    /// Unconditional write; writes outside the grid are dropped
    pub fn set_cell(&mut self, tile: TilePos, cell: Cell) {
        if let Some(i) = self.index(tile) {
            self.cells[i] = cell;
        }
    }

    pub fn is_walkable(&self, tile: TilePos) -> bool {
        matches!(self.query_cell(tile), Cell::Empty | Cell::Item(_))
    }

    pub fn is_blocked(&self, tile: TilePos) -> bool {
        !self.is_walkable(tile)
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|c| **c == cell).count()
    }

    /// Row-major copy of all cells, for the join message
    pub fn rows(&self) -> Vec<Vec<Cell>> {
        self.cells
            .chunks(self.width as usize)
            .map(|row| row.to_vec())
            .collect()
    }
}
