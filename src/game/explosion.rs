//! Directional blast propagation
//!
//! The centre tile is always hit. Each arm then walks outward up to the
//! bomb's range: a hard block or the grid edge stops the arm before it; a
//! soft block is hit, destroyed and stops the arm; anything else is hit and
//! the arm continues. Bombs caught in an arm keep their own fuse.

use uuid::Uuid;

use super::bomb::Bomb;
use super::entity::Direction;
use super::grid::{Cell, GridWorld, TilePos};
use super::loot::{LootSystem, BLOCK_LOOT_VALUE};

/// Everything one detonation touched
#[derive(Debug, Clone)]
pub struct Blast {
    pub bomb_id: Uuid,
    pub owner_id: Uuid,
    /// Damaged tiles, centre first, then arm by arm
    pub damaged: Vec<TilePos>,
    /// Soft blocks destroyed
    pub destroyed: Vec<TilePos>,
    pub spawned_items: Vec<(Uuid, TilePos)>,
}

pub struct ExplosionResolver;

impl ExplosionResolver {
    /// Resolve a detonation against the grid. Frees the bomb's own cell.
    pub fn resolve(bomb: &Bomb, grid: &mut GridWorld, loot: &mut LootSystem) -> Blast {
        let mut blast = Blast {
            bomb_id: bomb.id,
            owner_id: bomb.owner_id,
            damaged: vec![bomb.tile],
            destroyed: Vec::new(),
            spawned_items: Vec::new(),
        };

        for dir in Direction::ALL {
            let (dx, dy) = dir.delta();
            for dist in 1..=bomb.range as i32 {
                let tile = bomb.tile.offset(dx * dist, dy * dist);
                let cell = grid.query_cell(tile);
                if cell == Cell::Hard {
                    break;
                }

                blast.damaged.push(tile);

                if cell == Cell::Soft {
                    grid.set_cell(tile, Cell::Empty);
                    let item = loot.spawn(tile, BLOCK_LOOT_VALUE, grid);
                    blast.destroyed.push(tile);
                    blast.spawned_items.push((item, tile));
                    break;
                }
            }
        }

        if grid.query_cell(bomb.tile) == Cell::Bomb {
            grid.set_cell(bomb.tile, Cell::Empty);
            loot.sync_tile(bomb.tile, grid);
        }

        blast
    }
}
