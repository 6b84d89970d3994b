//! Bomb placement and fuse countdown

use uuid::Uuid;

use super::entity::Entity;
use super::grid::{Cell, GridWorld, TilePos};

/// Time from placement to detonation
pub const FUSE_MS: f32 = 3000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BombState {
    Armed,
    Exploding,
}

/// A placed bomb. Owns the `Cell::Bomb` on its tile until it is removed.
#[derive(Debug, Clone)]
pub struct Bomb {
    pub id: Uuid,
    pub tile: TilePos,
    pub range: u32,
    pub owner_id: Uuid,
    pub fuse_remaining_ms: f32,
    pub state: BombState,
    /// Match epoch the bomb was armed under
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct BombController {
    bombs: Vec<Bomb>,
}

impl BombController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a bomb on the entity's tile. Returns `None` without touching
    /// anything when the entity is dead, out of bombs, or the tile is not
    /// free.
    pub fn place(&mut self, entity: &mut Entity, epoch: u64, grid: &mut GridWorld) -> Option<Uuid> {
        if !entity.alive || !entity.has_spare_bomb() {
            return None;
        }

        let tile = entity.tile();
        if !matches!(grid.query_cell(tile), Cell::Empty | Cell::Item(_)) {
            return None;
        }

        grid.set_cell(tile, Cell::Bomb);
        entity.bombs_active += 1;

        let bomb = Bomb {
            id: Uuid::new_v4(),
            tile,
            range: entity.bomb_range,
            owner_id: entity.id,
            fuse_remaining_ms: FUSE_MS,
            state: BombState::Armed,
            epoch,
        };
        let id = bomb.id;
        self.bombs.push(bomb);
        Some(id)
    }

    /// Burn `dt_ms` off every armed fuse. Bombs whose fuse ran out are
    /// removed and returned in placement order, already `Exploding`. Bombs
    /// armed under another epoch are dropped without exploding.
    pub fn tick(&mut self, dt_ms: f32, epoch: u64) -> Vec<Bomb> {
        self.bombs.retain(|b| b.epoch == epoch);

        let mut expired = Vec::new();
        let mut remaining = Vec::with_capacity(self.bombs.len());
        for mut bomb in self.bombs.drain(..) {
            if bomb.state == BombState::Armed {
                bomb.fuse_remaining_ms -= dt_ms;
                if bomb.fuse_remaining_ms <= 0.0 {
                    bomb.state = BombState::Exploding;
                }
            }
            if bomb.state == BombState::Exploding {
                expired.push(bomb);
            } else {
                remaining.push(bomb);
            }
        }
        self.bombs = remaining;
        expired
    }

    pub fn bombs(&self) -> &[Bomb] {
        &self.bombs
    }

    pub fn len(&self) -> usize {
        self.bombs.len()
    }

    pub fn clear(&mut self) {
        self.bombs.clear();
    }
}
