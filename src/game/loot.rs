//! Collectible loot lying on the grid

use uuid::Uuid;

use super::entity::{Entity, ENTITY_HALF_EXTENT};
use super::grid::{tile_center, Cell, GridWorld, TilePos};

/// Value of the item a destroyed soft block drops
pub const BLOCK_LOOT_VALUE: u32 = 1;

/// An inert pickup
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Uuid,
    pub tile: TilePos,
    pub x: f32,
    pub y: f32,
    pub value: u32,
    pub collected: bool,
}

#[derive(Debug, Default)]
pub struct LootSystem {
    items: Vec<Item>,
}

impl LootSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a new item at the centre of `tile`
    pub fn spawn(&mut self, tile: TilePos, value: u32, grid: &mut GridWorld) -> Uuid {
        let (x, y) = tile_center(tile);
        let item = Item {
            id: Uuid::new_v4(),
            tile,
            x,
            y,
            value,
            collected: false,
        };
        let id = item.id;
        self.items.push(item);
        self.sync_tile(tile, grid);
        id
    }

    /// Credit the item to `entity`. Returns the value gained, or `None` when
    /// the item was already collected or does not exist.
    pub fn collect(&mut self, entity: &mut Entity, item_id: Uuid, grid: &mut GridWorld) -> Option<u32> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id && !i.collected)?;
        item.collected = true;
        let (tile, value) = (item.tile, item.value);

        entity.collected_loot += value;
        self.items.retain(|i| !i.collected);
        self.sync_tile(tile, grid);
        Some(value)
    }

    /// Uncollected items whose centre lies inside the entity's hitbox
    pub fn overlapping(&self, entity: &Entity) -> Vec<Uuid> {
        self.items
            .iter()
            .filter(|i| {
                !i.collected
                    && (i.x - entity.x).abs() <= ENTITY_HALF_EXTENT
                    && (i.y - entity.y).abs() <= ENTITY_HALF_EXTENT
            })
            .map(|i| i.id)
            .collect()
    }

    /// Total uncollected value lying on `tile`
    pub fn value_at(&self, tile: TilePos) -> u32 {
        self.items
            .iter()
            .filter(|i| !i.collected && i.tile == tile)
            .map(|i| i.value)
            .sum()
    }

    /// Re-mirror the items on `tile` into the grid. A bomb cell keeps its
    /// state; the mirror is restored once the bomb is gone.
    pub fn sync_tile(&self, tile: TilePos, grid: &mut GridWorld) {
        match grid.query_cell(tile) {
            Cell::Empty | Cell::Item(_) => {
                let value = self.value_at(tile);
                let cell = if value > 0 { Cell::Item(value) } else { Cell::Empty };
                grid.set_cell(tile, cell);
            }
            Cell::Hard | Cell::Soft | Cell::Bomb => {}
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: Uuid) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
