//! Player and bot entities, movement integration

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bot::BotBrain;
use super::grid::{tile_center, tile_of, GridWorld, TilePos, TILE_SIZE};
use super::TickInput;

/// Half the edge of an entity's square hitbox
pub const ENTITY_HALF_EXTENT: f32 = 18.0;

/// Movement speed in world units per second
pub const DEFAULT_SPEED: f32 = 160.0;

pub const DEFAULT_BOMB_CAPACITY: u32 = 1;
pub const DEFAULT_BOMB_RANGE: u32 = 2;

/// Cardinal direction on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Fixed scan order shared by blasts and bots
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// Human movement source: single-axis steering and an edge-triggered bomb key
#[derive(Debug, Clone, Default)]
pub struct PlayerPilot {
    pub heading: Option<Direction>,
    pub last_input_seq: u32,
    bomb_held: bool,
    pending_bomb: bool,
}

impl PlayerPilot {
    /// Fold one tick of input. Horizontal input wins when both axes are set.
    pub fn apply(&mut self, input: &TickInput) {
        self.heading = if input.move_x < 0 {
            Some(Direction::Left)
        } else if input.move_x > 0 {
            Some(Direction::Right)
        } else if input.move_y < 0 {
            Some(Direction::Up)
        } else if input.move_y > 0 {
            Some(Direction::Down)
        } else {
            None
        };

        if input.place_bomb && !self.bomb_held {
            self.pending_bomb = true;
        }
        self.bomb_held = input.place_bomb;
        self.last_input_seq = input.seq;
    }

    fn take_bomb_request(&mut self) -> bool {
        std::mem::take(&mut self.pending_bomb)
    }
}

/// Where an entity's movement comes from
#[derive(Debug, Clone)]
pub enum Pilot {
    Player(PlayerPilot),
    Bot(BotBrain),
}

/// A combatant (authoritative)
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: Uuid,
    pub display_name: String,
    pub is_human: bool,

    // Position in world units
    pub x: f32,
    pub y: f32,
    pub facing: Direction,
    pub speed: f32,

    pub alive: bool,
    pub bombs_active: u32,
    pub bomb_capacity: u32,
    pub bomb_range: u32,
    pub collected_loot: u32,
    pub rank: Option<u32>,
    pub killer_id: Option<Uuid>,

    pub pilot: Pilot,
}

impl Entity {
    fn new(id: Uuid, display_name: String, is_human: bool, spawn: TilePos, pilot: Pilot) -> Self {
        let (x, y) = tile_center(spawn);
        Self {
            id,
            display_name,
            is_human,
            x,
            y,
            facing: Direction::Down,
            speed: DEFAULT_SPEED,
            alive: true,
            bombs_active: 0,
            bomb_capacity: DEFAULT_BOMB_CAPACITY,
            bomb_range: DEFAULT_BOMB_RANGE,
            collected_loot: 0,
            rank: None,
            killer_id: None,
            pilot,
        }
    }

    pub fn human(id: Uuid, display_name: String, spawn: TilePos) -> Self {
        Self::new(id, display_name, true, spawn, Pilot::Player(PlayerPilot::default()))
    }

    pub fn bot(id: Uuid, display_name: String, spawn: TilePos) -> Self {
        Self::new(id, display_name, false, spawn, Pilot::Bot(BotBrain::default()))
    }

    /// Tile under the entity's centre
    pub fn tile(&self) -> TilePos {
        tile_of(self.x, self.y)
    }

    pub fn heading(&self) -> Option<Direction> {
        match &self.pilot {
            Pilot::Player(pilot) => pilot.heading,
            Pilot::Bot(brain) => brain.heading,
        }
    }

    pub fn has_spare_bomb(&self) -> bool {
        self.bombs_active < self.bomb_capacity
    }

    /// Consume a pending bomb request from the pilot, if any
    pub fn take_bomb_request(&mut self) -> bool {
        match &mut self.pilot {
            Pilot::Player(pilot) => pilot.take_bomb_request(),
            Pilot::Bot(brain) => brain.take_bomb_request(),
        }
    }

    /// Whether the entity's hitbox overlaps the given tile's box
    pub fn overlaps_tile(&self, tile: TilePos) -> bool {
        let (cx, cy) = tile_center(tile);
        let reach = ENTITY_HALF_EXTENT + TILE_SIZE / 2.0;
        (self.x - cx).abs() < reach && (self.y - cy).abs() < reach
    }

    /// Move along the current heading for `dt` seconds. Blocked tiles stop
    /// the entity at their edge, except tiles its hitbox already overlaps
    /// (so it can walk off a bomb it just placed).
    pub fn integrate(&mut self, dt: f32, grid: &GridWorld) {
        if !self.alive {
            return;
        }
        let Some(dir) = self.heading() else {
            return;
        };
        self.facing = dir;

        let step = self.speed * dt;
        let (dx, dy) = dir.delta();
        let (lane_x, lane_y) = tile_center(self.tile());

        if dir.is_horizontal() {
            self.y = approach(self.y, lane_y, step);
            let target = self.x + dx as f32 * step;
            self.x = self.clamp_axis(target, dx, true, grid);
        } else {
            self.x = approach(self.x, lane_x, step);
            let target = self.y + dy as f32 * step;
            self.y = self.clamp_axis(target, dy, false, grid);
        }
    }

    fn clamp_axis(&self, target: f32, sign: i32, horizontal: bool, grid: &GridWorld) -> f32 {
        let (along, across) = if horizontal { (self.x, self.y) } else { (self.y, self.x) };
        let lead = target + sign as f32 * ENTITY_HALF_EXTENT;
        let lead_tile = (lead / TILE_SIZE).floor() as i32;
        let first = ((across - ENTITY_HALF_EXTENT) / TILE_SIZE).floor() as i32;
        let last = ((across + ENTITY_HALF_EXTENT) / TILE_SIZE).floor() as i32;

        let blocked = (first..=last).any(|cross| {
            let tile = if horizontal {
                TilePos::new(lead_tile, cross)
            } else {
                TilePos::new(cross, lead_tile)
            };
            grid.is_blocked(tile) && !self.overlaps_tile(tile)
        });

        if !blocked {
            return target;
        }

        // Stop flush against the blocking tile without moving backwards.
        if sign > 0 {
            let edge = lead_tile as f32 * TILE_SIZE - ENTITY_HALF_EXTENT - 0.01;
            edge.max(along).min(target)
        } else {
            let edge = (lead_tile + 1) as f32 * TILE_SIZE + ENTITY_HALF_EXTENT + 0.01;
            edge.min(along).max(target)
        }
    }
}

/// Move `value` toward `goal` by at most `max_step`
fn approach(value: f32, goal: f32, max_step: f32) -> f32 {
    if (goal - value).abs() <= max_step {
        goal
    } else {
        value + max_step.copysign(goal - value)
    }
}
