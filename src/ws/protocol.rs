//! WebSocket protocol message definitions
//! These are the wire types between the match and the human's client

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entity::Direction;
use crate::game::grid::{Cell, TilePos};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Player input for current tick
    Input {
        /// Sequence number, stale inputs are dropped
        seq: u32,
        /// -1 = left, 1 = right
        move_x: i8,
        /// -1 = up, 1 = down
        move_y: i8,
        /// Bomb key currently held; a bomb drops on the press, not while held
        place_bomb: bool,
    },

    /// Freeze the match clock
    Pause,

    /// Unfreeze the match clock
    Resume,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Abandon the match
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        server_time: u64,
    },

    /// Initial arena sent once the session is attached to its match
    MatchJoined {
        match_id: Uuid,
        /// Seed the arena was generated from
        seed: u64,
        grid: GridInfo,
        entities: Vec<EntityInfo>,
    },

    /// Game state snapshot (sent at regular intervals)
    Snapshot {
        /// Server tick number
        tick: u64,
        /// Match clock in milliseconds
        time_ms: u64,
        alive_count: u32,
        entities: Vec<EntitySnapshot>,
        bombs: Vec<BombSnapshot>,
        items: Vec<ItemSnapshot>,
        zone: Option<ZoneState>,
        /// Events that occurred since last snapshot
        events: Vec<GameEvent>,
    },

    /// Pause state changed
    PauseChanged {
        paused: bool,
    },

    /// Match has ended
    MatchEnd {
        summary: MatchSummary,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Full arena layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridInfo {
    pub width: i32,
    pub height: i32,
    pub tile_size: f32,
    /// Row-major cells
    pub cells: Vec<Vec<Cell>>,
}

/// Static entity info for the join message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_id: Uuid,
    pub display_name: String,
    pub is_human: bool,
}

/// Entity state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub facing: Direction,
    pub moving: bool,
    pub alive: bool,
    pub bombs_active: u32,
    pub collected_loot: u32,
    /// Last processed input sequence (human only)
    pub last_input_seq: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BombSnapshot {
    pub bomb_id: Uuid,
    pub owner_id: Uuid,
    pub tile: TilePos,
    pub fuse_remaining_ms: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: Uuid,
    pub tile: TilePos,
    pub value: u32,
}

/// Safe rectangle of the closing zone, inclusive tile bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneState {
    pub min: TilePos,
    pub max: TilePos,
    /// Number of shrinks so far
    pub phase: u32,
    /// Match time of the next shrink, if any remain
    pub next_shrink_at_ms: Option<u64>,
}

/// Game events for render/audio feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    BombPlaced {
        bomb_id: Uuid,
        owner_id: Uuid,
        tile: TilePos,
    },

    /// One resolved detonation with every damaged tile
    Explosion {
        bomb_id: Uuid,
        owner_id: Uuid,
        cells: Vec<TilePos>,
    },

    BlockDestroyed {
        tile: TilePos,
        destroyed_by: Uuid,
    },

    ItemSpawned {
        item_id: Uuid,
        tile: TilePos,
        value: u32,
    },

    LootCollected {
        entity_id: Uuid,
        item_id: Uuid,
        value: u32,
    },

    /// Entity eliminated
    Eliminated {
        victim_id: Uuid,
        killer_id: Option<Uuid>,
        /// Killer's display name, "Zone" when nobody owns the kill
        killer_name: String,
        rank: u32,
        loot_dropped: u32,
        loot_secured: u32,
    },

    /// Zone closed in by one ring
    ZoneShrink {
        phase: u32,
        min: TilePos,
        max: TilePos,
    },
}

/// Per-entity results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatchStats {
    pub entity_id: Uuid,
    pub display_name: String,
    pub is_human: bool,
    pub blocks_destroyed: u32,
    pub loot_collected: u32,
    pub loot_lost: u32,
    pub loot_secured: u32,
    pub rank: Option<u32>,
    pub killer_name: Option<String>,
}

/// Terminal hand-off to the results presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub is_victory: bool,
    pub total_players: u32,
    pub duration_ms: u64,
    /// Sorted by rank, unranked entities last
    pub per_entity_stats: Vec<EntityMatchStats>,
    pub hero_stats: EntityMatchStats,
    pub ended_at: chrono::DateTime<chrono::Utc>,
}
