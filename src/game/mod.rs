//! Match simulation modules

pub mod bomb;
pub mod bot;
pub mod director;
pub mod entity;
pub mod explosion;
pub mod grid;
pub mod loot;
pub mod r#match;
pub mod schedule;
pub mod snapshot;
pub mod zone;

pub use r#match::{GameMatch, MatchHandle, MatchRegistry, MatchSim};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Command routed into a match task
#[derive(Debug, Clone)]
pub enum MatchCommand {
    /// Message from the human's client
    Client(ClientMsg),
    /// A session attached and needs the current arena
    Attach,
}

/// Command tagged with its sender
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub user_id: Uuid,
    pub command: MatchCommand,
}

/// Input state for a single tick (processed from ClientMsg::Input)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    pub seq: u32,
    pub move_x: i8,
    pub move_y: i8,
    pub place_bomb: bool,
}
