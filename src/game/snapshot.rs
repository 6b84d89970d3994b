//! Snapshot building for the render collaborator

use crate::ws::protocol::{
    BombSnapshot, EntitySnapshot, GameEvent, ItemSnapshot, ServerMsg,
};

use super::entity::Pilot;
use super::r#match::MatchSim;

/// Builds snapshots at a fixed tick interval
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message
    pub fn build(&self, sim: &MatchSim, events: Vec<GameEvent>) -> ServerMsg {
        let entities = sim
            .entities()
            .iter()
            .map(|e| EntitySnapshot {
                entity_id: e.id,
                x: e.x,
                y: e.y,
                facing: e.facing,
                moving: e.alive && e.heading().is_some(),
                alive: e.alive,
                bombs_active: e.bombs_active,
                collected_loot: e.collected_loot,
                last_input_seq: match &e.pilot {
                    Pilot::Player(pilot) => Some(pilot.last_input_seq),
                    Pilot::Bot(_) => None,
                },
            })
            .collect();

        let bombs = sim
            .bombs()
            .iter()
            .map(|b| BombSnapshot {
                bomb_id: b.id,
                owner_id: b.owner_id,
                tile: b.tile,
                fuse_remaining_ms: b.fuse_remaining_ms,
            })
            .collect();

        let items = sim
            .items()
            .iter()
            .filter(|i| !i.collected)
            .map(|i| ItemSnapshot {
                item_id: i.id,
                tile: i.tile,
                value: i.value,
            })
            .collect();

        ServerMsg::Snapshot {
            tick: sim.tick(),
            time_ms: sim.now_ms(),
            alive_count: sim.alive_count(),
            entities,
            bombs,
            items,
            zone: sim.zone_state(),
            events,
        }
    }
}
