//! Closing safe zone
//!
//! The safe rectangle starts as the whole arena interior and, after an
//! initial delay, loses one ring of tiles per interval until only a 3x3 core
//! remains. Anyone standing outside it is eliminated with no killer.

use crate::ws::protocol::{GameEvent, ZoneState};

use super::grid::TilePos;

/// Smallest edge the safe rectangle shrinks to
pub const ZONE_MIN_EDGE: i32 = 3;

#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub enabled: bool,
    /// Match time before the first shrink
    pub initial_delay_ms: u64,
    /// Match time between two shrinks
    pub shrink_interval_ms: u64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 90_000,
            shrink_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    config: ZoneConfig,
    state: ZoneState,
}

impl Zone {
    /// Zone covering the interior of a `width` x `height` arena
    pub fn new(config: ZoneConfig, width: i32, height: i32) -> Self {
        let next_shrink_at_ms = config.enabled.then_some(config.initial_delay_ms);
        Self {
            state: ZoneState {
                min: TilePos::new(1, 1),
                max: TilePos::new((width - 2).max(1), (height - 2).max(1)),
                phase: 0,
                next_shrink_at_ms,
            },
            config,
        }
    }

    pub fn state(&self) -> &ZoneState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn contains(&self, tile: TilePos) -> bool {
        tile.x >= self.state.min.x
            && tile.x <= self.state.max.x
            && tile.y >= self.state.min.y
            && tile.y <= self.state.max.y
    }

    /// Shrink by one ring if the deadline has passed
    pub fn update(&mut self, now_ms: u64) -> Option<GameEvent> {
        let due = self.state.next_shrink_at_ms?;
        if now_ms < due {
            return None;
        }

        let s = &mut self.state;
        let can_shrink_x = s.max.x - s.min.x + 1 > ZONE_MIN_EDGE;
        let can_shrink_y = s.max.y - s.min.y + 1 > ZONE_MIN_EDGE;
        if can_shrink_x {
            s.min.x += 1;
            s.max.x -= 1;
        }
        if can_shrink_y {
            s.min.y += 1;
            s.max.y -= 1;
        }
        s.phase += 1;

        let done = s.max.x - s.min.x + 1 <= ZONE_MIN_EDGE && s.max.y - s.min.y + 1 <= ZONE_MIN_EDGE;
        s.next_shrink_at_ms = if done {
            None
        } else {
            Some(due + self.config.shrink_interval_ms)
        };

        Some(GameEvent::ZoneShrink {
            phase: s.phase,
            min: s.min,
            max: s.max,
        })
    }
}
