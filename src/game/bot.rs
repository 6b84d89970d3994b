//! Bot decision engine

use rand::Rng;

use super::entity::{Direction, Entity, Pilot};
use super::grid::{Cell, GridWorld};

/// Shortest pause between two decisions of the same bot
pub const BOT_DECISION_MIN_MS: u64 = 200;
/// Longest pause between two decisions of the same bot
pub const BOT_DECISION_MAX_MS: u64 = 800;
/// Decisions are suppressed this long after a bot drops a bomb
pub const BOT_BOMB_COOLDOWN_MS: u64 = 2000;

/// Per-bot steering state, filled in by [`BotDecisionEngine`]
#[derive(Debug, Clone, Default)]
pub struct BotBrain {
    pub heading: Option<Direction>,
    pending_bomb: bool,
}

impl BotBrain {
    pub(crate) fn take_bomb_request(&mut self) -> bool {
        std::mem::take(&mut self.pending_bomb)
    }
}

/// Outcome of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotDecision {
    pub heading: Option<Direction>,
    pub place_bomb: bool,
    /// Delay until this bot decides again
    pub next_in_ms: u64,
}

pub struct BotDecisionEngine;

impl BotDecisionEngine {
    /// Choose what a bot does next.
    ///
    /// With a spare bomb, the first soft block among the neighbours (scanned
    /// up, down, left, right) triggers a bomb and a flight in the opposite
    /// direction. Otherwise the bot wanders to a random open neighbour, or
    /// stands still when boxed in.
    pub fn decide<R: Rng + ?Sized>(entity: &Entity, grid: &GridWorld, rng: &mut R) -> BotDecision {
        let here = entity.tile();

        if entity.has_spare_bomb() {
            let target = Direction::ALL.into_iter().find(|dir| {
                let (dx, dy) = dir.delta();
                grid.query_cell(here.offset(dx, dy)) == Cell::Soft
            });
            if let Some(dir) = target {
                return BotDecision {
                    heading: Some(dir.opposite()),
                    place_bomb: true,
                    next_in_ms: BOT_BOMB_COOLDOWN_MS,
                };
            }
        }

        let open: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|dir| {
                let (dx, dy) = dir.delta();
                !grid.is_blocked(here.offset(dx, dy))
            })
            .collect();

        let heading = if open.is_empty() {
            None
        } else {
            Some(open[rng.gen_range(0..open.len())])
        };

        BotDecision {
            heading,
            place_bomb: false,
            next_in_ms: rng.gen_range(BOT_DECISION_MIN_MS..=BOT_DECISION_MAX_MS),
        }
    }

    /// Write a decision into the bot's brain. Returns false for non-bots.
    pub fn apply(entity: &mut Entity, decision: &BotDecision) -> bool {
        match &mut entity.pilot {
            Pilot::Bot(brain) => {
                brain.heading = decision.heading;
                brain.pending_bomb |= decision.place_bomb;
                true
            }
            Pilot::Player(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::TilePos;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn bot_at(tile: TilePos) -> Entity {
        Entity::bot(Uuid::new_v4(), "Bot_1".to_string(), tile)
    }

    #[test]
    fn test_bombs_first_soft_neighbour_and_flees() {
        let mut grid = GridWorld::empty(5, 5);
        grid.set_cell(TilePos::new(2, 3), Cell::Soft); // down
        grid.set_cell(TilePos::new(3, 2), Cell::Soft); // right
        let bot = bot_at(TilePos::new(2, 2));
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let decision = BotDecisionEngine::decide(&bot, &grid, &mut rng);

        assert!(decision.place_bomb);
        assert_eq!(decision.heading, Some(Direction::Up));
        assert_eq!(decision.next_in_ms, BOT_BOMB_COOLDOWN_MS);
    }

    #[test]
    fn test_no_spare_bomb_wanders_instead() {
        let mut grid = GridWorld::empty(5, 5);
        grid.set_cell(TilePos::new(2, 1), Cell::Soft);
        grid.set_cell(TilePos::new(2, 3), Cell::Hard);
        grid.set_cell(TilePos::new(1, 2), Cell::Bomb);
        let mut bot = bot_at(TilePos::new(2, 2));
        bot.bombs_active = bot.bomb_capacity;
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..50 {
            let decision = BotDecisionEngine::decide(&bot, &grid, &mut rng);
            assert!(!decision.place_bomb);
            assert_eq!(decision.heading, Some(Direction::Right));
            assert!((BOT_DECISION_MIN_MS..=BOT_DECISION_MAX_MS).contains(&decision.next_in_ms));
        }
    }

    #[test]
    fn test_boxed_in_bot_stands_still() {
        let mut grid = GridWorld::empty(3, 3);
        for tile in [TilePos::new(1, 0), TilePos::new(1, 2), TilePos::new(0, 1), TilePos::new(2, 1)] {
            grid.set_cell(tile, Cell::Hard);
        }
        let bot = bot_at(TilePos::new(1, 1));
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let decision = BotDecisionEngine::decide(&bot, &grid, &mut rng);
        assert_eq!(decision.heading, None);
        assert!(!decision.place_bomb);
    }

    #[test]
    fn test_wander_covers_all_open_directions() {
        let grid = GridWorld::empty(5, 5);
        let bot = bot_at(TilePos::new(2, 2));
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            if let Some(dir) = BotDecisionEngine::decide(&bot, &grid, &mut rng).heading {
                seen.insert(dir);
            }
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_apply_sets_brain() {
        let mut bot = bot_at(TilePos::new(1, 1));
        let decision = BotDecision {
            heading: Some(Direction::Left),
            place_bomb: true,
            next_in_ms: 2000,
        };

        assert!(BotDecisionEngine::apply(&mut bot, &decision));
        assert_eq!(bot.heading(), Some(Direction::Left));
        assert!(bot.take_bomb_request());
        assert!(!bot.take_bomb_request());

        let mut human = Entity::human(Uuid::new_v4(), "Hero".to_string(), TilePos::new(1, 1));
        assert!(!BotDecisionEngine::apply(&mut human, &decision));
    }
}
