//! Match state and authoritative tick loop

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchSettings;
use crate::store::SharedEconomy;
use crate::util::time::{tick_delta_ms, SIMULATION_TPS, SNAPSHOT_TPS, TICK_DURATION_MICROS};
use crate::ws::protocol::{
    ClientMsg, EntityInfo, GameEvent, GridInfo, MatchSummary, ServerMsg, ZoneState,
};

use super::bomb::{Bomb, BombController};
use super::bot::{BotDecisionEngine, BOT_DECISION_MAX_MS, BOT_DECISION_MIN_MS};
use super::director::{MatchDirector, Outcome, PRESENTATION_DELAY_MS};
use super::entity::{Entity, Pilot};
use super::explosion::{Blast, ExplosionResolver};
use super::grid::{GridWorld, TilePos, TILE_SIZE};
use super::loot::{Item, LootSystem, BLOCK_LOOT_VALUE};
use super::schedule::{DeadlineQueue, MatchClock};
use super::snapshot::SnapshotBuilder;
use super::zone::Zone;
use super::{MatchCommand, PlayerInput, TickInput};

/// Entities per match, the human included
pub const TOTAL_PLAYERS: usize = 16;

/// A match nobody attaches to within this window is torn down
pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(60);

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Simulation running
    InProgress,
    /// Outcome decided, waiting out the presentation delay
    Presenting,
    /// Summary handed off or match torn down
    Ended,
}

/// Deferred work, checked against the match clock once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    BotDecision(Uuid),
    Presentation,
}

/// Sixteen spawn tiles on a 4x4 lattice of odd coordinates. Odd/odd tiles
/// are never pillars.
pub fn spawn_points(width: i32, height: i32) -> Vec<TilePos> {
    fn spread(i: i32, extent: i32) -> i32 {
        let v = 1 + ((extent - 3) * i + 1) / 3;
        if v % 2 == 0 {
            (v - 1).max(1)
        } else {
            v
        }
    }

    let mut points = Vec::with_capacity(TOTAL_PLAYERS);
    for j in 0..4 {
        for i in 0..4 {
            points.push(TilePos::new(spread(i, width), spread(j, height)));
        }
    }
    // Corners first so the human always starts in one.
    points.sort_by_key(|p| {
        let corner_x = p.x == spread(0, width) || p.x == spread(3, width);
        let corner_y = p.y == spread(0, height) || p.y == spread(3, height);
        !(corner_x && corner_y)
    });
    points
}

/// Spawn tile plus its orthogonal neighbours
fn spawn_pocket(spawn: TilePos) -> [TilePos; 5] {
    [
        spawn,
        spawn.offset(1, 0),
        spawn.offset(-1, 0),
        spawn.offset(0, 1),
        spawn.offset(0, -1),
    ]
}

/// The authoritative simulation of one match, independent of any transport
pub struct MatchSim {
    id: Uuid,
    seed: u64,
    phase: MatchPhase,
    tick: u64,
    clock: MatchClock,
    rng: ChaCha8Rng,
    grid: GridWorld,
    loot: LootSystem,
    bombs: BombController,
    entities: Vec<Entity>,
    director: MatchDirector,
    zone: Zone,
    deadlines: DeadlineQueue<Deadline>,
    summary: Option<MatchSummary>,
}

impl MatchSim {
    pub fn new(
        id: Uuid,
        seed: u64,
        human_id: Uuid,
        human_name: String,
        settings: &MatchSettings,
        economy: SharedEconomy,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let spawns = spawn_points(settings.grid_width, settings.grid_height);
        let safe_zones: Vec<TilePos> = spawns.iter().flat_map(|s| spawn_pocket(*s)).collect();
        let grid = GridWorld::generate(
            settings.grid_width,
            settings.grid_height,
            settings.soft_block_target,
            &safe_zones,
            &mut rng,
        );

        let mut entities = Vec::with_capacity(TOTAL_PLAYERS);
        entities.push(Entity::human(human_id, human_name, spawns[0]));
        for (n, spawn) in spawns.iter().enumerate().skip(1) {
            entities.push(Entity::bot(Uuid::new_v4(), format!("Bot_{}", n), *spawn));
        }

        Self::from_parts(id, seed, rng, grid, entities, settings, economy)
    }

    /// Assemble a match around a prepared arena and roster
    pub fn from_parts(
        id: Uuid,
        seed: u64,
        mut rng: ChaCha8Rng,
        grid: GridWorld,
        entities: Vec<Entity>,
        settings: &MatchSettings,
        economy: SharedEconomy,
    ) -> Self {
        let director = MatchDirector::new(id, &entities, economy);
        let zone = Zone::new(settings.zone.clone(), grid.width(), grid.height());

        // Stagger first decisions so bots do not all think on the same tick.
        let mut deadlines = DeadlineQueue::new();
        for entity in entities.iter().filter(|e| matches!(e.pilot, Pilot::Bot(_))) {
            let at = rng.gen_range(BOT_DECISION_MIN_MS..=BOT_DECISION_MAX_MS);
            deadlines.schedule(at, Deadline::BotDecision(entity.id));
        }

        info!(
            match_id = %id,
            seed,
            soft_blocks = grid.count(super::grid::Cell::Soft),
            players = entities.len(),
            "Match created"
        );

        Self {
            id,
            seed,
            phase: MatchPhase::InProgress,
            tick: 0,
            clock: MatchClock::new(),
            rng,
            grid,
            loot: LootSystem::new(),
            bombs: BombController::new(),
            entities,
            director,
            zone,
            deadlines,
            summary: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn grid(&self) -> &GridWorld {
        &self.grid
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn bombs(&self) -> &[Bomb] {
        self.bombs.bombs()
    }

    pub fn items(&self) -> &[Item] {
        self.loot.items()
    }

    pub fn alive_count(&self) -> u32 {
        self.director.alive_count()
    }

    pub fn director(&self) -> &MatchDirector {
        &self.director
    }

    pub fn human(&self) -> Option<&Entity> {
        self.entities.iter().find(|e| e.is_human)
    }

    pub fn zone_state(&self) -> Option<ZoneState> {
        self.zone.is_enabled().then(|| self.zone.state().clone())
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// Freeze the clock; fuses, bot decisions and the zone all stop with it
    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn resume(&mut self) {
        self.clock.resume();
    }

    /// Arena and roster for a freshly attached client
    pub fn joined_message(&self) -> ServerMsg {
        ServerMsg::MatchJoined {
            match_id: self.id,
            seed: self.seed,
            grid: GridInfo {
                width: self.grid.width(),
                height: self.grid.height(),
                tile_size: TILE_SIZE,
                cells: self.grid.rows(),
            },
            entities: self
                .entities
                .iter()
                .map(|e| EntityInfo {
                    entity_id: e.id,
                    display_name: e.display_name.clone(),
                    is_human: e.is_human,
                })
                .collect(),
        }
    }

    /// Feed one input frame to the human. Stale sequence numbers are dropped.
    pub fn apply_human_input(&mut self, input: &TickInput) {
        let Some(human) = self.entities.iter_mut().find(|e| e.is_human && e.alive) else {
            return;
        };
        if let Pilot::Player(pilot) = &mut human.pilot {
            if input.seq > pilot.last_input_seq {
                pilot.apply(input);
            }
        }
    }

    /// Invalidate every pending deadline and disarm all bombs
    pub fn teardown(&mut self) {
        self.deadlines.invalidate();
        self.bombs.clear();
        self.phase = MatchPhase::Ended;
        debug!(match_id = %self.id, epoch = self.deadlines.epoch(), "Match torn down");
    }

    /// Hand off the summary once the presentation delay has passed
    pub fn take_summary(&mut self) -> Option<MatchSummary> {
        self.summary.take()
    }

    /// Advance the simulation by `dt_ms`. Returns the events this tick
    /// produced; nothing happens while paused or after the match ended.
    pub fn step(&mut self, dt_ms: f32) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.phase == MatchPhase::Ended || self.clock.is_paused() {
            return events;
        }

        self.clock.advance(dt_ms);
        self.tick += 1;
        let now = self.clock.now_ms();

        let mut presentation_due = false;
        for deadline in self.deadlines.drain_due(now) {
            match deadline {
                Deadline::BotDecision(id) => self.run_bot_decision(id, now, &mut events),
                Deadline::Presentation => presentation_due = true,
            }
        }

        let dt = dt_ms / 1000.0;
        for entity in &mut self.entities {
            entity.integrate(dt, &self.grid);
        }

        self.place_requested_bombs(&mut events);
        self.resolve_pickups(&mut events);

        for bomb in self.bombs.tick(dt_ms, self.deadlines.epoch()) {
            if let Some(owner) = self.entities.iter_mut().find(|e| e.id == bomb.owner_id) {
                owner.bombs_active = owner.bombs_active.saturating_sub(1);
            }
            let blast = ExplosionResolver::resolve(&bomb, &mut self.grid, &mut self.loot);
            self.apply_blast(&blast, &mut events);
        }

        if let Some(event) = self.zone.update(now) {
            events.push(event);
        }
        if self.zone.is_enabled() {
            for idx in 0..self.entities.len() {
                if self.entities[idx].alive && !self.zone.contains(self.entities[idx].tile()) {
                    self.eliminate_at(idx, None, &mut events);
                }
            }
        }

        if let Some(outcome) = self.director.evaluate_outcome(&mut self.entities) {
            self.phase = MatchPhase::Presenting;
            self.deadlines
                .schedule(now + PRESENTATION_DELAY_MS, Deadline::Presentation);
            info!(
                match_id = %self.id,
                victory = outcome == Outcome::Victory,
                "Match decided, presenting result"
            );
        }

        if presentation_due {
            self.finish();
        }

        events
    }

    /// Let a bot decide. A requested bomb goes down on the tile the bot
    /// decided on, before movement carries it away.
    fn run_bot_decision(&mut self, id: Uuid, now: u64, events: &mut Vec<GameEvent>) {
        let Some(idx) = self.entities.iter().position(|e| e.id == id) else {
            return;
        };
        if !self.entities[idx].alive {
            return;
        }

        let decision = BotDecisionEngine::decide(&self.entities[idx], &self.grid, &mut self.rng);
        BotDecisionEngine::apply(&mut self.entities[idx], &decision);
        if self.entities[idx].take_bomb_request() {
            self.place_bomb(idx, events);
        }
        self.deadlines
            .schedule(now + decision.next_in_ms, Deadline::BotDecision(id));
    }

    fn place_requested_bombs(&mut self, events: &mut Vec<GameEvent>) {
        for idx in 0..self.entities.len() {
            if self.entities[idx].take_bomb_request() {
                self.place_bomb(idx, events);
            }
        }
    }

    fn place_bomb(&mut self, idx: usize, events: &mut Vec<GameEvent>) {
        let entity = &mut self.entities[idx];
        if let Some(bomb_id) = self.bombs.place(entity, self.deadlines.epoch(), &mut self.grid) {
            events.push(GameEvent::BombPlaced {
                bomb_id,
                owner_id: entity.id,
                tile: entity.tile(),
            });
        }
    }

    fn resolve_pickups(&mut self, events: &mut Vec<GameEvent>) {
        for entity in &mut self.entities {
            if !entity.alive {
                continue;
            }
            for item_id in self.loot.overlapping(entity) {
                if let Some(value) = self.loot.collect(entity, item_id, &mut self.grid) {
                    self.director.record_loot_collected(entity.id, value);
                    events.push(GameEvent::LootCollected {
                        entity_id: entity.id,
                        item_id,
                        value,
                    });
                }
            }
        }
    }

    /// Report a detonation and eliminate everyone standing in it
    fn apply_blast(&mut self, blast: &Blast, events: &mut Vec<GameEvent>) {
        events.push(GameEvent::Explosion {
            bomb_id: blast.bomb_id,
            owner_id: blast.owner_id,
            cells: blast.damaged.clone(),
        });
        for tile in &blast.destroyed {
            events.push(GameEvent::BlockDestroyed {
                tile: *tile,
                destroyed_by: blast.owner_id,
            });
        }
        for (item_id, tile) in &blast.spawned_items {
            events.push(GameEvent::ItemSpawned {
                item_id: *item_id,
                tile: *tile,
                value: BLOCK_LOOT_VALUE,
            });
        }
        self.director
            .record_blocks_destroyed(blast.owner_id, blast.destroyed.len() as u32);

        let killer_name = self
            .entities
            .iter()
            .find(|e| e.id == blast.owner_id)
            .map(|e| e.display_name.clone())
            .unwrap_or_default();

        for tile in &blast.damaged {
            for idx in 0..self.entities.len() {
                let entity = &self.entities[idx];
                if entity.alive && entity.overlaps_tile(*tile) {
                    self.eliminate_at(idx, Some((blast.owner_id, killer_name.as_str())), events);
                }
            }
        }
    }

    fn eliminate_at(&mut self, idx: usize, killer: Option<(Uuid, &str)>, events: &mut Vec<GameEvent>) {
        let Some(elim) = self.director.eliminate(
            &mut self.entities[idx],
            killer,
            &mut self.loot,
            &mut self.grid,
        ) else {
            return;
        };

        let loot_dropped = match elim.dropped {
            Some((item_id, value)) => {
                events.push(GameEvent::ItemSpawned {
                    item_id,
                    tile: self.entities[idx].tile(),
                    value,
                });
                value
            }
            None => 0,
        };

        events.push(GameEvent::Eliminated {
            victim_id: elim.victim_id,
            killer_id: elim.killer_id,
            killer_name: elim.killer_name,
            rank: elim.rank,
            loot_dropped,
            loot_secured: elim.secured,
        });
    }

    fn finish(&mut self) {
        let summary = self.director.summary(self.clock.now_ms());
        info!(
            match_id = %self.id,
            victory = summary.is_victory,
            hero_rank = ?summary.hero_stats.rank,
            "Match summary ready"
        );
        self.summary = Some(summary);
        self.teardown();
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    /// The only user allowed to drive this match
    pub owner_id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub msg_tx: broadcast::Sender<ServerMsg>,
}

/// How long a finished match's summary stays fetchable
pub const SUMMARY_TTL: Duration = Duration::from_secs(15 * 60);
/// Upper bound on summaries held at once; the oldest go first
pub const MAX_STORED_SUMMARIES: usize = 1024;

/// A finished match's summary and who may read it
#[derive(Debug, Clone)]
pub struct StoredSummary {
    pub owner_id: Uuid,
    pub summary: MatchSummary,
    pub stored_at: Instant,
}

/// Registry of all active matches and the summaries of finished ones
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    summaries: DashMap<Uuid, StoredSummary>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            summaries: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Running match owned by `user_id`, if any
    pub fn active_for(&self, user_id: Uuid) -> Option<Uuid> {
        self.matches
            .iter()
            .find(|m| m.value().owner_id == user_id)
            .map(|m| *m.key())
    }

    /// Keep `summary` for its owner. Expired entries are dropped first, then
    /// the oldest ones while the store is over capacity.
    pub fn store_summary(&self, owner_id: Uuid, summary: MatchSummary) {
        self.store_summary_at(owner_id, summary, Instant::now());
    }

    fn store_summary_at(&self, owner_id: Uuid, summary: MatchSummary, now: Instant) {
        self.evict_summaries(now);
        while self.summaries.len() >= MAX_STORED_SUMMARIES {
            let oldest = self
                .summaries
                .iter()
                .min_by_key(|s| s.value().stored_at)
                .map(|s| *s.key());
            match oldest {
                Some(id) => {
                    self.summaries.remove(&id);
                }
                None => break,
            }
        }
        self.summaries.insert(
            summary.match_id,
            StoredSummary {
                owner_id,
                summary,
                stored_at: now,
            },
        );
    }

    /// Drop summaries older than `SUMMARY_TTL`
    fn evict_summaries(&self, now: Instant) {
        let before = self.summaries.len();
        self.summaries
            .retain(|_, s| now.saturating_duration_since(s.stored_at) < SUMMARY_TTL);
        let evicted = before.saturating_sub(self.summaries.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired match summaries");
        }
    }

    pub fn summary(&self, id: &Uuid) -> Option<StoredSummary> {
        self.summary_at(id, Instant::now())
    }

    fn summary_at(&self, id: &Uuid, now: Instant) -> Option<StoredSummary> {
        self.summaries
            .get(id)
            .map(|s| s.value().clone())
            .filter(|s| now.saturating_duration_since(s.stored_at) < SUMMARY_TTL)
    }

    pub fn stored_summaries(&self) -> usize {
        self.summaries.len()
    }

    /// Register a match and run it on its own task until it ends
    pub fn launch(self: &Arc<Self>, game_match: GameMatch, handle: MatchHandle) {
        let match_id = handle.id;
        let owner_id = handle.owner_id;
        self.insert(handle);

        let registry = self.clone();
        tokio::spawn(async move {
            let summary = game_match.run().await;

            registry.remove(&match_id);
            if let Some(summary) = summary {
                registry.store_summary(owner_id, summary);
            }

            info!(match_id = %match_id, "Match removed from registry");
        });
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A match task: the simulation plus its channels
pub struct GameMatch {
    sim: MatchSim,
    owner_id: Uuid,
    input_rx: mpsc::Receiver<PlayerInput>,
    msg_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    pending_events: Vec<GameEvent>,
    attached: bool,
    created_at: Instant,
}

impl GameMatch {
    /// Create a new match. The clock stays frozen until the owner attaches.
    pub fn new(
        id: Uuid,
        seed: u64,
        owner_id: Uuid,
        owner_name: String,
        settings: &MatchSettings,
        economy: SharedEconomy,
    ) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (msg_tx, _) = broadcast::channel(64);

        let handle = MatchHandle {
            id,
            owner_id,
            input_tx,
            msg_tx: msg_tx.clone(),
        };

        let mut sim = MatchSim::new(id, seed, owner_id, owner_name, settings, economy);
        sim.pause();

        let snapshot_interval = SIMULATION_TPS / SNAPSHOT_TPS;
        let game_match = Self {
            sim,
            owner_id,
            input_rx,
            msg_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            pending_events: Vec::new(),
            attached: false,
            created_at: Instant::now(),
        };

        (game_match, handle)
    }

    /// Run the authoritative tick loop. Returns the summary, or `None` when
    /// the match was abandoned.
    pub async fn run(mut self) -> Option<MatchSummary> {
        info!(match_id = %self.sim.id(), "Match task started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            if !self.process_inputs() {
                self.sim.teardown();
                info!(match_id = %self.sim.id(), "Match abandoned");
                return None;
            }

            if !self.attached && self.created_at.elapsed() >= ATTACH_TIMEOUT {
                self.sim.teardown();
                warn!(match_id = %self.sim.id(), "Nobody attached, tearing down match");
                return None;
            }

            let events = self.sim.step(tick_delta_ms());
            if events
                .iter()
                .any(|e| matches!(e, GameEvent::Eliminated { .. }))
            {
                self.snapshot_builder.force_next();
            }
            self.pending_events.extend(events);

            if self.snapshot_builder.should_send() && !self.sim.is_paused() {
                let events = std::mem::take(&mut self.pending_events);
                let snapshot = self.snapshot_builder.build(&self.sim, events);
                let _ = self.msg_tx.send(snapshot);
            }

            if let Some(summary) = self.sim.take_summary() {
                let _ = self.msg_tx.send(ServerMsg::MatchEnd {
                    summary: summary.clone(),
                });
                info!(match_id = %self.sim.id(), "Match ended");
                return Some(summary);
            }
        }
    }

    /// Drain queued commands. Returns false once the owner leaves.
    fn process_inputs(&mut self) -> bool {
        while let Ok(input) = self.input_rx.try_recv() {
            if input.user_id != self.owner_id {
                warn!(user_id = %input.user_id, "Command from non-owner ignored");
                continue;
            }

            match input.command {
                MatchCommand::Attach => {
                    self.attached = true;
                    let _ = self.msg_tx.send(self.sim.joined_message());
                    self.sim.resume();
                    let _ = self.msg_tx.send(ServerMsg::PauseChanged { paused: false });
                }
                MatchCommand::Client(ClientMsg::Input {
                    seq,
                    move_x,
                    move_y,
                    place_bomb,
                }) => {
                    self.sim.apply_human_input(&TickInput {
                        seq,
                        move_x: move_x.signum(),
                        move_y: move_y.signum(),
                        place_bomb,
                    });
                }
                MatchCommand::Client(ClientMsg::Pause) => {
                    self.sim.pause();
                    let _ = self.msg_tx.send(ServerMsg::PauseChanged { paused: true });
                }
                MatchCommand::Client(ClientMsg::Resume) => {
                    self.sim.resume();
                    let _ = self.msg_tx.send(ServerMsg::PauseChanged { paused: false });
                }
                MatchCommand::Client(ClientMsg::Ping { t }) => {
                    let _ = self.msg_tx.send(ServerMsg::Pong { t });
                }
                MatchCommand::Client(ClientMsg::Leave) => {
                    info!(user_id = %input.user_id, "Owner left match");
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bomb::FUSE_MS;
    use crate::game::entity::Direction;
    use crate::game::grid::{tile_center, Cell};
    use crate::game::zone::ZoneConfig;
    use crate::store::LedgerEconomy;
    use crate::ws::protocol::EntityMatchStats;
    use std::collections::HashSet;

    fn settings(zone: bool) -> MatchSettings {
        MatchSettings {
            zone: ZoneConfig {
                enabled: zone,
                initial_delay_ms: 5_000,
                shrink_interval_ms: 1_000,
            },
            ..MatchSettings::default()
        }
    }

    fn new_sim(seed: u64, zone: bool) -> (MatchSim, Arc<LedgerEconomy>) {
        let ledger = Arc::new(LedgerEconomy::new());
        let sim = MatchSim::new(
            Uuid::new_v4(),
            seed,
            Uuid::new_v4(),
            "Hero".to_string(),
            &settings(zone),
            ledger.clone(),
        );
        (sim, ledger)
    }

    /// Open 9x9 arena with a human and one bot, no bot decisions scheduled
    fn duel() -> (MatchSim, Arc<LedgerEconomy>) {
        let ledger = Arc::new(LedgerEconomy::new());
        // The rival keeps a player pilot that never gets input, so it stands still.
        let mut rival = Entity::human(Uuid::new_v4(), "Rival".to_string(), TilePos::new(7, 7));
        rival.is_human = false;
        let entities = vec![
            Entity::human(Uuid::new_v4(), "Hero".to_string(), TilePos::new(1, 1)),
            rival,
        ];
        let sim = MatchSim::from_parts(
            Uuid::new_v4(),
            1,
            ChaCha8Rng::seed_from_u64(1),
            GridWorld::empty(9, 9),
            entities,
            &settings(false),
            ledger.clone(),
        );
        (sim, ledger)
    }

    fn press_bomb(sim: &mut MatchSim, seq: u32) {
        sim.apply_human_input(&TickInput {
            seq,
            move_x: 0,
            move_y: 0,
            place_bomb: true,
        });
    }

    #[test]
    fn test_spawn_points_are_distinct_open_tiles() {
        let points = spawn_points(31, 31);
        assert_eq!(points.len(), TOTAL_PLAYERS);
        let unique: HashSet<_> = points.iter().collect();
        assert_eq!(unique.len(), TOTAL_PLAYERS);
        for p in &points {
            assert!(p.x % 2 == 1 && p.y % 2 == 1, "{:?} is not on an odd lattice", p);
            assert!(p.x >= 1 && p.x <= 29 && p.y >= 1 && p.y <= 29);
        }
        assert_eq!(points[0], TilePos::new(1, 1));
    }

    #[test]
    fn test_new_match_has_sixteen_free_spawns() {
        let (sim, _) = new_sim(9, false);
        assert_eq!(sim.entities().len(), TOTAL_PLAYERS);
        assert_eq!(sim.alive_count(), 16);
        assert_eq!(sim.entities().iter().filter(|e| e.is_human).count(), 1);
        for entity in sim.entities() {
            assert_eq!(sim.grid().query_cell(entity.tile()), Cell::Empty);
        }
    }

    #[test]
    fn test_human_bomb_detonates_after_fuse() {
        let (mut sim, _) = duel();
        press_bomb(&mut sim, 1);
        let events = sim.step(16.0);
        assert!(events.iter().any(|e| matches!(e, GameEvent::BombPlaced { .. })));
        assert_eq!(sim.bombs().len(), 1);
        assert_eq!(sim.human().map(|h| h.bombs_active), Some(1));

        // Holding the key does not place a second bomb.
        press_bomb(&mut sim, 2);
        sim.step(16.0);
        assert_eq!(sim.bombs().len(), 1);

        let mut exploded = false;
        for _ in 0..200 {
            let events = sim.step(16.0);
            if events.iter().any(|e| matches!(e, GameEvent::Explosion { .. })) {
                exploded = true;
                break;
            }
        }
        assert!(exploded);
        assert!(sim.now_ms() >= FUSE_MS as u64);
        assert!(sim.bombs().is_empty());
        assert_eq!(sim.human().map(|h| h.bombs_active), Some(0));
        // Standing on its own bomb kills the human.
        assert_eq!(sim.human().map(|h| h.alive), Some(false));
    }

    #[test]
    fn test_self_kill_is_defeat_and_summary_follows_delay() {
        let (mut sim, _) = duel();
        press_bomb(&mut sim, 1);

        let mut decided_at = None;
        for _ in 0..400 {
            sim.step(16.0);
            if decided_at.is_none() && sim.phase() == MatchPhase::Presenting {
                decided_at = Some(sim.now_ms());
            }
            if sim.phase() == MatchPhase::Ended {
                break;
            }
        }

        let decided_at = decided_at.expect("outcome never decided");
        assert_eq!(sim.phase(), MatchPhase::Ended);
        assert!(sim.now_ms() >= decided_at + PRESENTATION_DELAY_MS);
        let summary = sim.take_summary().expect("summary handed off");
        assert!(!summary.is_victory);
        assert_eq!(summary.hero_stats.rank, Some(2));
        assert_eq!(summary.hero_stats.killer_name.as_deref(), Some("Hero"));
        assert_eq!(sim.director().outcome(), Some(Outcome::Defeat));
        // Rival is the sole survivor.
        assert_eq!(sim.entities()[1].rank, Some(1));
        assert!(sim.take_summary().is_none());
    }

    #[test]
    fn test_blast_hits_bot_in_arm_and_human_wins() {
        let (mut sim, ledger) = duel();
        // Put the rival two tiles right of the human, inside range 2.
        let (x, y) = tile_center(TilePos::new(3, 1));
        sim.entities[1].x = x;
        sim.entities[1].y = y;
        sim.entities[0].collected_loot = 5;
        press_bomb(&mut sim, 1);
        sim.step(16.0);

        // Walk the human down past the end of the blast arm, then stop.
        sim.apply_human_input(&TickInput {
            seq: 2,
            move_x: 0,
            move_y: 1,
            place_bomb: false,
        });
        for _ in 0..60 {
            sim.step(16.0);
        }
        sim.apply_human_input(&TickInput {
            seq: 3,
            ..TickInput::default()
        });
        assert_eq!(sim.human().map(|h| h.tile()), Some(TilePos::new(1, 4)));

        let mut eliminated = Vec::new();
        for _ in 0..400 {
            for event in sim.step(16.0) {
                if let GameEvent::Eliminated { victim_id, rank, .. } = event {
                    eliminated.push((victim_id, rank));
                }
            }
            if sim.phase() == MatchPhase::Ended {
                break;
            }
        }

        assert_eq!(eliminated, vec![(sim.entities[1].id, 2)]);
        let summary = sim.take_summary().expect("summary");
        assert!(summary.is_victory);
        assert_eq!(summary.hero_stats.rank, Some(1));
        assert_eq!(ledger.balance(sim.entities[0].id), 5);
    }

    #[test]
    fn test_winner_survives_leftover_bomb_during_presentation() {
        let (mut sim, _) = duel();
        sim.entities[0].collected_loot = 2;
        if let Pilot::Player(pilot) = &mut sim.entities[1].pilot {
            pilot.apply(&TickInput {
                seq: 1,
                place_bomb: true,
                ..TickInput::default()
            });
        }
        sim.step(16.0);
        assert_eq!(sim.bombs().len(), 1);

        // The human drops a bomb under itself that goes off after the
        // rival's blast decided the match but before the summary is cut.
        for _ in 0..60 {
            sim.step(16.0);
        }
        press_bomb(&mut sim, 1);

        let mut eliminated = Vec::new();
        let mut explosions = 0;
        for _ in 0..400 {
            for event in sim.step(16.0) {
                match event {
                    GameEvent::Eliminated { victim_id, .. } => eliminated.push(victim_id),
                    GameEvent::Explosion { .. } => explosions += 1,
                    _ => {}
                }
            }
            if sim.phase() == MatchPhase::Ended {
                break;
            }
        }

        assert_eq!(explosions, 2);
        assert_eq!(eliminated, vec![sim.entities[1].id]);
        assert_eq!(sim.human().map(|h| (h.alive, h.rank)), Some((true, Some(1))));
        let summary = sim.take_summary().expect("summary");
        assert!(summary.is_victory);
        assert_eq!(summary.hero_stats.rank, Some(1));
        assert_eq!(summary.hero_stats.killer_name, None);
        assert_eq!(summary.hero_stats.loot_secured, 2);
    }

    #[test]
    fn test_bot_bomb_lands_on_decision_tile() {
        let ledger = Arc::new(LedgerEconomy::new());
        let mut grid = GridWorld::empty(9, 9);
        grid.set_cell(TilePos::new(1, 2), Cell::Soft);
        // Bot stands at the right edge of tile (2, 2), a step away from (3, 2).
        let mut bot = Entity::bot(Uuid::new_v4(), "Bot_1".to_string(), TilePos::new(2, 2));
        bot.x = 2.0 * TILE_SIZE + 47.0;
        let entities = vec![
            Entity::human(Uuid::new_v4(), "Hero".to_string(), TilePos::new(7, 7)),
            bot,
        ];
        let mut sim = MatchSim::from_parts(
            Uuid::new_v4(),
            4,
            ChaCha8Rng::seed_from_u64(4),
            grid,
            entities,
            &settings(false),
            ledger,
        );
        assert_eq!(sim.entities[1].tile(), TilePos::new(2, 2));

        let mut placed = None;
        for _ in 0..120 {
            for event in sim.step(16.0) {
                if let GameEvent::BombPlaced { tile, .. } = event {
                    placed = Some(tile);
                }
            }
            if placed.is_some() {
                break;
            }
        }

        assert_eq!(placed, Some(TilePos::new(2, 2)));
        assert_eq!(sim.bombs()[0].tile, TilePos::new(2, 2));
        // The bot fled right, away from the soft block.
        assert_eq!(sim.entities[1].heading(), Some(Direction::Right));
        assert!(sim.entities[1].x > 2.0 * TILE_SIZE + 47.0);
    }

    #[test]
    fn test_pause_freezes_fuses() {
        let (mut sim, _) = duel();
        press_bomb(&mut sim, 1);
        sim.step(16.0);
        let fuse = sim.bombs()[0].fuse_remaining_ms;

        sim.pause();
        for _ in 0..1000 {
            assert!(sim.step(16.0).is_empty());
        }
        assert_eq!(sim.bombs()[0].fuse_remaining_ms, fuse);
        assert_eq!(sim.now_ms(), 16);

        sim.resume();
        sim.step(16.0);
        assert!(sim.bombs()[0].fuse_remaining_ms < fuse);
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let (mut sim, _) = new_sim(3, false);
        press_bomb(&mut sim, 1);
        sim.step(16.0);
        sim.teardown();

        assert_eq!(sim.phase(), MatchPhase::Ended);
        assert!(sim.bombs().is_empty());
        let before: Vec<_> = sim.entities().iter().map(|e| (e.x, e.y, e.alive)).collect();
        for _ in 0..600 {
            assert!(sim.step(16.0).is_empty());
        }
        let after: Vec<_> = sim.entities().iter().map(|e| (e.x, e.y, e.alive)).collect();
        assert_eq!(before, after);
        assert!(sim.take_summary().is_none());
    }

    #[test]
    fn test_full_bot_match_keeps_invariants() {
        let (mut sim, _) = new_sim(77, true);
        // Keep the human parked in its pocket; bots and the zone do the rest.
        let mut last_alive = sim.alive_count();
        let mut seen_ranks = HashSet::new();

        for _ in 0..(60 * 240) {
            for event in sim.step(1000.0 / 60.0) {
                if let GameEvent::Eliminated { rank, .. } = event {
                    assert!(seen_ranks.insert(rank), "rank {} assigned twice", rank);
                }
            }
            for entity in sim.entities() {
                assert!(entity.bombs_active <= entity.bomb_capacity);
            }
            assert!(sim.alive_count() <= last_alive);
            last_alive = sim.alive_count();
            if sim.phase() == MatchPhase::Ended {
                break;
            }
        }

        assert_eq!(sim.phase(), MatchPhase::Ended);
        let summary = sim.take_summary().expect("summary");
        assert_eq!(summary.per_entity_stats.len(), 16);
        let ranks: Vec<u32> = sim.entities().iter().filter_map(|e| e.rank).collect();
        let unique: HashSet<_> = ranks.iter().collect();
        assert_eq!(unique.len(), ranks.len());
        assert!(ranks.iter().all(|r| (1..=16).contains(r)));
    }

    #[test]
    fn test_stale_input_is_dropped() {
        let (mut sim, _) = duel();
        sim.apply_human_input(&TickInput {
            seq: 5,
            move_x: 1,
            move_y: 0,
            place_bomb: false,
        });
        sim.apply_human_input(&TickInput {
            seq: 4,
            move_x: -1,
            move_y: 0,
            place_bomb: false,
        });
        assert_eq!(
            sim.human().and_then(|h| h.heading()),
            Some(Direction::Right)
        );
    }

    #[tokio::test]
    async fn test_owner_leave_abandons_match() {
        let ledger: SharedEconomy = Arc::new(LedgerEconomy::new());
        let owner = Uuid::new_v4();
        let (game_match, handle) = GameMatch::new(
            Uuid::new_v4(),
            5,
            owner,
            "Hero".to_string(),
            &settings(false),
            ledger,
        );
        let mut rx = handle.msg_tx.subscribe();

        handle
            .input_tx
            .send(PlayerInput {
                user_id: owner,
                command: MatchCommand::Attach,
            })
            .await
            .unwrap();
        handle
            .input_tx
            .send(PlayerInput {
                user_id: owner,
                command: MatchCommand::Client(ClientMsg::Leave),
            })
            .await
            .unwrap();

        assert!(game_match.run().await.is_none());
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ServerMsg::MatchJoined { .. }));
    }

    #[test]
    fn test_registry_keeps_summaries() {
        let registry = MatchRegistry::new();
        let (mut sim, _) = duel();
        press_bomb(&mut sim, 1);
        for _ in 0..400 {
            sim.step(16.0);
        }
        let summary = sim.take_summary().expect("summary");
        let id = summary.match_id;

        let owner = Uuid::new_v4();
        registry.store_summary(owner, summary);
        let stored = registry.summary(&id).expect("stored");
        assert_eq!(stored.summary.match_id, id);
        assert_eq!(stored.owner_id, owner);
        assert_eq!(registry.active_matches(), 0);
        assert_eq!(registry.active_for(Uuid::new_v4()), None);
    }

    fn blank_summary() -> MatchSummary {
        let stats = EntityMatchStats {
            entity_id: Uuid::new_v4(),
            display_name: "Hero".to_string(),
            is_human: true,
            blocks_destroyed: 0,
            loot_collected: 0,
            loot_lost: 0,
            loot_secured: 0,
            rank: Some(1),
            killer_name: None,
        };
        MatchSummary {
            match_id: Uuid::new_v4(),
            is_victory: true,
            total_players: TOTAL_PLAYERS as u32,
            duration_ms: 1_000,
            per_entity_stats: vec![stats.clone()],
            hero_stats: stats,
            ended_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_summaries_expire_after_ttl() {
        let registry = MatchRegistry::new();
        let start = Instant::now();
        let old = blank_summary();
        let old_id = old.match_id;
        registry.store_summary_at(Uuid::new_v4(), old, start);
        assert!(registry.summary_at(&old_id, start + SUMMARY_TTL / 2).is_some());
        assert!(registry.summary_at(&old_id, start + SUMMARY_TTL).is_none());

        // The next store sweeps the expired entry out.
        let fresh = blank_summary();
        let fresh_id = fresh.match_id;
        registry.store_summary_at(Uuid::new_v4(), fresh, start + SUMMARY_TTL);
        assert_eq!(registry.stored_summaries(), 1);
        assert!(registry.summary_at(&fresh_id, start + SUMMARY_TTL).is_some());
    }

    #[test]
    fn test_summary_store_is_capped() {
        let registry = MatchRegistry::new();
        let start = Instant::now();
        let mut ids = Vec::new();
        for i in 0..(MAX_STORED_SUMMARIES + 3) {
            let summary = blank_summary();
            ids.push(summary.match_id);
            registry.store_summary_at(
                Uuid::new_v4(),
                summary,
                start + Duration::from_millis(i as u64),
            );
        }
        assert_eq!(registry.stored_summaries(), MAX_STORED_SUMMARIES);
        let now = start + Duration::from_secs(1);
        for id in &ids[..3] {
            assert!(registry.summary_at(id, now).is_none());
        }
        assert!(registry.summary_at(&ids[3], now).is_some());
        assert!(registry.summary_at(&ids[ids.len() - 1], now).is_some());
    }
}
