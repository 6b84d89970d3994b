//! Elimination, ranking, loot settlement and win/loss detection

use tracing::info;
use uuid::Uuid;

use crate::store::SharedEconomy;
use crate::ws::protocol::{EntityMatchStats, MatchSummary};

use super::entity::Entity;
use super::grid::GridWorld;
use super::loot::LootSystem;

/// Ranks up to and including this one keep their loot
pub const SECURED_RANK_CUTOFF: u32 = 3;

/// Delay between the terminal event and the summary hand-off
pub const PRESENTATION_DELAY_MS: u64 = 2000;

/// Killer name recorded when no entity owns the kill
pub const ZONE_KILLER_NAME: &str = "Zone";

/// Terminal result from the human's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
}

/// Result of one effective elimination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub victim_id: Uuid,
    pub killer_id: Option<Uuid>,
    pub killer_name: String,
    pub rank: u32,
    /// Loot dropped as a new item at the death tile
    pub dropped: Option<(Uuid, u32)>,
    /// Loot kept by a top finisher
    pub secured: u32,
}

/// Match-wide bookkeeping owned by the director
#[derive(Debug, Clone)]
pub struct MatchState {
    pub alive_count: u32,
    pub total_players: u32,
    pub stats: Vec<EntityMatchStats>,
    pub human_id: Option<Uuid>,
    pub outcome: Option<Outcome>,
}

pub struct MatchDirector {
    match_id: Uuid,
    state: MatchState,
    economy: SharedEconomy,
}

impl MatchDirector {
    pub fn new(match_id: Uuid, entities: &[Entity], economy: SharedEconomy) -> Self {
        let stats = entities
            .iter()
            .map(|e| EntityMatchStats {
                entity_id: e.id,
                display_name: e.display_name.clone(),
                is_human: e.is_human,
                blocks_destroyed: 0,
                loot_collected: 0,
                loot_lost: 0,
                loot_secured: 0,
                rank: None,
                killer_name: None,
            })
            .collect();

        Self {
            match_id,
            state: MatchState {
                alive_count: entities.iter().filter(|e| e.alive).count() as u32,
                total_players: entities.len() as u32,
                stats,
                human_id: entities.iter().find(|e| e.is_human).map(|e| e.id),
                outcome: None,
            },
            economy,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn alive_count(&self) -> u32 {
        self.state.alive_count
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.state.outcome
    }

    fn stats_mut(&mut self, entity_id: Uuid) -> Option<&mut EntityMatchStats> {
        self.state.stats.iter_mut().find(|s| s.entity_id == entity_id)
    }

    pub fn stats(&self, entity_id: Uuid) -> Option<&EntityMatchStats> {
        self.state.stats.iter().find(|s| s.entity_id == entity_id)
    }

    pub fn record_blocks_destroyed(&mut self, entity_id: Uuid, count: u32) {
        if let Some(stats) = self.stats_mut(entity_id) {
            stats.blocks_destroyed += count;
        }
    }

    pub fn record_loot_collected(&mut self, entity_id: Uuid, value: u32) {
        if let Some(stats) = self.stats_mut(entity_id) {
            stats.loot_collected += value;
        }
    }

    /// Eliminate `entity`. Ignored (returns `None`) when it is already dead
    /// or already ranked, so overlapping blast segments cannot rank or loot
    /// it twice and a declared survivor cannot be killed afterwards.
    ///
    /// The rank is the number of entities still alive afterwards plus one.
    /// Below the top three, carried loot is dropped where the entity died;
    /// within it the loot is secured, which for the human means crediting
    /// the economy.
    pub fn eliminate(
        &mut self,
        entity: &mut Entity,
        killer: Option<(Uuid, &str)>,
        loot: &mut LootSystem,
        grid: &mut GridWorld,
    ) -> Option<Elimination> {
        if !entity.alive || entity.rank.is_some() {
            return None;
        }

        entity.alive = false;
        self.state.alive_count = self.state.alive_count.saturating_sub(1);
        let rank = self.state.alive_count + 1;
        entity.rank = Some(rank);
        entity.killer_id = killer.map(|(id, _)| id);
        let killer_name = killer
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| ZONE_KILLER_NAME.to_string());

        let amount = std::mem::take(&mut entity.collected_loot);
        let mut dropped = None;
        let mut secured = 0;
        if rank > SECURED_RANK_CUTOFF {
            if amount > 0 {
                let item_id = loot.spawn(entity.tile(), amount, grid);
                dropped = Some((item_id, amount));
            }
        } else {
            secured = amount;
            if entity.is_human {
                self.economy.credit_balance(entity.id, amount as u64);
            }
        }

        if let Some(stats) = self.stats_mut(entity.id) {
            stats.rank = Some(rank);
            stats.killer_name = Some(killer_name.clone());
            stats.loot_lost += dropped.map(|(_, v)| v).unwrap_or(0);
            stats.loot_secured += secured;
        }

        info!(
            match_id = %self.match_id,
            victim = %entity.display_name,
            killer = %killer_name,
            rank,
            alive = self.state.alive_count,
            "Entity eliminated"
        );

        Some(Elimination {
            victim_id: entity.id,
            killer_id: entity.killer_id,
            killer_name,
            rank,
            dropped,
            secured,
        })
    }

    /// Rank the sole survivor and decide the human's outcome. Returns the
    /// outcome only on the call that decides it.
    pub fn evaluate_outcome(&mut self, entities: &mut [Entity]) -> Option<Outcome> {
        if self.state.alive_count <= 1 {
            if let Some(survivor) = entities.iter_mut().find(|e| e.alive) {
                if survivor.rank.is_none() {
                    survivor.rank = Some(1);
                    let id = survivor.id;
                    if let Some(stats) = self.stats_mut(id) {
                        stats.rank = Some(1);
                    }
                }
            }
        }

        if self.state.outcome.is_some() {
            return None;
        }

        let human = entities.iter_mut().find(|e| e.is_human)?;
        let outcome = if !human.alive {
            Outcome::Defeat
        } else if self.state.alive_count <= 1 {
            let amount = std::mem::take(&mut human.collected_loot);
            self.economy.credit_balance(human.id, amount as u64);
            let id = human.id;
            if let Some(stats) = self.stats_mut(id) {
                stats.loot_secured += amount;
            }
            Outcome::Victory
        } else {
            return None;
        };

        self.state.outcome = Some(outcome);
        info!(match_id = %self.match_id, outcome = ?outcome, "Match outcome decided");
        Some(outcome)
    }

    /// Structured results for the presentation layer
    pub fn summary(&self, duration_ms: u64) -> MatchSummary {
        let mut per_entity_stats = self.state.stats.clone();
        per_entity_stats.sort_by_key(|s| s.rank.unwrap_or(u32::MAX));

        let hero_stats = self
            .state
            .human_id
            .and_then(|id| self.stats(id).cloned())
            .or_else(|| per_entity_stats.first().cloned())
            .unwrap_or_else(|| EntityMatchStats {
                entity_id: Uuid::nil(),
                display_name: String::new(),
                is_human: false,
                blocks_destroyed: 0,
                loot_collected: 0,
                loot_lost: 0,
                loot_secured: 0,
                rank: None,
                killer_name: None,
            });

        MatchSummary {
            match_id: self.match_id,
            is_victory: self.state.outcome == Some(Outcome::Victory),
            total_players: self.state.total_players,
            duration_ms,
            per_entity_stats,
            hero_stats,
            ended_at: chrono::Utc::now(),
        }
    }
}
