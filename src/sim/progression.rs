//! Wealth-driven rank ladder.
//!
//! Rank follows the highest gold value ever observed, so it never regresses.
//! Other subsystems read unlock tokens on demand through [`Progression::has_unlock`].

use log::info;
use serde::{Deserialize, Serialize};

use crate::sim::events::{EventBus, GameEvent, Severity};
use crate::sim::save::SaveSection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankProfile {
    pub index: usize,
    pub name: &'static str,
    pub gold_threshold: i64,
    pub capacity: u32,
    pub buy_modifier: f64,
    pub sell_modifier: f64,
    pub unlocks: &'static [&'static str],
}

pub const RANKS: [RankProfile; 5] = [
    RankProfile {
        index: 0,
        name: "Peddler",
        gold_threshold: 0,
        capacity: 20,
        buy_modifier: 1.0,
        sell_modifier: 1.0,
        unlocks: &["basic_trading"],
    },
    RankProfile {
        index: 1,
        name: "Trader",
        gold_threshold: 500,
        capacity: 40,
        buy_modifier: 0.98,
        sell_modifier: 1.02,
        unlocks: &["contracts"],
    },
    RankProfile {
        index: 2,
        name: "Merchant",
        gold_threshold: 2_000,
        capacity: 60,
        buy_modifier: 0.95,
        sell_modifier: 1.05,
        unlocks: &["trade_routes"],
    },
    RankProfile {
        index: 3,
        name: "Merchant Prince",
        gold_threshold: 10_000,
        capacity: 100,
        buy_modifier: 0.92,
        sell_modifier: 1.08,
        unlocks: &["extra_contracts", "expedition_fleet"],
    },
    RankProfile {
        index: 4,
        name: "Trade Magnate",
        gold_threshold: 50_000,
        capacity: 150,
        buy_modifier: 0.90,
        sell_modifier: 1.10,
        unlocks: &["trade_empire"],
    },
];

pub const UNLOCK_EXTRA_CONTRACTS: &str = "extra_contracts";
pub const UNLOCK_EXPEDITION_FLEET: &str = "expedition_fleet";
pub const UNLOCK_TRADE_EMPIRE: &str = "trade_empire";

pub const BASE_CONTRACT_LIMIT: usize = 3;
pub const EXTENDED_CONTRACT_LIMIT: usize = 5;

/// Highest rank whose threshold `gold` meets.
pub fn rank_for_gold(gold: i64) -> usize {
    RANKS
        .iter()
        .rev()
        .find(|r| gold >= r.gold_threshold)
        .map_or(0, |r| r.index)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressionSnapshot {
    #[serde(default)]
    pub rank: usize,
    #[serde(default)]
    pub highest_gold: i64,
    #[serde(default)]
    pub total_trades: u32,
    #[serde(default)]
    pub total_gold_earned: i64,
    #[serde(default)]
    pub capacity_bonus: u32,
}

pub struct Progression {
    rank: usize,
    highest_gold: i64,
    total_trades: u32,
    total_gold_earned: i64,
    capacity_bonus: u32,
    bus: EventBus,
}

impl Progression {
    pub fn new(bus: EventBus) -> Self {
        Self {
            rank: 0,
            highest_gold: 0,
            total_trades: 0,
            total_gold_earned: 0,
            capacity_bonus: 0,
            bus,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn profile(&self) -> &'static RankProfile {
        &RANKS[self.rank.min(RANKS.len() - 1)]
    }

    pub fn next_profile(&self) -> Option<&'static RankProfile> {
        RANKS.get(self.rank + 1)
    }

    pub fn highest_gold(&self) -> i64 {
        self.highest_gold
    }

    pub fn total_trades(&self) -> u32 {
        self.total_trades
    }

    pub fn total_gold_earned(&self) -> i64 {
        self.total_gold_earned
    }

    pub fn carry_capacity(&self) -> u32 {
        self.profile().capacity + self.capacity_bonus
    }

    pub fn buy_modifier(&self) -> f64 {
        self.profile().buy_modifier
    }

    pub fn sell_modifier(&self) -> f64 {
        self.profile().sell_modifier
    }

    /// Checks every rank up to and including the current one.
    pub fn has_unlock(&self, token: &str) -> bool {
        RANKS[..=self.rank.min(RANKS.len() - 1)]
            .iter()
            .any(|r| r.unlocks.contains(&token))
    }

    pub fn unlocks(&self) -> Vec<&'static str> {
        RANKS[..=self.rank.min(RANKS.len() - 1)]
            .iter()
            .flat_map(|r| r.unlocks.iter().copied())
            .collect()
    }

    pub fn max_contracts(&self) -> usize {
        if self.has_unlock(UNLOCK_EXTRA_CONTRACTS) {
            EXTENDED_CONTRACT_LIMIT
        } else {
            BASE_CONTRACT_LIMIT
        }
    }

    pub fn max_expeditions(&self) -> usize {
        if self.has_unlock(UNLOCK_TRADE_EMPIRE) {
            5
        } else if self.has_unlock(UNLOCK_EXPEDITION_FLEET) {
            3
        } else {
            1
        }
    }

    /// Fold a gold reading into the running maximum; returns the new rank on promotion.
    pub fn observe_gold(&mut self, gold: i64) -> Option<usize> {
        if gold > self.highest_gold {
            self.highest_gold = gold;
        }
        let target = rank_for_gold(self.highest_gold);
        if target <= self.rank {
            return None;
        }

        let previous = self.rank;
        self.rank = target;
        let profile = self.profile();
        info!(
            "rank up: {} -> {} (highest gold {})",
            RANKS[previous].name, profile.name, self.highest_gold
        );
        self.bus.publish(GameEvent::RankUp {
            rank: target,
            name: profile.name.to_string(),
        });
        for crossed in &RANKS[previous + 1..=target] {
            for token in crossed.unlocks {
                self.bus.publish(GameEvent::FeatureUnlocked {
                    token: token.to_string(),
                });
            }
        }
        self.bus.notify(
            "Rank Up",
            format!("You are now a {}", profile.name),
            Severity::Success,
        );
        Some(target)
    }

    pub fn handle_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::GoldChanged { gold } => {
                self.observe_gold(*gold);
            }
            GameEvent::ItemSold { price, .. } => {
                self.total_trades += 1;
                self.total_gold_earned += (*price).max(0);
            }
            GameEvent::ItemBought { .. } => self.total_trades += 1,
            GameEvent::CapacityBonus { amount } => self.capacity_bonus += amount,
            _ => {}
        }
    }
}

impl SaveSection for Progression {
    const SECTION: &'static str = "progression";
    type Snapshot = ProgressionSnapshot;

    fn snapshot(&self) -> ProgressionSnapshot {
        ProgressionSnapshot {
            rank: self.rank,
            highest_gold: self.highest_gold,
            total_trades: self.total_trades,
            total_gold_earned: self.total_gold_earned,
            capacity_bonus: self.capacity_bonus,
        }
    }

    fn restore(&mut self, snapshot: ProgressionSnapshot) {
        self.highest_gold = snapshot.highest_gold.max(0);
        // A saved rank below what the saved wealth implies is raised silently.
        self.rank = snapshot
            .rank
            .min(RANKS.len() - 1)
            .max(rank_for_gold(self.highest_gold));
        self.total_trades = snapshot.total_trades;
        self.total_gold_earned = snapshot.total_gold_earned;
        self.capacity_bonus = snapshot.capacity_bonus;
    }
}
