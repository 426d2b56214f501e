//! Per-NPC relationship memory.
//!
//! Records are created lazily on first contact. Attitude is the personal
//! relationship with one NPC and is independent of faction reputation; it
//! mirrors the ledger's split between raw-value and level-change events.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::sim::events::{EventBus, GameEvent};
use crate::sim::save::SaveSection;
use crate::sim::types::{FlagValue, GameTime};

pub const ATTITUDE_MIN: i32 = -100;
pub const ATTITUDE_MAX: i32 = 100;

/// Repeat-interaction bonus stops at this attitude.
pub const INTERACTION_ATTITUDE_CEILING: i32 = 30;
pub const INTERACTION_BONUS: i32 = 1;
pub const FAVORABLE_TRADE_BONUS: i32 = 2;
pub const QUEST_COMPLETION_BONUS: i32 = 10;
pub const FAVORABLE_TRADE_MIN_TRADES: u32 = 3;
pub const FAVORABLE_TRADE_RATIO: f64 = 0.6;
pub const SPECIAL_DEAL_MIN_ATTITUDE: i32 = 40;
pub const SPECIAL_DEAL_MIN_TRADES: u32 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttitudeLevel {
    Hostile,
    Unfriendly,
    Neutral,
    Friendly,
    Trusted,
}

impl AttitudeLevel {
    pub fn from_value(value: i32) -> Self {
        match value {
            v if v >= 60 => Self::Trusted,
            v if v >= 20 => Self::Friendly,
            v if v >= -20 => Self::Neutral,
            v if v >= -60 => Self::Unfriendly,
            _ => Self::Hostile,
        }
    }

    /// Multiplier applied to prices the NPC charges the player.
    pub fn buy_price_modifier(self) -> f64 {
        match self {
            Self::Trusted => 0.85,
            Self::Friendly => 0.93,
            Self::Neutral => 1.0,
            Self::Unfriendly => 1.10,
            Self::Hostile => 1.25,
        }
    }

    /// Multiplier applied to prices the NPC pays the player.
    pub fn sell_price_modifier(self) -> f64 {
        match self {
            Self::Trusted => 1.10,
            Self::Friendly => 1.05,
            Self::Neutral => 1.0,
            Self::Unfriendly => 0.90,
            Self::Hostile => 0.80,
        }
    }
}

impl fmt::Display for AttitudeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hostile => "hostile",
            Self::Unfriendly => "unfriendly",
            Self::Neutral => "neutral",
            Self::Friendly => "friendly",
            Self::Trusted => "trusted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeHistory {
    /// Trades that favored the NPC.
    #[serde(default)]
    pub profitable_for_npc: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub last_trade: Option<GameTime>,
    #[serde(default)]
    pub average_value: f64,
}

impl TradeHistory {
    pub fn favorable_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.profitable_for_npc) / f64::from(self.total)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NpcMemory {
    pub npc_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub first_met: GameTime,
    #[serde(default)]
    pub last_interaction: GameTime,
    #[serde(default)]
    pub interactions: u32,
    #[serde(default)]
    pub trades: TradeHistory,
    #[serde(default)]
    pub quests: Vec<String>,
    #[serde(default)]
    pub attitude: i32,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
}

impl NpcMemory {
    fn new(npc_id: &str, name: &str, now: GameTime) -> Self {
        Self {
            npc_id: npc_id.to_string(),
            name: name.to_string(),
            first_met: now,
            last_interaction: now,
            ..Self::default()
        }
    }

    pub fn level(&self) -> AttitudeLevel {
        AttitudeLevel::from_value(self.attitude)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NpcSnapshot {
    #[serde(default)]
    pub npcs: BTreeMap<String, NpcMemory>,
}

pub struct NpcRelations {
    npcs: BTreeMap<String, NpcMemory>,
    bus: EventBus,
}

impl NpcRelations {
    pub fn new(bus: EventBus) -> Self {
        Self {
            npcs: BTreeMap::new(),
            bus,
        }
    }

    pub fn get(&self, npc_id: &str) -> Option<&NpcMemory> {
        self.npcs.get(npc_id)
    }

    pub fn known_count(&self) -> usize {
        self.npcs.len()
    }

    pub fn attitude(&self, npc_id: &str) -> i32 {
        self.npcs.get(npc_id).map_or(0, |m| m.attitude)
    }

    pub fn attitude_level(&self, npc_id: &str) -> AttitudeLevel {
        AttitudeLevel::from_value(self.attitude(npc_id))
    }

    pub fn buy_price_modifier(&self, npc_id: &str) -> f64 {
        self.attitude_level(npc_id).buy_price_modifier()
    }

    pub fn sell_price_modifier(&self, npc_id: &str) -> f64 {
        self.attitude_level(npc_id).sell_price_modifier()
    }

    pub fn will_offer_special_deal(&self, npc_id: &str) -> bool {
        self.npcs.get(npc_id).is_some_and(|m| {
            m.attitude >= SPECIAL_DEAL_MIN_ATTITUDE && m.trades.total >= SPECIAL_DEAL_MIN_TRADES
        })
    }

    pub fn flag(&self, npc_id: &str, flag: &str) -> Option<&FlagValue> {
        self.npcs.get(npc_id).and_then(|m| m.flags.get(flag))
    }

    pub fn set_flag(&mut self, npc_id: &str, flag: &str, value: FlagValue, now: GameTime) {
        self.entry(npc_id, npc_id, now)
            .flags
            .insert(flag.to_string(), value);
    }

    pub fn record_interaction(&mut self, npc_id: &str, name: &str, now: GameTime) {
        let memory = self.entry(npc_id, name, now);
        memory.interactions += 1;
        memory.last_interaction = now;
        if memory.name.is_empty() || memory.name == memory.npc_id {
            memory.name = name.to_string();
        }
        let below_ceiling = memory.attitude < INTERACTION_ATTITUDE_CEILING;
        if below_ceiling {
            self.shift_attitude(npc_id, INTERACTION_BONUS);
        }
    }

    /// Record one trade with the NPC worth `value` gold.
    pub fn record_trade(&mut self, npc_id: &str, value: i64, profitable_for_npc: bool, now: GameTime) {
        let memory = self.entry(npc_id, npc_id, now);
        let trades = &mut memory.trades;
        let previous_total = f64::from(trades.total);
        trades.total += 1;
        if profitable_for_npc {
            trades.profitable_for_npc += 1;
        }
        trades.average_value =
            (trades.average_value * previous_total + value as f64) / f64::from(trades.total);
        trades.last_trade = Some(now);
        memory.last_interaction = now;

        let favorable = trades.total >= FAVORABLE_TRADE_MIN_TRADES
            && trades.favorable_ratio() >= FAVORABLE_TRADE_RATIO;
        if favorable {
            self.shift_attitude(npc_id, FAVORABLE_TRADE_BONUS);
        }
    }

    /// Note that the NPC is involved in `quest_id`. Each quest is listed once.
    pub fn record_quest(&mut self, npc_id: &str, quest_id: &str, now: GameTime) {
        let memory = self.entry(npc_id, npc_id, now);
        if !memory.quests.iter().any(|q| q == quest_id) {
            memory.quests.push(quest_id.to_string());
        }
        memory.last_interaction = now;
    }

    pub fn record_quest_completion(&mut self, npc_id: &str, quest_id: &str, now: GameTime) {
        self.record_quest(npc_id, quest_id, now);
        self.shift_attitude(npc_id, QUEST_COMPLETION_BONUS);
    }

    /// Goods handed to the NPC. Touches the record without moving attitude.
    pub fn record_delivery(&mut self, npc_id: &str, now: GameTime) {
        self.entry(npc_id, npc_id, now).last_interaction = now;
    }

    /// Scripted attitude change (dialogue outcomes, insults, gifts).
    pub fn adjust_attitude(&mut self, npc_id: &str, delta: i32, now: GameTime) -> i32 {
        self.entry(npc_id, npc_id, now);
        self.shift_attitude(npc_id, delta)
    }

    pub fn handle_event(&mut self, event: &GameEvent, now: GameTime) {
        match event {
            GameEvent::NpcInteraction { npc_id, npc_name } => {
                self.record_interaction(npc_id, npc_name, now)
            }
            // Buying from an NPC earns them a margin; selling to them does not.
            GameEvent::ItemBought {
                price,
                npc: Some(npc),
                ..
            } => self.record_trade(npc, *price, true, now),
            GameEvent::ItemSold {
                price,
                npc: Some(npc),
                ..
            } => self.record_trade(npc, *price, false, now),
            GameEvent::QuestStarted {
                quest_id, giver, ..
            } if !giver.is_empty() => self.record_quest(giver, quest_id, now),
            GameEvent::ItemDelivered { npc: Some(npc), .. } => self.record_delivery(npc, now),
            GameEvent::QuestCompleted { quest_id, giver } if !giver.is_empty() => {
                self.record_quest_completion(giver, quest_id, now)
            }
            _ => {}
        }
    }

    fn entry(&mut self, npc_id: &str, name: &str, now: GameTime) -> &mut NpcMemory {
        if !self.npcs.contains_key(npc_id) {
            debug!("first contact with npc '{}'", npc_id);
            self.bus.publish(GameEvent::NpcMet {
                npc_id: npc_id.to_string(),
                npc_name: name.to_string(),
            });
        }
        self.npcs
            .entry(npc_id.to_string())
            .or_insert_with(|| NpcMemory::new(npc_id, name, now))
    }

    fn shift_attitude(&mut self, npc_id: &str, delta: i32) -> i32 {
        let Some(memory) = self.npcs.get_mut(npc_id) else {
            return 0;
        };
        let old = memory.attitude;
        let new = old.saturating_add(delta).clamp(ATTITUDE_MIN, ATTITUDE_MAX);
        if new == old {
            return new;
        }
        memory.attitude = new;
        self.bus.publish(GameEvent::AttitudeChanged {
            npc_id: npc_id.to_string(),
            old,
            new,
        });
        let old_level = AttitudeLevel::from_value(old);
        let new_level = AttitudeLevel::from_value(new);
        if old_level != new_level {
            info!("{} now regards the player as {}", npc_id, new_level);
            self.bus.publish(GameEvent::AttitudeLevelChanged {
                npc_id: npc_id.to_string(),
                old_level,
                new_level,
            });
        }
        new
    }
}

impl SaveSection for NpcRelations {
    const SECTION: &'static str = "npcs";
    type Snapshot = NpcSnapshot;

    fn snapshot(&self) -> NpcSnapshot {
        NpcSnapshot {
            npcs: self.npcs.clone(),
        }
    }

    fn restore(&mut self, snapshot: NpcSnapshot) {
        self.npcs = snapshot
            .npcs
            .into_iter()
            .map(|(id, mut memory)| {
                memory.attitude = memory.attitude.clamp(ATTITUDE_MIN, ATTITUDE_MAX);
                if memory.npc_id.is_empty() {
                    memory.npc_id = id.clone();
                }
                (id, memory)
            })
            .collect();
    }
}
