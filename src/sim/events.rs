//! Typed event vocabulary and the bus subsystems publish on.
//!
//! Every subsystem receives a clone of [`EventBus`] at construction and only
//! ever publishes. The session owns the matching [`EventReceiver`], drains it
//! in FIFO order and hands each event to every subsystem in a fixed order.
//! Economic state (gold, inventory, story flags) is only ever changed through
//! the request events `GoldAdjusted`, `ItemGained`, `ItemLost` and `FlagSet`.

use log::debug;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::sim::faction::ReputationLevel;
use crate::sim::npc::AttitudeLevel;
use crate::sim::types::{FlagValue, GameTime};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    // Clock
    HourTick { time: GameTime, hour: u8, day: u64 },
    DayTick { day: u64 },

    // Player economy: requests published by the core
    GoldAdjusted { amount: i64, reason: String },
    ItemGained { item: String, quantity: u32 },
    ItemLost { item: String, quantity: u32 },
    FlagSet { flag: String, value: FlagValue },

    // Player economy: observations published by the collaborator
    GoldChanged { gold: i64 },

    // Surrounding game actions
    ItemBought { good: String, price: i64, npc: Option<String> },
    ItemSold { good: String, price: i64, npc: Option<String> },
    ItemAcquired { item: String, quantity: u32 },
    ItemDelivered { item: String, quantity: u32, npc: Option<String> },
    NpcInteraction { npc_id: String, npc_name: String },
    LocationChanged { location: String },

    // Factions
    ReputationAdjusted { faction: String, amount: i32, reason: String },
    ReputationChanged { faction: String, old: i32, new: i32 },
    ReputationLevelChanged {
        faction: String,
        old_level: ReputationLevel,
        new_level: ReputationLevel,
    },

    // NPC memory
    NpcMet { npc_id: String, npc_name: String },
    AttitudeChanged { npc_id: String, old: i32, new: i32 },
    AttitudeLevelChanged {
        npc_id: String,
        old_level: AttitudeLevel,
        new_level: AttitudeLevel,
    },

    // Quests
    QuestStarted { quest_id: String, title: String, giver: String },
    QuestStageAdvanced { quest_id: String, from_stage: String, to_stage: String },
    QuestChoiceMade { quest_id: String, choice_id: String },
    QuestCompleted { quest_id: String, giver: String },
    QuestFailed { quest_id: String },

    // Contracts
    ContractsRefreshed { available: usize },
    ContractAccepted { contract_id: String, good: String, quantity: u32, expires_at: GameTime },
    ContractProgress { contract_id: String, delivered: u32, required: u32 },
    ContractCompleted { contract_id: String, reward: i64 },
    ContractFailed { contract_id: String, penalty: i64 },
    ContractCanceled { contract_id: String },

    // Expeditions
    ExpeditionStarted {
        expedition_id: String,
        route_id: String,
        invested: i64,
        return_time: GameTime,
    },
    ExpeditionReturning { expedition_id: String, route_id: String },
    ExpeditionCompleted { expedition_id: String, route_id: String, actual_return: i64 },
    ExpeditionLost { expedition_id: String, route_id: String, invested: i64 },

    // Progression and achievements
    RankUp { rank: usize, name: String },
    FeatureUnlocked { token: String },
    AchievementUnlocked { achievement_id: String, name: String },
    CapacityBonus { amount: u32 },
    SkillBonus { skill: String, amount: u32 },

    // User-facing
    Notification { title: String, message: String, severity: Severity },

    // Persistence
    GameSaved { slot: String },
    SaveFailed { slot: String, message: String },
    GameLoaded { slot: String },
    LoadFailed { slot: String, message: String },
}

impl GameEvent {
    /// Stable snake_case name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::HourTick { .. } => "hour_tick",
            GameEvent::DayTick { .. } => "day_tick",
            GameEvent::GoldAdjusted { .. } => "gold_adjusted",
            GameEvent::ItemGained { .. } => "item_gained",
            GameEvent::ItemLost { .. } => "item_lost",
            GameEvent::FlagSet { .. } => "flag_set",
            GameEvent::GoldChanged { .. } => "gold_changed",
            GameEvent::ItemBought { .. } => "item_bought",
            GameEvent::ItemSold { .. } => "item_sold",
            GameEvent::ItemAcquired { .. } => "item_acquired",
            GameEvent::ItemDelivered { .. } => "item_delivered",
            GameEvent::NpcInteraction { .. } => "npc_interaction",
            GameEvent::LocationChanged { .. } => "location_changed",
            GameEvent::ReputationAdjusted { .. } => "reputation_adjusted",
            GameEvent::ReputationChanged { .. } => "reputation_changed",
            GameEvent::ReputationLevelChanged { .. } => "reputation_level_changed",
            GameEvent::NpcMet { .. } => "npc_met",
            GameEvent::AttitudeChanged { .. } => "attitude_changed",
            GameEvent::AttitudeLevelChanged { .. } => "attitude_level_changed",
            GameEvent::QuestStarted { .. } => "quest_started",
            GameEvent::QuestStageAdvanced { .. } => "quest_stage_advanced",
            GameEvent::QuestChoiceMade { .. } => "quest_choice_made",
            GameEvent::QuestCompleted { .. } => "quest_completed",
            GameEvent::QuestFailed { .. } => "quest_failed",
            GameEvent::ContractsRefreshed { .. } => "contracts_refreshed",
            GameEvent::ContractAccepted { .. } => "contract_accepted",
            GameEvent::ContractProgress { .. } => "contract_progress",
            GameEvent::ContractCompleted { .. } => "contract_completed",
            GameEvent::ContractFailed { .. } => "contract_failed",
            GameEvent::ContractCanceled { .. } => "contract_canceled",
            GameEvent::ExpeditionStarted { .. } => "expedition_started",
            GameEvent::ExpeditionReturning { .. } => "expedition_returning",
            GameEvent::ExpeditionCompleted { .. } => "expedition_completed",
            GameEvent::ExpeditionLost { .. } => "expedition_lost",
            GameEvent::RankUp { .. } => "rank_up",
            GameEvent::FeatureUnlocked { .. } => "feature_unlocked",
            GameEvent::AchievementUnlocked { .. } => "achievement_unlocked",
            GameEvent::CapacityBonus { .. } => "capacity_bonus",
            GameEvent::SkillBonus { .. } => "skill_bonus",
            GameEvent::Notification { .. } => "notification",
            GameEvent::GameSaved { .. } => "game_saved",
            GameEvent::SaveFailed { .. } => "save_failed",
            GameEvent::GameLoaded { .. } => "game_loaded",
            GameEvent::LoadFailed { .. } => "load_failed",
        }
    }
}

pub type EventReceiver = UnboundedReceiver<GameEvent>;

/// Publishing half of the session's event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: UnboundedSender<GameEvent>,
}

impl EventBus {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: GameEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!("event dropped, receiver closed: {}", err.0.kind());
        }
    }

    pub fn notify(&self, title: &str, message: impl Into<String>, severity: Severity) {
        self.publish(GameEvent::Notification {
            title: title.to_string(),
            message: message.into(),
            severity,
        });
    }

    pub fn adjust_gold(&self, amount: i64, reason: &str) {
        if amount != 0 {
            self.publish(GameEvent::GoldAdjusted {
                amount,
                reason: reason.to_string(),
            });
        }
    }

    pub fn adjust_reputation(&self, faction: &str, amount: i32, reason: &str) {
        if amount != 0 {
            self.publish(GameEvent::ReputationAdjusted {
                faction: faction.to_string(),
                amount,
                reason: reason.to_string(),
            });
        }
    }
}

/// Pull every queued event without blocking.
pub fn drain(rx: &mut EventReceiver) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_adjustments_are_not_published() {
        let (bus, mut rx) = EventBus::channel();
        bus.adjust_gold(0, "noop");
        bus.adjust_reputation("crown", 0, "noop");
        assert!(drain(&mut rx).is_empty());

        bus.adjust_gold(25, "sale");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "gold_adjusted");
    }

    #[test]
    fn publishing_after_receiver_drop_is_silent() {
        let (bus, rx) = EventBus::channel();
        drop(rx);
        bus.notify("Saved", "slot_1", Severity::Info);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(GameEvent::DayTick { day: 3 }).unwrap();
        assert_eq!(json["type"], "day_tick");
        assert_eq!(json["day"], 3);
    }
}
