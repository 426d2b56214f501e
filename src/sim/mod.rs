//! Simulation core: faction standing, quests, contracts, expeditions, NPC
//! memory, rank progression, achievements and the save orchestrator that
//! snapshots all of them into one envelope.
//!
//! Subsystems never call each other. They publish [`GameEvent`]s on a shared
//! [`EventBus`] and [`GameSession`] delivers each event to all of them in a
//! fixed order.

pub mod achievement;
pub mod clock;
pub mod contract;
pub mod errors;
pub mod events;
pub mod expedition;
pub mod faction;
pub mod migration;
pub mod npc;
pub mod player;
pub mod progression;
pub mod quest;
pub mod save;
pub mod seed_loader;
pub mod seeds;
pub mod session;
pub mod storage;
pub mod types;

pub use achievement::{
    Achievement, AchievementCategory, AchievementProgress, AchievementReward, AchievementTracker,
    Metric,
};
pub use clock::GameClock;
pub use contract::{ActiveContract, ContractBoard, ContractStatus, ContractTemplate, Difficulty};
pub use errors::SimError;
pub use events::{EventBus, GameEvent, Severity};
pub use expedition::{
    CargoLine, Expedition, ExpeditionBoard, ExpeditionQuote, ExpeditionStatus, TradeGood,
    TradeRoute,
};
pub use faction::{Faction, FactionLedger, FactionRequirement, ReputationLevel};
pub use migration::SAVE_FORMAT_VERSION;
pub use npc::{AttitudeLevel, NpcMemory, NpcRelations};
pub use player::{PlayerQueries, PlayerState, PlayerView, Purse};
pub use progression::{Progression, RankProfile, RANKS};
pub use quest::{
    ActiveQuest, AdvanceOutcome, Choice, Effect, ObjectiveKind, QuestDefinition, QuestEngine,
    QuestStatus, Requirement, Stage,
};
pub use save::{SaveEnvelope, SaveOrchestrator, SaveSection, SlotInfo};
pub use seed_loader::{load_achievements_from_json, load_quests_from_json};
pub use seeds::{seed_starter_achievements, seed_starter_quests, Content};
pub use session::{GameSession, SessionOptions};
pub use storage::{MemorySaveStore, SaveStore, SledSaveStore, AUTOSAVE_SLOT, SAVE_SLOTS};
pub use types::*;
