//! Achievement tracking.
//!
//! The tracker is a pure observer: each event maps to zero or more metrics,
//! every locked achievement on a matching metric has its counter set or
//! incremented, and it unlocks the moment the counter reaches its target.
//! Unlocked progress is frozen and the reward is granted exactly once.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::sim::events::{EventBus, GameEvent, Severity};
use crate::sim::faction::ReputationLevel;
use crate::sim::save::SaveSection;
use crate::sim::types::GameTime;

/// Reputation reward target meaning every known faction.
pub const ALL_FACTIONS: &str = "all";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Trading,
    Exploration,
    Social,
    Progression,
    Special,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    GoldEarned,
    GoldHeld,
    TradesCompleted,
    ContractsCompleted,
    RoutesCompleted,
    NpcsMet,
    QuestsCompleted,
    FactionHonored,
    RankAchieved,
    DaysSurvived,
}

impl Metric {
    /// Level-style metrics are set to the observed value; the rest accumulate.
    pub fn is_level(self) -> bool {
        matches!(
            self,
            Metric::GoldHeld | Metric::RankAchieved | Metric::DaysSurvived | Metric::FactionHonored
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AchievementReward {
    Gold { amount: i64 },
    Capacity { amount: u32 },
    /// `faction` may be `"all"`; every faction then receives the full amount.
    Reputation { faction: String, amount: i32 },
    Skill { skill: String, amount: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: AchievementCategory,
    pub metric: Metric,
    pub target: i64,
    #[serde(default)]
    pub reward: Option<AchievementReward>,
    /// Hidden achievements are listed only once unlocked
    #[serde(default)]
    pub hidden: bool,
}

impl Achievement {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        category: AchievementCategory,
        metric: Metric,
        target: i64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category,
            metric,
            target,
            reward: None,
            hidden: false,
        }
    }

    pub fn with_reward(mut self, reward: AchievementReward) -> Self {
        self.reward = Some(reward);
        self
    }

    pub fn as_hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AchievementProgress {
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub unlocked: bool,
    /// Wall-clock time of the unlock
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unlocked_game_time: Option<GameTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AchievementSnapshot {
    #[serde(default)]
    pub progress: BTreeMap<String, AchievementProgress>,
    #[serde(default)]
    pub honored_factions: BTreeSet<String>,
}

pub struct AchievementTracker {
    definitions: Vec<Achievement>,
    progress: BTreeMap<String, AchievementProgress>,
    honored_factions: BTreeSet<String>,
    faction_ids: Vec<String>,
    bus: EventBus,
}

impl AchievementTracker {
    pub fn new(definitions: Vec<Achievement>, faction_ids: Vec<String>, bus: EventBus) -> Self {
        Self {
            definitions,
            progress: BTreeMap::new(),
            honored_factions: BTreeSet::new(),
            faction_ids,
            bus,
        }
    }

    pub fn definitions(&self) -> &[Achievement] {
        &self.definitions
    }

    pub fn progress(&self, achievement_id: &str) -> AchievementProgress {
        self.progress
            .get(achievement_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_unlocked(&self, achievement_id: &str) -> bool {
        self.progress
            .get(achievement_id)
            .map_or(false, |p| p.unlocked)
    }

    pub fn unlocked_count(&self) -> usize {
        self.progress.values().filter(|p| p.unlocked).count()
    }

    /// Achievements a player may see: every visible one plus hidden ones already earned.
    pub fn visible(&self) -> Vec<(&Achievement, AchievementProgress)> {
        self.definitions
            .iter()
            .map(|a| (a, self.progress(&a.id)))
            .filter(|(a, p)| !a.hidden || p.unlocked)
            .collect()
    }

    /// Feed one metric observation; returns ids unlocked by it.
    pub fn record(&mut self, metric: Metric, value: i64, now: GameTime) -> Vec<String> {
        let mut unlocked = Vec::new();
        for achievement in self.definitions.iter().filter(|a| a.metric == metric) {
            let progress = self.progress.entry(achievement.id.clone()).or_default();
            if progress.unlocked {
                continue;
            }
            if metric.is_level() {
                progress.current = value;
            } else {
                progress.current = progress.current.saturating_add(value);
            }
            if progress.current >= achievement.target {
                progress.unlocked = true;
                progress.unlocked_at = Some(Utc::now());
                progress.unlocked_game_time = Some(now);
                unlocked.push(achievement.id.clone());
            }
        }

        for id in &unlocked {
            self.grant(id);
        }
        unlocked
    }

    fn grant(&self, achievement_id: &str) {
        let Some(achievement) = self.definitions.iter().find(|a| a.id == achievement_id) else {
            return;
        };
        info!("achievement unlocked: {} ({})", achievement.id, achievement.name);
        let reason = format!("achievement {}", achievement.id);
        match &achievement.reward {
            Some(AchievementReward::Gold { amount }) => self.bus.adjust_gold(*amount, &reason),
            Some(AchievementReward::Capacity { amount }) => {
                self.bus.publish(GameEvent::CapacityBonus { amount: *amount })
            }
            Some(AchievementReward::Reputation { faction, amount }) if faction == ALL_FACTIONS => {
                for id in &self.faction_ids {
                    self.bus.adjust_reputation(id, *amount, &reason);
                }
            }
            Some(AchievementReward::Reputation { faction, amount }) => {
                self.bus.adjust_reputation(faction, *amount, &reason)
            }
            Some(AchievementReward::Skill { skill, amount }) => {
                self.bus.publish(GameEvent::SkillBonus {
                    skill: skill.clone(),
                    amount: *amount,
                })
            }
            None => {}
        }
        self.bus.publish(GameEvent::AchievementUnlocked {
            achievement_id: achievement.id.clone(),
            name: achievement.name.clone(),
        });
        self.bus.notify(
            "Achievement Unlocked",
            achievement.name.clone(),
            Severity::Success,
        );
    }

    pub fn handle_event(&mut self, event: &GameEvent, now: GameTime) {
        match event {
            GameEvent::GoldChanged { gold } => {
                self.record(Metric::GoldHeld, *gold, now);
            }
            GameEvent::ItemSold { price, .. } => {
                self.record(Metric::GoldEarned, (*price).max(0), now);
                self.record(Metric::TradesCompleted, 1, now);
            }
            GameEvent::ItemBought { .. } => {
                self.record(Metric::TradesCompleted, 1, now);
            }
            GameEvent::ContractCompleted { reward, .. } => {
                self.record(Metric::ContractsCompleted, 1, now);
                self.record(Metric::GoldEarned, (*reward).max(0), now);
            }
            GameEvent::ExpeditionCompleted { actual_return, .. } => {
                self.record(Metric::RoutesCompleted, 1, now);
                self.record(Metric::GoldEarned, (*actual_return).max(0), now);
            }
            GameEvent::NpcMet { .. } => {
                self.record(Metric::NpcsMet, 1, now);
            }
            GameEvent::QuestCompleted { .. } => {
                self.record(Metric::QuestsCompleted, 1, now);
            }
            GameEvent::ReputationLevelChanged {
                faction, new_level, ..
            } if *new_level >= ReputationLevel::Honored => {
                if self.honored_factions.insert(faction.clone()) {
                    debug!("{} factions now honor the player", self.honored_factions.len());
                }
                let count = self.honored_factions.len() as i64;
                self.record(Metric::FactionHonored, count, now);
            }
            GameEvent::RankUp { rank, .. } => {
                self.record(Metric::RankAchieved, *rank as i64, now);
            }
            GameEvent::DayTick { day } => {
                self.record(Metric::DaysSurvived, *day as i64, now);
            }
            _ => {}
        }
    }
}

impl SaveSection for AchievementTracker {
    const SECTION: &'static str = "achievements";
    type Snapshot = AchievementSnapshot;

    fn snapshot(&self) -> AchievementSnapshot {
        AchievementSnapshot {
            progress: self.progress.clone(),
            honored_factions: self.honored_factions.clone(),
        }
    }

    fn restore(&mut self, snapshot: AchievementSnapshot) {
        self.progress = snapshot.progress;
        self.honored_factions = snapshot.honored_factions;
    }
}
