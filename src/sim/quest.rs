//! Branching multi-stage quest state machine.
//!
//! Quests are declarative data trees registered once at startup. The engine
//! tracks which quests are active, completed or failed, evaluates gating
//! requirements against [`PlayerQueries`], and moves active quests between
//! stages either on explicit player choices or when observed game events
//! satisfy a stage objective.
//!
//! Two pseudo stage ids end a quest: [`STAGE_COMPLETE`] grants the rewards,
//! [`STAGE_FAIL`] ends it without them.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::logutil::escape_log;
use crate::sim::errors::SimError;
use crate::sim::events::{EventBus, GameEvent, Severity};
use crate::sim::player::PlayerQueries;
use crate::sim::save::SaveSection;
use crate::sim::types::{CompareOp, FlagValue, GameTime};
use crate::validation::validate_quest;

pub const STAGE_COMPLETE: &str = "complete";
pub const STAGE_FAIL: &str = "fail";

/// True for the pseudo stage ids that end a quest.
pub fn is_terminal_stage(stage_id: &str) -> bool {
    stage_id == STAGE_COMPLETE || stage_id == STAGE_FAIL
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Deliver,
    Collect,
    Talk,
    Travel,
    Trade,
    Wait,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    NotStarted,
    Active,
    Completed,
    Failed,
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuestStatus::NotStarted => "not started",
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

fn one() -> u32 {
    1
}

/// A single predicate over player state or another quest's status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    Gold { op: CompareOp, value: i64 },
    Reputation { faction: String, op: CompareOp, value: i32 },
    Item {
        item: String,
        #[serde(default = "one")]
        quantity: u32,
    },
    Quest { quest: String, state: QuestStatus },
    Flag { flag: String, value: FlagValue },
}

impl Requirement {
    pub fn describe(&self) -> String {
        match self {
            Requirement::Gold { op, value } => format!("gold {} {}", op.symbol(), value),
            Requirement::Reputation { faction, op, value } => {
                format!("{} reputation {} {}", faction, op.symbol(), value)
            }
            Requirement::Item { item, quantity } => format!("hold {} x {}", quantity, item),
            Requirement::Quest { quest, state } => format!("quest {} {}", quest, state),
            Requirement::Flag { flag, value } => format!("flag {} = {}", flag, value),
        }
    }
}

/// An atomic mutation applied when a stage is left, a choice is taken or a quest completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Gold { amount: i64 },
    Reputation { faction: String, amount: i32 },
    /// Positive quantities grant, negative quantities take.
    Item { item: String, quantity: i32 },
    Flag { flag: String, value: FlagValue },
    /// Private to the running quest; dropped once the quest ends.
    QuestFlag { key: String, value: FlagValue },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub next_stage: String,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub requirement: Option<Requirement>,
}

impl Choice {
    pub fn new(id: &str, text: &str, next_stage: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            next_stage: next_stage.to_string(),
            effects: Vec::new(),
            requirement: None,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub id: String,
    pub objective: ObjectiveKind,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub description: String,
    /// Units needed before the stage auto-advances. Absent means one.
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

impl Stage {
    pub fn new(id: &str, objective: ObjectiveKind, target: &str) -> Self {
        Self {
            id: id.to_string(),
            objective,
            target: target.to_string(),
            description: String::new(),
            quantity: None,
            choices: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn required(&self) -> u32 {
        self.quantity.unwrap_or(1).max(1)
    }

    fn matches(&self, kind: ObjectiveKind, target: &str) -> bool {
        self.objective == kind && (kind == ObjectiveKind::Wait || self.target == target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub faction: Option<String>,
    /// NPC id credited when the quest completes.
    #[serde(default)]
    pub giver: String,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub rewards: Vec<Effect>,
    #[serde(default)]
    pub repeatable: bool,
    /// Hours from start after which the quest fails on the next tick.
    #[serde(default)]
    pub time_limit: Option<GameTime>,
}

impl QuestDefinition {
    pub fn new(id: &str, title: &str, giver: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            faction: None,
            giver: giver.to_string(),
            stages: Vec::new(),
            requirements: Vec::new(),
            rewards: Vec::new(),
            repeatable: false,
            time_limit: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_faction(mut self, faction: &str) -> Self {
        self.faction = Some(faction.to_string());
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_reward(mut self, reward: Effect) -> Self {
        self.rewards.push(reward);
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn with_time_limit(mut self, hours: GameTime) -> Self {
        self.time_limit = Some(hours);
        self
    }

    pub fn stage_index(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == stage_id)
    }

    /// Stage reached by falling through from `index`, or completion after the last one.
    fn next_in_sequence(&self, index: usize) -> &str {
        self.stages
            .get(index + 1)
            .map_or(STAGE_COMPLETE, |s| s.id.as_str())
    }
}

/// Runtime state of a quest in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveQuest {
    pub quest_id: String,
    pub stage_id: String,
    pub stage_index: usize,
    #[serde(default)]
    pub progress: u32,
    pub started_at: GameTime,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { stage: String },
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestSnapshot {
    #[serde(default)]
    pub active: BTreeMap<String, ActiveQuest>,
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    #[serde(default)]
    pub completion_counts: BTreeMap<String, u32>,
}

pub struct QuestEngine {
    quests: BTreeMap<String, QuestDefinition>,
    active: BTreeMap<String, ActiveQuest>,
    completed: BTreeSet<String>,
    failed: BTreeSet<String>,
    completion_counts: BTreeMap<String, u32>,
    bus: EventBus,
}

impl QuestEngine {
    pub fn new(bus: EventBus) -> Self {
        Self {
            quests: BTreeMap::new(),
            active: BTreeMap::new(),
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            completion_counts: BTreeMap::new(),
            bus,
        }
    }

    /// Validate and register a quest definition, replacing any earlier one with the same id.
    pub fn register(&mut self, quest: QuestDefinition) -> Result<(), SimError> {
        validate_quest(&quest)?;
        if self.quests.contains_key(&quest.id) {
            warn!("quest '{}' registered twice; keeping the later definition", quest.id);
        }
        debug!("registered quest {} ({} stages)", quest.id, quest.stages.len());
        self.quests.insert(quest.id.clone(), quest);
        Ok(())
    }

    pub fn definition(&self, quest_id: &str) -> Result<&QuestDefinition, SimError> {
        self.quests
            .get(quest_id)
            .ok_or_else(|| SimError::UnknownQuest(quest_id.to_string()))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &QuestDefinition> {
        self.quests.values()
    }

    pub fn active(&self, quest_id: &str) -> Option<&ActiveQuest> {
        self.active.get(quest_id)
    }

    pub fn active_quests(&self) -> impl Iterator<Item = &ActiveQuest> {
        self.active.values()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn completion_count(&self, quest_id: &str) -> u32 {
        self.completion_counts.get(quest_id).copied().unwrap_or(0)
    }

    pub fn status(&self, quest_id: &str) -> QuestStatus {
        if self.active.contains_key(quest_id) {
            QuestStatus::Active
        } else if self.completed.contains(quest_id) {
            QuestStatus::Completed
        } else if self.failed.contains(quest_id) {
            QuestStatus::Failed
        } else {
            QuestStatus::NotStarted
        }
    }

    fn requirement_failure(
        &self,
        requirement: &Requirement,
        player: &dyn PlayerQueries,
    ) -> Option<String> {
        let met = match requirement {
            Requirement::Gold { op, value } => op.holds(player.gold(), *value),
            Requirement::Reputation { faction, op, value } => match player.reputation(faction) {
                Some(current) => op.holds(i64::from(current), i64::from(*value)),
                None => {
                    warn!("requirement references unknown faction '{}'", faction);
                    return Some(format!("unknown faction {}", faction));
                }
            },
            Requirement::Item { item, quantity } => player.has_item(item, *quantity),
            Requirement::Quest { quest, state } => self.status(quest) == *state,
            // An unset flag reads as false.
            Requirement::Flag { flag, value } => {
                player.flag(flag).unwrap_or(FlagValue::Bool(false)) == *value
            }
        };
        (!met).then(|| requirement.describe())
    }

    /// Human-readable reasons the quest cannot start right now; empty when it can.
    pub fn unmet_requirements(
        &self,
        quest_id: &str,
        player: &dyn PlayerQueries,
    ) -> Result<Vec<String>, SimError> {
        let quest = self.definition(quest_id)?;
        let mut reasons = Vec::new();
        match self.status(quest_id) {
            QuestStatus::Active => reasons.push("already active".to_string()),
            QuestStatus::Completed if !quest.repeatable => {
                reasons.push("already completed".to_string())
            }
            QuestStatus::Failed if !quest.repeatable => reasons.push("already failed".to_string()),
            _ => {}
        }
        reasons.extend(
            quest
                .requirements
                .iter()
                .filter_map(|r| self.requirement_failure(r, player)),
        );
        Ok(reasons)
    }

    pub fn can_start(&self, quest_id: &str, player: &dyn PlayerQueries) -> bool {
        matches!(self.unmet_requirements(quest_id, player), Ok(reasons) if reasons.is_empty())
    }

    /// Quests that could be started right now, in id order.
    pub fn available_quests(&self, player: &dyn PlayerQueries) -> Vec<&QuestDefinition> {
        self.quests
            .values()
            .filter(|q| self.can_start(&q.id, player))
            .collect()
    }

    pub fn start(
        &mut self,
        quest_id: &str,
        player: &dyn PlayerQueries,
        now: GameTime,
    ) -> Result<(), SimError> {
        let quest = self.definition(quest_id).map_err(|err| {
            warn!("start requested for unknown quest '{}'", quest_id);
            err
        })?;
        let status = self.status(quest_id);
        if status == QuestStatus::Active
            || (!quest.repeatable && status != QuestStatus::NotStarted)
        {
            return Err(SimError::QuestUnavailable(quest_id.to_string()));
        }
        let unmet: Vec<String> = quest
            .requirements
            .iter()
            .filter_map(|r| self.requirement_failure(r, player))
            .collect();
        if !unmet.is_empty() {
            return Err(SimError::RequirementsNotMet(unmet));
        }

        let first = quest.stages.first().ok_or_else(|| SimError::UnknownStage {
            quest: quest_id.to_string(),
            stage: "<first>".to_string(),
        })?;
        let state = ActiveQuest {
            quest_id: quest_id.to_string(),
            stage_id: first.id.clone(),
            stage_index: 0,
            progress: 0,
            started_at: now,
            flags: BTreeMap::new(),
        };
        let title = quest.title.clone();
        let giver = quest.giver.clone();
        info!("quest started: {} ({})", quest_id, escape_log(&title));

        // A repeatable quest restarting after failure leaves the failed set.
        self.failed.remove(quest_id);
        self.active.insert(quest_id.to_string(), state);
        self.bus.publish(GameEvent::QuestStarted {
            quest_id: quest_id.to_string(),
            title: title.clone(),
            giver,
        });
        self.bus.notify("Quest Started", title, Severity::Info);
        Ok(())
    }

    /// Move an active quest out of its current stage.
    ///
    /// With a choice id, the choice's gate must hold and its target becomes
    /// current. Without one, the quest falls through to the next stage in
    /// sequence; stages offering choices refuse to fall through. Nothing is
    /// mutated when an error is returned.
    pub fn advance_stage(
        &mut self,
        quest_id: &str,
        choice_id: Option<&str>,
        player: &dyn PlayerQueries,
    ) -> Result<AdvanceOutcome, SimError> {
        let quest = self.definition(quest_id)?;
        let state = self
            .active
            .get(quest_id)
            .ok_or_else(|| SimError::QuestNotActive(quest_id.to_string()))?;
        let stage = quest
            .stages
            .get(state.stage_index)
            .ok_or_else(|| SimError::UnknownStage {
                quest: quest_id.to_string(),
                stage: state.stage_id.clone(),
            })?;

        let mut effects = stage.effects.clone();
        let target = match choice_id {
            Some(choice_id) => {
                let choice = stage
                    .choices
                    .iter()
                    .find(|c| c.id == choice_id)
                    .ok_or_else(|| SimError::InvalidChoice {
                        quest: quest_id.to_string(),
                        choice: choice_id.to_string(),
                    })?;
                if let Some(reason) = choice
                    .requirement
                    .as_ref()
                    .and_then(|r| self.requirement_failure(r, player))
                {
                    return Err(SimError::RequirementsNotMet(vec![reason]));
                }
                effects.extend(choice.effects.iter().cloned());
                choice.next_stage.clone()
            }
            None if !stage.choices.is_empty() => {
                return Err(SimError::ChoiceRequired(quest_id.to_string()));
            }
            None => quest.next_in_sequence(state.stage_index).to_string(),
        };
        if !is_terminal_stage(&target) && quest.stage_index(&target).is_none() {
            return Err(SimError::UnknownStage {
                quest: quest_id.to_string(),
                stage: target,
            });
        }
        let from_stage = stage.id.clone();

        if let Some(choice_id) = choice_id {
            debug!("quest {} choice {}", quest_id, choice_id);
            self.bus.publish(GameEvent::QuestChoiceMade {
                quest_id: quest_id.to_string(),
                choice_id: choice_id.to_string(),
            });
        }
        self.apply_effects(quest_id, &effects);
        self.enter_stage(quest_id, &from_stage, &target)
    }

    /// Add `amount` units toward the current stage objective and auto-advance
    /// once the required quantity is reached, unless the stage offers choices.
    pub fn update_progress(
        &mut self,
        quest_id: &str,
        amount: u32,
        player: &dyn PlayerQueries,
    ) -> Result<Option<AdvanceOutcome>, SimError> {
        let quest = self
            .quests
            .get(quest_id)
            .ok_or_else(|| SimError::UnknownQuest(quest_id.to_string()))?;
        let state = self
            .active
            .get_mut(quest_id)
            .ok_or_else(|| SimError::QuestNotActive(quest_id.to_string()))?;
        let stage = quest
            .stages
            .get(state.stage_index)
            .ok_or_else(|| SimError::UnknownStage {
                quest: quest_id.to_string(),
                stage: state.stage_id.clone(),
            })?;

        let required = stage.required();
        state.progress = state.progress.saturating_add(amount).min(required);
        debug!(
            "quest {} stage {} progress {}/{}",
            quest_id, stage.id, state.progress, required
        );
        if state.progress < required || !stage.choices.is_empty() {
            return Ok(None);
        }
        self.advance_stage(quest_id, None, player).map(Some)
    }

    /// Move an active quest straight to the failed set.
    pub fn abandon(&mut self, quest_id: &str) -> Result<(), SimError> {
        self.definition(quest_id)?;
        if !self.active.contains_key(quest_id) {
            return Err(SimError::QuestNotActive(quest_id.to_string()));
        }
        self.fail(quest_id);
        Ok(())
    }

    fn apply_effects(&mut self, quest_id: &str, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Gold { amount } => self.bus.adjust_gold(*amount, quest_id),
                Effect::Reputation { faction, amount } => {
                    self.bus.adjust_reputation(faction, *amount, quest_id)
                }
                Effect::Item { item, quantity } if *quantity > 0 => {
                    self.bus.publish(GameEvent::ItemGained {
                        item: item.clone(),
                        quantity: quantity.unsigned_abs(),
                    })
                }
                Effect::Item { item, quantity } if *quantity < 0 => {
                    self.bus.publish(GameEvent::ItemLost {
                        item: item.clone(),
                        quantity: quantity.unsigned_abs(),
                    })
                }
                Effect::Item { .. } => {}
                Effect::Flag { flag, value } => self.bus.publish(GameEvent::FlagSet {
                    flag: flag.clone(),
                    value: value.clone(),
                }),
                Effect::QuestFlag { key, value } => match self.active.get_mut(quest_id) {
                    Some(state) => {
                        state.flags.insert(key.clone(), value.clone());
                    }
                    None => debug!("quest flag {} ignored: {} not active", key, quest_id),
                },
            }
        }
    }

    fn enter_stage(
        &mut self,
        quest_id: &str,
        from_stage: &str,
        target: &str,
    ) -> Result<AdvanceOutcome, SimError> {
        match target {
            STAGE_COMPLETE => {
                self.complete(quest_id);
                return Ok(AdvanceOutcome::Completed);
            }
            STAGE_FAIL => {
                self.fail(quest_id);
                return Ok(AdvanceOutcome::Failed);
            }
            _ => {}
        }

        let index = self
            .quests
            .get(quest_id)
            .and_then(|q| q.stage_index(target))
            .ok_or_else(|| SimError::UnknownStage {
                quest: quest_id.to_string(),
                stage: target.to_string(),
            })?;
        let state = self
            .active
            .get_mut(quest_id)
            .ok_or_else(|| SimError::QuestNotActive(quest_id.to_string()))?;
        state.stage_id = target.to_string();
        state.stage_index = index;
        state.progress = 0;

        info!("quest {} advanced: {} -> {}", quest_id, from_stage, target);
        self.bus.publish(GameEvent::QuestStageAdvanced {
            quest_id: quest_id.to_string(),
            from_stage: from_stage.to_string(),
            to_stage: target.to_string(),
        });
        Ok(AdvanceOutcome::Advanced {
            stage: target.to_string(),
        })
    }

    fn complete(&mut self, quest_id: &str) {
        self.active.remove(quest_id);
        self.failed.remove(quest_id);
        self.completed.insert(quest_id.to_string());
        *self
            .completion_counts
            .entry(quest_id.to_string())
            .or_insert(0) += 1;

        let (title, giver, rewards) = match self.quests.get(quest_id) {
            Some(q) => (q.title.clone(), q.giver.clone(), q.rewards.clone()),
            None => (quest_id.to_string(), String::new(), Vec::new()),
        };
        self.apply_effects(quest_id, &rewards);

        info!("quest completed: {} ({})", quest_id, escape_log(&title));
        self.bus.publish(GameEvent::QuestCompleted {
            quest_id: quest_id.to_string(),
            giver,
        });
        self.bus.notify("Quest Complete", title, Severity::Success);
    }

    fn fail(&mut self, quest_id: &str) {
        self.active.remove(quest_id);
        self.completed.remove(quest_id);
        self.failed.insert(quest_id.to_string());

        let title = self
            .quests
            .get(quest_id)
            .map_or_else(|| quest_id.to_string(), |q| q.title.clone());
        info!("quest failed: {} ({})", quest_id, escape_log(&title));
        self.bus.publish(GameEvent::QuestFailed {
            quest_id: quest_id.to_string(),
        });
        self.bus.notify("Quest Failed", title, Severity::Warning);
    }

    /// Advance every active quest whose current stage matches the objective.
    fn progress_matching(
        &mut self,
        kind: ObjectiveKind,
        target: &str,
        amount: u32,
        player: &dyn PlayerQueries,
    ) {
        let matching: Vec<String> = self
            .active
            .values()
            .filter(|state| {
                self.quests
                    .get(&state.quest_id)
                    .and_then(|q| q.stages.get(state.stage_index))
                    .map_or(false, |stage| stage.matches(kind, target))
            })
            .map(|state| state.quest_id.clone())
            .collect();

        for quest_id in matching {
            if let Err(err) = self.update_progress(&quest_id, amount, player) {
                warn!("quest {} progress update failed: {}", quest_id, err);
            }
        }
    }

    fn expire_timed_quests(&mut self, now: GameTime) {
        let expired: Vec<String> = self
            .active
            .values()
            .filter(|state| {
                self.quests
                    .get(&state.quest_id)
                    .and_then(|q| q.time_limit)
                    .map_or(false, |limit| now >= state.started_at.saturating_add(limit))
            })
            .map(|state| state.quest_id.clone())
            .collect();
        for quest_id in expired {
            debug!("quest {} ran out of time at {}", quest_id, now);
            self.fail(&quest_id);
        }
    }

    pub fn handle_event(&mut self, event: &GameEvent, player: &dyn PlayerQueries) {
        match event {
            GameEvent::HourTick { time, .. } => {
                self.expire_timed_quests(*time);
                self.progress_matching(ObjectiveKind::Wait, "", 1, player);
            }
            GameEvent::NpcInteraction { npc_id, .. } => {
                self.progress_matching(ObjectiveKind::Talk, npc_id, 1, player)
            }
            GameEvent::ItemAcquired { item, quantity } => {
                self.progress_matching(ObjectiveKind::Collect, item, *quantity, player)
            }
            GameEvent::ItemDelivered { item, quantity, .. } => {
                self.progress_matching(ObjectiveKind::Deliver, item, *quantity, player)
            }
            GameEvent::LocationChanged { location } => {
                self.progress_matching(ObjectiveKind::Travel, location, 1, player)
            }
            GameEvent::ItemBought { good, .. } | GameEvent::ItemSold { good, .. } => {
                self.progress_matching(ObjectiveKind::Trade, good, 1, player)
            }
            _ => {}
        }
    }
}

impl SaveSection for QuestEngine {
    const SECTION: &'static str = "quests";
    type Snapshot = QuestSnapshot;

    fn snapshot(&self) -> QuestSnapshot {
        QuestSnapshot {
            active: self.active.clone(),
            completed: self.completed.clone(),
            failed: self.failed.clone(),
            completion_counts: self.completion_counts.clone(),
        }
    }

    fn restore(&mut self, snapshot: QuestSnapshot) {
        self.active = snapshot
            .active
            .into_iter()
            .filter(|(id, state)| {
                let known = self
                    .quests
                    .get(id)
                    .and_then(|q| q.stages.get(state.stage_index))
                    .map_or(false, |stage| stage.id == state.stage_id);
                if !known {
                    warn!("saved quest '{}' does not match registered content; dropped", id);
                }
                known
            })
            .collect();
        self.completed = snapshot.completed;
        self.failed = snapshot.failed;
        self.completion_counts = snapshot.completion_counts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::{drain, EventReceiver};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakePlayer {
        gold: i64,
        reputation: HashMap<String, i32>,
        items: HashMap<String, u32>,
        flags: HashMap<String, FlagValue>,
    }

    impl PlayerQueries for FakePlayer {
        fn gold(&self) -> i64 {
            self.gold
        }
        fn reputation(&self, faction: &str) -> Option<i32> {
            self.reputation.get(faction).copied()
        }
        fn item_quantity(&self, item: &str) -> u32 {
            self.items.get(item).copied().unwrap_or(0)
        }
        fn flag(&self, flag: &str) -> Option<FlagValue> {
            self.flags.get(flag).cloned()
        }
    }

    fn envoy() -> QuestDefinition {
        QuestDefinition::new("envoy", "The Governor's Envoy", "npc_governor")
            .with_requirement(Requirement::Gold {
                op: CompareOp::Gte,
                value: 50,
            })
            .with_stage(Stage::new("meet", ObjectiveKind::Talk, "npc_governor"))
            .with_stage(
                Stage::new("decide", ObjectiveKind::Talk, "npc_governor")
                    .with_choice(
                        Choice::new("accept", "Carry the letter", "deliver")
                            .with_effect(Effect::QuestFlag {
                                key: "sworn".into(),
                                value: FlagValue::Bool(true),
                            }),
                    )
                    .with_choice(Choice::new("refuse", "Decline", STAGE_FAIL))
                    .with_choice(
                        Choice::new("bribe", "Offer silver", STAGE_COMPLETE).with_requirement(
                            Requirement::Gold {
                                op: CompareOp::Gte,
                                value: 1_000,
                            },
                        ),
                    ),
            )
            .with_stage(
                Stage::new("deliver", ObjectiveKind::Deliver, "item_letter")
                    .with_effect(Effect::Flag {
                        flag: "letter_delivered".into(),
                        value: FlagValue::Bool(true),
                    }),
            )
            .with_reward(Effect::Gold { amount: 200 })
            .with_reward(Effect::Reputation {
                faction: "crown".into(),
                amount: 10,
            })
    }

    fn engine() -> (QuestEngine, EventReceiver) {
        let (bus, rx) = EventBus::channel();
        let mut engine = QuestEngine::new(bus);
        engine.register(envoy()).unwrap();
        (engine, rx)
    }

    fn rich() -> FakePlayer {
        FakePlayer {
            gold: 100,
            ..FakePlayer::default()
        }
    }

    #[test]
    fn start_checks_requirements() {
        let (mut engine, _rx) = engine();
        let poor = FakePlayer::default();
        match engine.start("envoy", &poor, 0) {
            Err(SimError::RequirementsNotMet(reasons)) => assert_eq!(reasons, vec!["gold >= 50"]),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(engine.status("envoy"), QuestStatus::NotStarted);
        engine.start("envoy", &rich(), 5).unwrap();
        assert_eq!(engine.status("envoy"), QuestStatus::Active);
        assert_eq!(engine.active("envoy").unwrap().started_at, 5);
        assert!(matches!(
            engine.start("envoy", &rich(), 6),
            Err(SimError::QuestUnavailable(_))
        ));
    }

    #[test]
    fn choice_stage_never_auto_advances() {
        let (mut engine, _rx) = engine();
        let player = rich();
        engine.start("envoy", &player, 0).unwrap();
        engine.handle_event(
            &GameEvent::NpcInteraction {
                npc_id: "npc_governor".into(),
                npc_name: "Governor".into(),
            },
            &player,
        );
        assert_eq!(engine.active("envoy").unwrap().stage_id, "decide");

        engine.update_progress("envoy", 5, &player).unwrap();
        assert_eq!(engine.active("envoy").unwrap().stage_id, "decide");
        assert!(matches!(
            engine.advance_stage("envoy", None, &player),
            Err(SimError::ChoiceRequired(_))
        ));
    }

    #[test]
    fn gated_and_unknown_choices_leave_state_untouched() {
        let (mut engine, mut rx) = engine();
        let player = rich();
        engine.start("envoy", &player, 0).unwrap();
        engine.advance_stage("envoy", None, &player).unwrap();
        drain(&mut rx);

        assert!(matches!(
            engine.advance_stage("envoy", Some("bribe"), &player),
            Err(SimError::RequirementsNotMet(_))
        ));
        assert!(matches!(
            engine.advance_stage("envoy", Some("flee"), &player),
            Err(SimError::InvalidChoice { .. })
        ));
        assert_eq!(engine.active("envoy").unwrap().stage_id, "decide");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn completing_grants_rewards_once() {
        let (mut engine, mut rx) = engine();
        let player = rich();
        engine.start("envoy", &player, 0).unwrap();
        engine.advance_stage("envoy", None, &player).unwrap();
        let outcome = engine.advance_stage("envoy", Some("accept"), &player).unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced {
                stage: "deliver".into()
            }
        );
        assert_eq!(
            engine.active("envoy").unwrap().flags.get("sworn"),
            Some(&FlagValue::Bool(true))
        );
        drain(&mut rx);

        engine.handle_event(
            &GameEvent::ItemDelivered {
                item: "item_letter".into(),
                quantity: 1,
                npc: Some("npc_governor".into()),
            },
            &player,
        );
        assert_eq!(engine.status("envoy"), QuestStatus::Completed);
        let events = drain(&mut rx);
        let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "flag_set",
                "gold_adjusted",
                "reputation_adjusted",
                "quest_completed",
                "notification"
            ]
        );
        assert!(matches!(
            engine.start("envoy", &player, 10),
            Err(SimError::QuestUnavailable(_))
        ));
    }

    #[test]
    fn refusing_fails_without_rewards() {
        let (mut engine, mut rx) = engine();
        let player = rich();
        engine.start("envoy", &player, 0).unwrap();
        engine.advance_stage("envoy", None, &player).unwrap();
        drain(&mut rx);
        let outcome = engine.advance_stage("envoy", Some("refuse"), &player).unwrap();
        assert_eq!(outcome, AdvanceOutcome::Failed);
        assert_eq!(engine.status("envoy"), QuestStatus::Failed);
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, GameEvent::GoldAdjusted { .. })));
    }

    #[test]
    fn repeatable_quests_restart() {
        let (bus, _rx) = EventBus::channel();
        let mut engine = QuestEngine::new(bus);
        engine
            .register(
                QuestDefinition::new("rounds", "Harbor Rounds", "npc_harbormaster")
                    .repeatable()
                    .with_stage(Stage::new("walk", ObjectiveKind::Travel, "harbor")),
            )
            .unwrap();
        let player = FakePlayer::default();
        for _ in 0..2 {
            engine.start("rounds", &player, 0).unwrap();
            engine.handle_event(
                &GameEvent::LocationChanged {
                    location: "harbor".into(),
                },
                &player,
            );
        }
        assert_eq!(engine.completion_count("rounds"), 2);
        assert_eq!(engine.status("rounds"), QuestStatus::Completed);
    }

    #[test]
    fn wait_stages_and_time_limits_follow_hour_ticks() {
        let (bus, _rx) = EventBus::channel();
        let mut engine = QuestEngine::new(bus);
        engine
            .register(
                QuestDefinition::new("vigil", "Night Vigil", "npc_watch")
                    .with_stage(Stage::new("wait", ObjectiveKind::Wait, "").with_quantity(3)),
            )
            .unwrap();
        engine
            .register(
                QuestDefinition::new("rush", "Rush Order", "npc_clerk")
                    .with_time_limit(2)
                    .with_stage(Stage::new("fetch", ObjectiveKind::Collect, "good_tea")),
            )
            .unwrap();
        let player = FakePlayer::default();
        engine.start("vigil", &player, 0).unwrap();
        engine.start("rush", &player, 0).unwrap();
        for time in 1..=3 {
            engine.handle_event(
                &GameEvent::HourTick {
                    time,
                    hour: time as u8,
                    day: 0,
                },
                &player,
            );
        }
        assert_eq!(engine.status("vigil"), QuestStatus::Completed);
        assert_eq!(engine.status("rush"), QuestStatus::Failed);
    }

    #[test]
    fn quest_requirements_read_other_quest_status() {
        let (mut engine, _rx) = engine();
        engine
            .register(
                QuestDefinition::new("sequel", "Sequel", "npc_governor")
                    .with_requirement(Requirement::Quest {
                        quest: "envoy".into(),
                        state: QuestStatus::Completed,
                    })
                    .with_stage(Stage::new("go", ObjectiveKind::Travel, "port")),
            )
            .unwrap();
        let player = rich();
        assert_eq!(
            engine.unmet_requirements("sequel", &player).unwrap(),
            vec!["quest envoy completed"]
        );
        let available: Vec<&str> = engine
            .available_quests(&player)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(available, vec!["envoy"]);
    }

    #[test]
    fn abandon_and_restore() {
        let (mut engine, mut rx) = engine();
        let player = rich();
        engine.start("envoy", &player, 3).unwrap();
        let snapshot = engine.snapshot();
        engine.abandon("envoy").unwrap();
        assert_eq!(engine.status("envoy"), QuestStatus::Failed);
        drain(&mut rx);

        engine.restore(snapshot);
        assert_eq!(engine.status("envoy"), QuestStatus::Active);
        assert!(drain(&mut rx).is_empty());
        assert!(matches!(
            engine.abandon("ghost"),
            Err(SimError::UnknownQuest(_))
        ));
    }
}
