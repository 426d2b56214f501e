//! Validation for declarative content and save-slot names.
//!
//! Quest trees and achievement lists arrive from JSON files written by content
//! authors, so they are checked once at registration instead of trusting the
//! shape at runtime.

use std::collections::HashSet;

use crate::sim::achievement::Achievement;
use crate::sim::quest::{is_terminal_stage, QuestDefinition};
use crate::sim::storage::all_slots;

/// Content validation errors with enough context to find the bad record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("quest id is empty")]
    EmptyQuestId,

    #[error("quest '{quest}' has no stages")]
    NoStages { quest: String },

    #[error("quest '{quest}' uses reserved stage id '{stage}'")]
    ReservedStageId { quest: String, stage: String },

    #[error("quest '{quest}' repeats stage id '{stage}'")]
    DuplicateStage { quest: String, stage: String },

    #[error("quest '{quest}' stage '{stage}' repeats choice id '{choice}'")]
    DuplicateChoice {
        quest: String,
        stage: String,
        choice: String,
    },

    #[error("quest '{quest}' choice '{choice}' leads to unknown stage '{target}'")]
    UnknownChoiceTarget {
        quest: String,
        choice: String,
        target: String,
    },

    #[error("achievement '{id}' is defined more than once")]
    DuplicateAchievement { id: String },

    #[error("achievement '{id}' needs a positive target")]
    NonPositiveTarget { id: String },

    #[error("'{slot}' is not a save slot")]
    UnknownSlot { slot: String },
}

/// Check a quest tree before it is registered.
///
/// Stage ids must be unique and may not shadow the `complete`/`fail`
/// pseudo-stages; every choice must lead to a real stage or a pseudo-stage.
pub fn validate_quest(quest: &QuestDefinition) -> Result<(), ContentError> {
    if quest.id.trim().is_empty() {
        return Err(ContentError::EmptyQuestId);
    }
    if quest.stages.is_empty() {
        return Err(ContentError::NoStages {
            quest: quest.id.clone(),
        });
    }

    let mut stage_ids = HashSet::new();
    for stage in &quest.stages {
        if is_terminal_stage(&stage.id) {
            return Err(ContentError::ReservedStageId {
                quest: quest.id.clone(),
                stage: stage.id.clone(),
            });
        }
        if !stage_ids.insert(stage.id.as_str()) {
            return Err(ContentError::DuplicateStage {
                quest: quest.id.clone(),
                stage: stage.id.clone(),
            });
        }
    }

    for stage in &quest.stages {
        let mut choice_ids = HashSet::new();
        for choice in &stage.choices {
            if !choice_ids.insert(choice.id.as_str()) {
                return Err(ContentError::DuplicateChoice {
                    quest: quest.id.clone(),
                    stage: stage.id.clone(),
                    choice: choice.id.clone(),
                });
            }
            if !is_terminal_stage(&choice.next_stage)
                && !stage_ids.contains(choice.next_stage.as_str())
            {
                return Err(ContentError::UnknownChoiceTarget {
                    quest: quest.id.clone(),
                    choice: choice.id.clone(),
                    target: choice.next_stage.clone(),
                });
            }
        }
    }
    Ok(())
}

pub fn validate_achievements(achievements: &[Achievement]) -> Result<(), ContentError> {
    let mut seen = HashSet::new();
    for achievement in achievements {
        if !seen.insert(achievement.id.as_str()) {
            return Err(ContentError::DuplicateAchievement {
                id: achievement.id.clone(),
            });
        }
        if achievement.target <= 0 {
            return Err(ContentError::NonPositiveTarget {
                id: achievement.id.clone(),
            });
        }
    }
    Ok(())
}

/// Only the three manual slots and the autosave slot exist.
pub fn validate_slot(slot: &str) -> Result<(), ContentError> {
    if all_slots().any(|s| s == slot) {
        Ok(())
    } else {
        Err(ContentError::UnknownSlot {
            slot: slot.to_string(),
        })
    }
}
