use thiserror::Error;

use crate::validation::ContentError;

/// Errors surfaced by the simulation core.
///
/// Invalid references and failed preconditions never mutate state; persistence
/// failures are reported to the session, which degrades them to a notification.
#[derive(Debug, Error)]
pub enum SimError {
    /// Faction id is not registered with the ledger.
    #[error("unknown faction: {0}")]
    UnknownFaction(String),

    /// Quest id was never registered.
    #[error("unknown quest: {0}")]
    UnknownQuest(String),

    /// A quest points at a stage id it does not define.
    #[error("unknown stage {stage} in quest {quest}")]
    UnknownStage { quest: String, stage: String },

    /// Contract id is neither available nor active.
    #[error("unknown contract: {0}")]
    UnknownContract(String),

    #[error("unknown trade route: {0}")]
    UnknownRoute(String),

    #[error("unknown good: {0}")]
    UnknownGood(String),

    #[error("quest is not active: {0}")]
    QuestNotActive(String),

    /// Quest is already active, or finished and not repeatable.
    #[error("quest cannot be started: {0}")]
    QuestUnavailable(String),

    /// One or more gating requirements failed; each entry is a human-readable reason.
    #[error("requirements not met: {}", .0.join("; "))]
    RequirementsNotMet(Vec<String>),

    #[error("invalid choice {choice} for quest {quest}")]
    InvalidChoice { quest: String, choice: String },

    /// The current stage offers choices and cannot advance without one.
    #[error("quest {0} is waiting on a player choice")]
    ChoiceRequired(String),

    #[error("{kind} limit reached ({active}/{limit})")]
    CapacityReached {
        kind: &'static str,
        active: usize,
        limit: usize,
    },

    #[error("insufficient goods: need {needed} {good}, holding {held}")]
    InsufficientGoods { good: String, needed: u32, held: u32 },

    #[error("expedition cargo is empty")]
    EmptyCargo,

    #[error("contract is not active: {0}")]
    ContractNotActive(String),

    /// Delivery attempted after the deadline; the hourly sweep resolves it.
    #[error("contract deadline has passed: {0}")]
    ContractExpired(String),

    #[error("trade route is locked: {0}")]
    RouteLocked(String),

    #[error("invalid save slot: {0}")]
    InvalidSlot(String),

    /// Save payload could not be parsed or failed structural validation.
    #[error("corrupt save data: {0}")]
    CorruptSave(String),

    /// Declarative content failed validation at registration time.
    #[error("invalid content: {0}")]
    InvalidContent(#[from] ContentError),

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl SimError {
    /// True for errors caused by an id that does not resolve to anything.
    pub fn is_invalid_reference(&self) -> bool {
        matches!(
            self,
            SimError::UnknownFaction(_)
                | SimError::UnknownQuest(_)
                | SimError::UnknownStage { .. }
                | SimError::UnknownContract(_)
                | SimError::UnknownRoute(_)
                | SimError::UnknownGood(_)
        )
    }

    /// True for storage and snapshot failures.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            SimError::InvalidSlot(_)
                | SimError::CorruptSave(_)
                | SimError::Sled(_)
                | SimError::Json(_)
                | SimError::Io(_)
                | SimError::Utf8(_)
        )
    }
}
