//! Save envelope assembly, validation and slot I/O.
//!
//! Each subsystem exposes its persistent state through [`SaveSection`]. The
//! session gathers one snapshot per section into a versioned
//! [`SaveEnvelope`]; loading reverses the process: read, validate structure,
//! migrate, then hand each section back to its owner. A section that fails to
//! decode is replaced by its default instead of aborting the whole load.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sim::errors::SimError;
use crate::sim::migration::{envelope_version, migrate_envelope, SAVE_FORMAT_VERSION};
use crate::sim::storage::{all_slots, SaveStore};
use crate::sim::types::GameTime;
use crate::validation::validate_slot;

/// State a subsystem contributes to the save envelope under its own name.
pub trait SaveSection {
    const SECTION: &'static str;
    type Snapshot: Serialize + DeserializeOwned + Default;

    fn snapshot(&self) -> Self::Snapshot;

    /// Replace state from a snapshot. Must not publish gameplay events.
    fn restore(&mut self, snapshot: Self::Snapshot);
}

pub const REQUIRED_SECTIONS: [&str; 7] = [
    "factions",
    "quests",
    "contracts",
    "expeditions",
    "npcs",
    "progression",
    "achievements",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveEnvelope {
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub game_time: GameTime,
    #[serde(default)]
    pub slot: String,
    pub factions: Value,
    pub quests: Value,
    pub contracts: Value,
    pub expeditions: Value,
    pub npcs: Value,
    pub progression: Value,
    pub achievements: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Value>,
}

impl SaveEnvelope {
    /// An envelope at the current format version with every section empty.
    pub fn empty(slot: &str, game_time: GameTime) -> Self {
        let blank = || Value::Object(Default::default());
        Self {
            version: SAVE_FORMAT_VERSION,
            saved_at: Utc::now(),
            game_time,
            slot: slot.to_string(),
            factions: blank(),
            quests: blank(),
            contracts: blank(),
            expeditions: blank(),
            npcs: blank(),
            progression: blank(),
            achievements: blank(),
            player: None,
        }
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        match name {
            "factions" => Some(&self.factions),
            "quests" => Some(&self.quests),
            "contracts" => Some(&self.contracts),
            "expeditions" => Some(&self.expeditions),
            "npcs" => Some(&self.npcs),
            "progression" => Some(&self.progression),
            "achievements" => Some(&self.achievements),
            "player" => self.player.as_ref(),
            _ => None,
        }
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Value> {
        match name {
            "factions" => Some(&mut self.factions),
            "quests" => Some(&mut self.quests),
            "contracts" => Some(&mut self.contracts),
            "expeditions" => Some(&mut self.expeditions),
            "npcs" => Some(&mut self.npcs),
            "progression" => Some(&mut self.progression),
            "achievements" => Some(&mut self.achievements),
            _ => None,
        }
    }

    /// Store `owner`'s snapshot under its section name.
    pub fn capture<S: SaveSection>(&mut self, owner: &S) -> Result<(), SimError> {
        let value = serde_json::to_value(owner.snapshot())?;
        match self.section_mut(S::SECTION) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SimError::CorruptSave(format!(
                "no envelope section named {}",
                S::SECTION
            ))),
        }
    }

    /// Hand `owner` its section, falling back to defaults when it does not decode.
    pub fn restore_into<S: SaveSection>(&self, owner: &mut S) {
        let snapshot = match self.section(S::SECTION) {
            Some(value) => decode_or_default(S::SECTION, value),
            None => S::Snapshot::default(),
        };
        owner.restore(snapshot);
    }
}

/// Decode one section, logging and substituting the default on failure.
pub fn decode_or_default<T: DeserializeOwned + Default>(section: &str, value: &Value) -> T {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!("save section '{}' unreadable, using defaults: {}", section, err);
            T::default()
        }
    }
}

/// Every required section present and object-typed, plus a numeric version.
pub fn validate_structure(raw: &Value) -> Result<(), SimError> {
    let Some(root) = raw.as_object() else {
        return Err(SimError::CorruptSave("envelope is not an object".to_string()));
    };
    envelope_version(raw)?;
    for section in REQUIRED_SECTIONS {
        match root.get(section) {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(SimError::CorruptSave(format!(
                    "section {} is not an object",
                    section
                )))
            }
            None => {
                return Err(SimError::CorruptSave(format!(
                    "section {} is missing",
                    section
                )))
            }
        }
    }
    Ok(())
}

/// Read, validate, migrate and decode raw slot bytes.
pub fn parse_envelope(bytes: &[u8]) -> Result<SaveEnvelope, SimError> {
    let text = std::str::from_utf8(bytes)?;
    let raw: Value =
        serde_json::from_str(text).map_err(|err| SimError::CorruptSave(err.to_string()))?;
    validate_structure(&raw)?;
    let migrated = migrate_envelope(raw)?;
    serde_json::from_value(migrated).map_err(|err| SimError::CorruptSave(err.to_string()))
}

/// Summary of one occupied slot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlotInfo {
    pub slot: String,
    pub saved_at: DateTime<Utc>,
    pub game_time: GameTime,
    pub version: u64,
}

/// Slot-level reads and writes over a [`SaveStore`].
pub struct SaveOrchestrator {
    store: Box<dyn SaveStore>,
}

impl SaveOrchestrator {
    pub fn new(store: Box<dyn SaveStore>) -> Self {
        Self { store }
    }

    pub fn write(&self, slot: &str, envelope: &SaveEnvelope) -> Result<(), SimError> {
        validate_slot(slot).map_err(|_| SimError::InvalidSlot(slot.to_string()))?;
        let bytes = serde_json::to_vec(envelope)?;
        self.store.put(slot, &bytes)?;
        debug!("wrote {} bytes to {}", bytes.len(), slot);
        Ok(())
    }

    /// `Ok(None)` when the slot is empty.
    pub fn read(&self, slot: &str) -> Result<Option<SaveEnvelope>, SimError> {
        validate_slot(slot).map_err(|_| SimError::InvalidSlot(slot.to_string()))?;
        match self.store.get(slot)? {
            Some(bytes) => parse_envelope(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn delete(&self, slot: &str) -> Result<bool, SimError> {
        validate_slot(slot).map_err(|_| SimError::InvalidSlot(slot.to_string()))?;
        self.store.remove(slot)
    }

    /// Occupied slots in canonical order. Unreadable slots are skipped with a warning.
    pub fn list(&self) -> Result<Vec<SlotInfo>, SimError> {
        let occupied = self.store.slots()?;
        let mut infos = Vec::new();
        for slot in all_slots().filter(|s| occupied.iter().any(|o| o == s)) {
            match self.read(slot) {
                Ok(Some(envelope)) => infos.push(SlotInfo {
                    slot: slot.to_string(),
                    saved_at: envelope.saved_at,
                    game_time: envelope.game_time,
                    version: envelope.version,
                }),
                Ok(None) => {}
                Err(err) => warn!("slot {} unreadable: {}", slot, err),
            }
        }
        Ok(infos)
    }
}
