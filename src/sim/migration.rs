//! Save-format migration.
//!
//! Envelopes carry a format version. Older envelopes are upgraded in place on
//! the raw JSON tree before typed decoding, one version step at a time.
//! Migration only backfills fields that did not exist yet; it never rewrites
//! values that are present.
//!
//! # Version history
//!
//! - v1: initial format.
//! - v2: adds `game_time`, `progression.total_gold_earned`,
//!   `achievements.honored_factions`, and per-NPC `flags` and `first_met`.

use log::info;
use serde_json::{json, Map, Value};

use crate::sim::errors::SimError;

pub const SAVE_FORMAT_VERSION: u64 = 2;

/// Read the `version` field of a raw envelope.
pub fn envelope_version(raw: &Value) -> Result<u64, SimError> {
    raw.get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| SimError::CorruptSave("missing or non-numeric version".to_string()))
}

/// Bring a structurally valid envelope up to [`SAVE_FORMAT_VERSION`].
pub fn migrate_envelope(mut raw: Value) -> Result<Value, SimError> {
    let original = envelope_version(&raw)?;
    if original > SAVE_FORMAT_VERSION {
        return Err(SimError::CorruptSave(format!(
            "save format v{} is newer than supported v{}",
            original, SAVE_FORMAT_VERSION
        )));
    }
    if original == SAVE_FORMAT_VERSION {
        return Ok(raw);
    }

    info!(
        "migrating save envelope from v{} to v{}",
        original, SAVE_FORMAT_VERSION
    );
    if original < 2 {
        migrate_v1_to_v2(&mut raw);
    }
    // Future steps go here, each guarded by `original < N`.

    if let Some(root) = raw.as_object_mut() {
        root.insert("version".to_string(), json!(SAVE_FORMAT_VERSION));
    }
    info!("save envelope migrated to v{}", SAVE_FORMAT_VERSION);
    Ok(raw)
}

fn backfill(object: &mut Map<String, Value>, key: &str, default: Value) {
    object.entry(key.to_string()).or_insert(default);
}

fn migrate_v1_to_v2(raw: &mut Value) {
    let Some(root) = raw.as_object_mut() else {
        return;
    };
    backfill(root, "game_time", json!(0));

    if let Some(progression) = root.get_mut("progression").and_then(Value::as_object_mut) {
        backfill(progression, "total_gold_earned", json!(0));
    }
    if let Some(achievements) = root.get_mut("achievements").and_then(Value::as_object_mut) {
        backfill(achievements, "honored_factions", json!([]));
    }
    if let Some(npcs) = root
        .get_mut("npcs")
        .and_then(|n| n.get_mut("npcs"))
        .and_then(Value::as_object_mut)
    {
        for memory in npcs.values_mut().filter_map(Value::as_object_mut) {
            backfill(memory, "flags", json!({}));
            backfill(memory, "first_met", json!(0));
        }
    }
}
