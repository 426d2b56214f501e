//! Faction reputation ledger.
//!
//! Reputation is an integer per faction clamped to [-100, 100]. The derived
//! [`ReputationLevel`] is a pure function of the value; level transitions are
//! published separately from raw value changes so observers can react to one
//! without the other.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::sim::errors::SimError;
use crate::sim::events::{EventBus, GameEvent};
use crate::sim::save::SaveSection;

pub const REPUTATION_MIN: i32 = -100;
pub const REPUTATION_MAX: i32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReputationLevel {
    Hostile,
    Unfriendly,
    Neutral,
    Friendly,
    Honored,
    Champion,
}

impl ReputationLevel {
    pub fn from_value(value: i32) -> Self {
        match value {
            v if v >= 80 => Self::Champion,
            v if v >= 50 => Self::Honored,
            v if v >= 10 => Self::Friendly,
            v if v >= -10 => Self::Neutral,
            v if v >= -30 => Self::Unfriendly,
            _ => Self::Hostile,
        }
    }

    /// Lowest reputation value that still maps to this level.
    pub fn min_value(self) -> i32 {
        match self {
            Self::Champion => 80,
            Self::Honored => 50,
            Self::Friendly => 10,
            Self::Neutral => -10,
            Self::Unfriendly => -30,
            Self::Hostile => REPUTATION_MIN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Hostile => "hostile",
            Self::Unfriendly => "unfriendly",
            Self::Neutral => "neutral",
            Self::Friendly => "friendly",
            Self::Honored => "honored",
            Self::Champion => "champion",
        }
    }
}

impl fmt::Display for ReputationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Faction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Faction {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Gate on standing with one faction. When both bounds are given, both must hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactionRequirement {
    pub faction: String,
    #[serde(default)]
    pub min_level: Option<ReputationLevel>,
    #[serde(default)]
    pub min_value: Option<i32>,
}

impl FactionRequirement {
    pub fn level(faction: &str, min_level: ReputationLevel) -> Self {
        Self {
            faction: faction.to_string(),
            min_level: Some(min_level),
            min_value: None,
        }
    }

    pub fn value(faction: &str, min_value: i32) -> Self {
        Self {
            faction: faction.to_string(),
            min_level: None,
            min_value: Some(min_value),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FactionSnapshot {
    #[serde(default)]
    pub reputation: BTreeMap<String, i32>,
}

pub struct FactionLedger {
    factions: Vec<Faction>,
    reputation: BTreeMap<String, i32>,
    bus: EventBus,
}

impl FactionLedger {
    pub fn new(factions: Vec<Faction>, bus: EventBus) -> Self {
        let reputation = factions.iter().map(|f| (f.id.clone(), 0)).collect();
        Self {
            factions,
            reputation,
            bus,
        }
    }

    pub fn factions(&self) -> &[Faction] {
        &self.factions
    }

    pub fn faction(&self, id: &str) -> Option<&Faction> {
        self.factions.iter().find(|f| f.id == id)
    }

    pub fn faction_ids(&self) -> Vec<String> {
        self.factions.iter().map(|f| f.id.clone()).collect()
    }

    pub fn get(&self, faction: &str) -> Result<i32, SimError> {
        self.reputation
            .get(faction)
            .copied()
            .ok_or_else(|| SimError::UnknownFaction(faction.to_string()))
    }

    pub fn level(&self, faction: &str) -> Result<ReputationLevel, SimError> {
        self.get(faction).map(ReputationLevel::from_value)
    }

    /// Apply `delta`, clamp, and publish the change. A level-change event is
    /// published only when the derived level actually moves.
    pub fn adjust(&mut self, faction: &str, delta: i32) -> Result<i32, SimError> {
        let Some(current) = self.reputation.get_mut(faction) else {
            warn!("reputation adjust for unknown faction '{}' ignored", faction);
            return Err(SimError::UnknownFaction(faction.to_string()));
        };
        let old = *current;
        let new = old.saturating_add(delta).clamp(REPUTATION_MIN, REPUTATION_MAX);
        *current = new;

        debug!("reputation {}: {} -> {} ({:+})", faction, old, new, delta);
        self.bus.publish(GameEvent::ReputationChanged {
            faction: faction.to_string(),
            old,
            new,
        });

        let old_level = ReputationLevel::from_value(old);
        let new_level = ReputationLevel::from_value(new);
        if old_level != new_level {
            info!("standing with {} is now {} (was {})", faction, new_level, old_level);
            self.bus.publish(GameEvent::ReputationLevelChanged {
                faction: faction.to_string(),
                old_level,
                new_level,
            });
        }
        Ok(new)
    }

    /// Scripted override: publishes the value change but never a level change.
    pub fn set_direct(&mut self, faction: &str, value: i32) -> Result<i32, SimError> {
        let Some(current) = self.reputation.get_mut(faction) else {
            warn!("reputation set for unknown faction '{}' ignored", faction);
            return Err(SimError::UnknownFaction(faction.to_string()));
        };
        let old = *current;
        let new = value.clamp(REPUTATION_MIN, REPUTATION_MAX);
        *current = new;
        self.bus.publish(GameEvent::ReputationChanged {
            faction: faction.to_string(),
            old,
            new,
        });
        Ok(new)
    }

    /// True only if every requirement holds. Unknown factions fail the check.
    pub fn meets_requirements(&self, requirements: &[FactionRequirement]) -> bool {
        requirements.iter().all(|req| {
            let Ok(value) = self.get(&req.faction) else {
                warn!("requirement references unknown faction '{}'", req.faction);
                return false;
            };
            let level_ok = req
                .min_level
                .map_or(true, |min| ReputationLevel::from_value(value) >= min);
            let value_ok = req.min_value.map_or(true, |min| value >= min);
            level_ok && value_ok
        })
    }

    pub fn handle_event(&mut self, event: &GameEvent) {
        if let GameEvent::ReputationAdjusted {
            faction,
            amount,
            reason,
        } = event
        {
            debug!("reputation request {} {:+} ({})", faction, amount, reason);
            // Unknown factions were already logged by `adjust`.
            let _ = self.adjust(faction, *amount);
        }
    }
}

impl SaveSection for FactionLedger {
    const SECTION: &'static str = "factions";
    type Snapshot = FactionSnapshot;

    fn snapshot(&self) -> FactionSnapshot {
        FactionSnapshot {
            reputation: self.reputation.clone(),
        }
    }

    fn restore(&mut self, snapshot: FactionSnapshot) {
        for value in self.reputation.values_mut() {
            *value = 0;
        }
        for (faction, value) in snapshot.reputation {
            match self.reputation.get_mut(&faction) {
                Some(slot) => *slot = value.clamp(REPUTATION_MIN, REPUTATION_MAX),
                None => warn!("saved reputation for unknown faction '{}' dropped", faction),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::drain;

    fn ledger() -> (FactionLedger, crate::sim::events::EventReceiver) {
        let (bus, rx) = EventBus::channel();
        let factions = vec![
            Faction::new("crown", "The Crown", ""),
            Faction::new("guild", "Merchants' Guild", ""),
        ];
        (FactionLedger::new(factions, bus), rx)
    }

    #[test]
    fn levels_follow_thresholds() {
        assert_eq!(ReputationLevel::from_value(-100), ReputationLevel::Hostile);
        assert_eq!(ReputationLevel::from_value(-31), ReputationLevel::Hostile);
        assert_eq!(ReputationLevel::from_value(-30), ReputationLevel::Unfriendly);
        assert_eq!(ReputationLevel::from_value(-10), ReputationLevel::Neutral);
        assert_eq!(ReputationLevel::from_value(9), ReputationLevel::Neutral);
        assert_eq!(ReputationLevel::from_value(10), ReputationLevel::Friendly);
        assert_eq!(ReputationLevel::from_value(50), ReputationLevel::Honored);
        assert_eq!(ReputationLevel::from_value(80), ReputationLevel::Champion);
        for level in [
            ReputationLevel::Hostile,
            ReputationLevel::Unfriendly,
            ReputationLevel::Neutral,
            ReputationLevel::Friendly,
            ReputationLevel::Honored,
            ReputationLevel::Champion,
        ] {
            assert_eq!(ReputationLevel::from_value(level.min_value()), level);
        }
    }

    #[test]
    fn adjust_clamps_to_range() {
        let (mut ledger, _rx) = ledger();
        assert_eq!(ledger.adjust("crown", 250).unwrap(), REPUTATION_MAX);
        assert_eq!(ledger.adjust("crown", -500).unwrap(), REPUTATION_MIN);
        assert_eq!(ledger.adjust("crown", i32::MIN).unwrap(), REPUTATION_MIN);
    }

    #[test]
    fn level_change_published_only_on_crossing() {
        let (mut ledger, mut rx) = ledger();
        ledger.adjust("crown", 5).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "reputation_changed");

        ledger.adjust("crown", 10).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            GameEvent::ReputationLevelChanged {
                old_level: ReputationLevel::Neutral,
                new_level: ReputationLevel::Friendly,
                ..
            }
        ));
    }

    #[test]
    fn unknown_faction_is_an_error_and_no_op() {
        let (mut ledger, mut rx) = ledger();
        let err = ledger.adjust("pirates", 10).unwrap_err();
        assert!(err.is_invalid_reference());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn set_direct_never_publishes_level_change() {
        let (mut ledger, mut rx) = ledger();
        ledger.set_direct("guild", 60).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(ledger.level("guild").unwrap(), ReputationLevel::Honored);
    }

    #[test]
    fn requirements_use_level_or_value() {
        let (mut ledger, _rx) = ledger();
        ledger.adjust("crown", 55).unwrap();
        assert!(ledger.meets_requirements(&[
            FactionRequirement::level("crown", ReputationLevel::Honored),
            FactionRequirement::value("guild", 0),
        ]));
        assert!(!ledger.meets_requirements(&[FactionRequirement::value("crown", 60)]));
        assert!(!ledger.meets_requirements(&[FactionRequirement::value("pirates", -100)]));
        assert!(ledger.meets_requirements(&[]));
    }

    #[test]
    fn restore_sets_values_silently() {
        let (mut ledger, mut rx) = ledger();
        let mut snapshot = FactionSnapshot::default();
        snapshot.reputation.insert("crown".into(), 90);
        snapshot.reputation.insert("ghosts".into(), 5);
        ledger.restore(snapshot);
        assert_eq!(ledger.get("crown").unwrap(), 90);
        assert_eq!(ledger.get("guild").unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }
}
