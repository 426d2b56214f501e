//! Player-state collaborator boundary.
//!
//! The core never owns the player's wallet, inventory or story flags. It reads
//! them through [`PlayerQueries`] and changes them only by publishing request
//! events, which the [`PlayerState`] implementation applies in `observe`.
//! [`Purse`] is the reference implementation used by the CLI and tests.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sim::errors::SimError;
use crate::sim::events::{EventBus, GameEvent};
use crate::sim::faction::FactionLedger;
use crate::sim::types::FlagValue;

/// Read-only view of player state used to evaluate requirements.
pub trait PlayerQueries {
    fn gold(&self) -> i64;
    fn reputation(&self, faction: &str) -> Option<i32>;
    fn item_quantity(&self, item: &str) -> u32;
    fn flag(&self, flag: &str) -> Option<FlagValue>;

    fn has_item(&self, item: &str, quantity: u32) -> bool {
        self.item_quantity(item) >= quantity
    }
}

/// The collaborator owning wallet, inventory and flags.
pub trait PlayerState {
    fn gold(&self) -> i64;
    fn item_quantity(&self, item: &str) -> u32;
    fn flag(&self, flag: &str) -> Option<FlagValue>;

    /// React to a published event. Wallet changes must be followed by a
    /// `GoldChanged` publication so progression and achievements can see them.
    fn observe(&mut self, event: &GameEvent, bus: &EventBus);

    /// Optional `player` save section.
    fn snapshot(&self) -> Option<serde_json::Value> {
        None
    }

    fn restore(&mut self, _snapshot: serde_json::Value) -> Result<(), SimError> {
        Ok(())
    }
}

/// Combines the collaborator with the faction ledger for reputation queries.
pub struct PlayerView<'a> {
    player: &'a dyn PlayerState,
    factions: &'a FactionLedger,
}

impl<'a> PlayerView<'a> {
    pub fn new(player: &'a dyn PlayerState, factions: &'a FactionLedger) -> Self {
        Self { player, factions }
    }
}

impl PlayerQueries for PlayerView<'_> {
    fn gold(&self) -> i64 {
        self.player.gold()
    }

    fn reputation(&self, faction: &str) -> Option<i32> {
        self.factions.get(faction).ok()
    }

    fn item_quantity(&self, item: &str) -> u32 {
        self.player.item_quantity(item)
    }

    fn flag(&self, flag: &str) -> Option<FlagValue> {
        self.player.flag(flag)
    }
}

/// Wallet, inventory and story flags for a single player.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Purse {
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
}

impl Purse {
    pub fn new(gold: i64) -> Self {
        Self {
            gold,
            ..Self::default()
        }
    }

    pub fn with_item(mut self, item: &str, quantity: u32) -> Self {
        *self.inventory.entry(item.to_string()).or_insert(0) += quantity;
        self
    }

    fn remove_item(&mut self, item: &str, quantity: u32) {
        let Some(held) = self.inventory.get_mut(item) else {
            warn!("cannot remove {} x{}: not held", item, quantity);
            return;
        };
        if *held < quantity {
            warn!("removing {} x{} but only {} held", item, quantity, held);
        }
        *held = held.saturating_sub(quantity);
        if *held == 0 {
            self.inventory.remove(item);
        }
    }
}

impl PlayerState for Purse {
    fn gold(&self) -> i64 {
        self.gold
    }

    fn item_quantity(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    fn flag(&self, flag: &str) -> Option<FlagValue> {
        self.flags.get(flag).cloned()
    }

    fn observe(&mut self, event: &GameEvent, bus: &EventBus) {
        match event {
            GameEvent::GoldAdjusted { amount, reason } => {
                let before = self.gold;
                // The wallet never goes negative; penalties larger than the purse empty it.
                self.gold = self.gold.saturating_add(*amount).max(0);
                debug!("gold {} -> {} ({})", before, self.gold, reason);
                bus.publish(GameEvent::GoldChanged { gold: self.gold });
            }
            GameEvent::ItemGained { item, quantity } => {
                *self.inventory.entry(item.clone()).or_insert(0) += quantity;
            }
            GameEvent::ItemLost { item, quantity } => self.remove_item(item, *quantity),
            GameEvent::FlagSet { flag, value } => {
                self.flags.insert(flag.clone(), value.clone());
            }
            _ => {}
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }

    fn restore(&mut self, snapshot: serde_json::Value) -> Result<(), SimError> {
        *self = serde_json::from_value(snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::drain;

    #[test]
    fn gold_adjustments_republish_total() {
        let (bus, mut rx) = EventBus::channel();
        let mut purse = Purse::new(100);
        purse.observe(
            &GameEvent::GoldAdjusted {
                amount: -250,
                reason: "penalty".into(),
            },
            &bus,
        );
        assert_eq!(purse.gold(), 0);
        assert_eq!(drain(&mut rx), vec![GameEvent::GoldChanged { gold: 0 }]);
    }

    #[test]
    fn items_and_flags_follow_events() {
        let (bus, _rx) = EventBus::channel();
        let mut purse = Purse::new(0).with_item("good_pepper", 4);
        purse.observe(
            &GameEvent::ItemLost {
                item: "good_pepper".into(),
                quantity: 4,
            },
            &bus,
        );
        purse.observe(
            &GameEvent::FlagSet {
                flag: "met_governor".into(),
                value: FlagValue::Bool(true),
            },
            &bus,
        );
        assert_eq!(purse.item_quantity("good_pepper"), 0);
        assert!(!purse.inventory.contains_key("good_pepper"));
        assert_eq!(purse.flag("met_governor"), Some(FlagValue::Bool(true)));
    }

    #[test]
    fn snapshot_round_trips() {
        let purse = Purse::new(42).with_item("good_silk", 2);
        let value = purse.snapshot().unwrap();
        let mut restored = Purse::default();
        restored.restore(value).unwrap();
        assert_eq!(restored, purse);
    }
}
