//! # Mercator - persistent simulation core for a historical trading game
//!
//! Mercator tracks everything about a trading campaign that has to survive a
//! save and load, independent of how the game is drawn on screen.
//!
//! ## Features
//!
//! - **Faction Ledger**: clamped reputation with three factions and threshold levels.
//! - **Quest Engine**: branching multi-stage quests driven by game events, with gated choices.
//! - **Contracts**: time-limited delivery jobs with reputation-scaled rewards and penalties.
//! - **Expeditions**: long-distance ventures resolved against route risk on return.
//! - **NPC Memory**: per-NPC attitude, trade history and price modifiers.
//! - **Progression**: a wealth-driven rank ladder that never regresses.
//! - **Achievements**: metric-driven unlocks with one-time rewards.
//! - **Saves**: versioned envelopes in a sled store, migrated on load.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mercator::sim::{Content, GameSession, MemorySaveStore, Purse, SessionOptions};
//!
//! fn main() -> Result<(), mercator::sim::SimError> {
//!     let mut session = GameSession::new(
//!         Content::standard(),
//!         Box::new(Purse::new(500)),
//!         Box::new(MemorySaveStore::new()),
//!         SessionOptions::default(),
//!     )?;
//!     session.adjust_reputation("crown", 15)?;
//!     session.advance_hours(24);
//!     session.save("slot_1");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`sim`] - subsystems, event bus, session coordinator and save orchestration
//! - [`config`] - TOML configuration for the CLI
//! - [`validation`] - checks for declarative content and slot names
//! - [`metrics`] - process-wide counters
//! - [`logutil`] - single-line escaping for author-supplied text in logs
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         GameSession          │ ← owns subsystems, drains the bus
//! └──────────────────────────────┘
//!          │ GameEvent (FIFO)
//! ┌──────────────────────────────┐
//! │ factions · npcs · progression│
//! │ quests · contracts · voyages │ ← publish only, never call each other
//! │ achievements                 │
//! └──────────────────────────────┘
//!          │ SaveSection snapshots
//! ┌──────────────────────────────┐
//! │ SaveOrchestrator + SaveStore │ ← versioned envelope per slot
//! └──────────────────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod sim;
pub mod validation;
