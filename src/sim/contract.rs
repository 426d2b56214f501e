//! Time-limited delivery contracts.
//!
//! An available pool is drawn from the template list on refresh. Accepting a
//! contract stamps it with a deadline; deliveries count toward the required
//! quantity and the hourly sweep fails anything still open at its deadline.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::sim::errors::SimError;
use crate::sim::events::{EventBus, GameEvent, Severity};
use crate::sim::faction::{FactionLedger, ReputationLevel};
use crate::sim::progression::Progression;
use crate::sim::save::SaveSection;
use crate::sim::types::GameTime;

pub const CANCEL_REPUTATION_COST: i32 = 5;
pub const HISTORY_LIMIT: usize = 20;
pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractTemplate {
    pub id: String,
    pub client: String,
    pub faction: String,
    pub good: String,
    pub quantity: u32,
    pub deadline_hours: GameTime,
    pub reward: i64,
    pub penalty: i64,
    #[serde(default)]
    pub reputation_reward: i32,
    #[serde(default)]
    pub reputation_penalty: i32,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveContract {
    /// Template id; unique among active contracts.
    pub id: String,
    pub instance: Uuid,
    pub client: String,
    pub faction: String,
    pub good: String,
    pub quantity: u32,
    pub reward: i64,
    pub penalty: i64,
    pub reputation_reward: i32,
    pub reputation_penalty: i32,
    pub accepted_at: GameTime,
    pub expires_at: GameTime,
    #[serde(default)]
    pub delivered: u32,
    pub status: ContractStatus,
}

impl ActiveContract {
    fn from_template(template: &ContractTemplate, now: GameTime) -> Self {
        Self {
            id: template.id.clone(),
            instance: Uuid::new_v4(),
            client: template.client.clone(),
            faction: template.faction.clone(),
            good: template.good.clone(),
            quantity: template.quantity,
            reward: template.reward,
            penalty: template.penalty,
            reputation_reward: template.reputation_reward,
            reputation_penalty: template.reputation_penalty,
            accepted_at: now,
            expires_at: now.saturating_add(template.deadline_hours),
            delivered: 0,
            status: ContractStatus::Active,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.delivered)
    }

    pub fn is_expired(&self, now: GameTime) -> bool {
        now >= self.expires_at
    }
}

/// Reward multiplier offered by a faction at the given standing.
pub fn reward_multiplier(level: ReputationLevel) -> f64 {
    match level {
        ReputationLevel::Champion => 1.40,
        ReputationLevel::Honored => 1.25,
        ReputationLevel::Friendly => 1.10,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractSnapshot {
    #[serde(default)]
    pub available: Vec<ContractTemplate>,
    #[serde(default)]
    pub active: Vec<ActiveContract>,
    #[serde(default)]
    pub history: Vec<ActiveContract>,
    #[serde(default)]
    pub completed_total: u32,
    #[serde(default)]
    pub failed_total: u32,
}

pub struct ContractBoard {
    templates: Vec<ContractTemplate>,
    available: Vec<ContractTemplate>,
    /// Ordered by acceptance.
    active: Vec<ActiveContract>,
    history: VecDeque<ActiveContract>,
    completed_total: u32,
    failed_total: u32,
    pool_size: usize,
    refresh_days: u64,
    rng: StdRng,
    bus: EventBus,
}

impl ContractBoard {
    pub fn new(templates: Vec<ContractTemplate>, bus: EventBus) -> Self {
        Self {
            templates,
            available: Vec::new(),
            active: Vec::new(),
            history: VecDeque::new(),
            completed_total: 0,
            failed_total: 0,
            pool_size: DEFAULT_POOL_SIZE,
            refresh_days: 1,
            rng: StdRng::from_entropy(),
            bus,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_refresh_days(mut self, days: u64) -> Self {
        self.refresh_days = days.max(1);
        self
    }

    pub fn templates(&self) -> &[ContractTemplate] {
        &self.templates
    }

    pub fn available(&self) -> &[ContractTemplate] {
        &self.available
    }

    pub fn active(&self) -> &[ActiveContract] {
        &self.active
    }

    pub fn get(&self, contract_id: &str) -> Option<&ActiveContract> {
        self.active.iter().find(|c| c.id == contract_id)
    }

    pub fn history(&self) -> impl Iterator<Item = &ActiveContract> {
        self.history.iter()
    }

    pub fn completed_total(&self) -> u32 {
        self.completed_total
    }

    pub fn failed_total(&self) -> u32 {
        self.failed_total
    }

    /// Redraw the available pool, skipping hostile factions and contracts already held.
    pub fn refresh(&mut self, factions: &FactionLedger) {
        let mut candidates: Vec<&ContractTemplate> = self
            .templates
            .iter()
            .filter(|t| !self.active.iter().any(|a| a.id == t.id))
            .filter(|t| match factions.level(&t.faction) {
                Ok(level) => level > ReputationLevel::Hostile,
                Err(_) => {
                    warn!("contract {} names unknown faction '{}'", t.id, t.faction);
                    false
                }
            })
            .collect();
        candidates.shuffle(&mut self.rng);

        self.available = candidates
            .into_iter()
            .take(self.pool_size)
            .map(|t| {
                let mut offer = t.clone();
                if let Ok(level) = factions.level(&t.faction) {
                    offer.reward = (t.reward as f64 * reward_multiplier(level)).round() as i64;
                }
                offer
            })
            .collect();

        debug!("contract pool refreshed: {} offers", self.available.len());
        self.bus.publish(GameEvent::ContractsRefreshed {
            available: self.available.len(),
        });
    }

    pub fn accept(
        &mut self,
        contract_id: &str,
        progression: &Progression,
        now: GameTime,
    ) -> Result<&ActiveContract, SimError> {
        let Some(index) = self.available.iter().position(|t| t.id == contract_id) else {
            warn!("accept requested for unknown contract '{}'", contract_id);
            return Err(SimError::UnknownContract(contract_id.to_string()));
        };
        let limit = progression.max_contracts();
        if self.active.len() >= limit {
            return Err(SimError::CapacityReached {
                kind: "contract",
                active: self.active.len(),
                limit,
            });
        }

        let template = self.available.remove(index);
        let contract = ActiveContract::from_template(&template, now);
        info!(
            "contract accepted: {} ({} x{} due at {})",
            contract.id, contract.good, contract.quantity, contract.expires_at
        );
        self.bus.publish(GameEvent::ContractAccepted {
            contract_id: contract.id.clone(),
            good: contract.good.clone(),
            quantity: contract.quantity,
            expires_at: contract.expires_at,
        });
        self.bus.notify(
            "Contract Accepted",
            format!(
                "Deliver {} {} for {}",
                contract.quantity, contract.good, contract.client
            ),
            Severity::Info,
        );
        self.active.push(contract);
        Ok(&self.active[self.active.len() - 1])
    }

    /// Count delivered units toward an active contract; completes it in the
    /// same call once the required quantity is reached.
    pub fn deliver_goods(
        &mut self,
        contract_id: &str,
        quantity: u32,
        now: GameTime,
    ) -> Result<ContractStatus, SimError> {
        let Some(index) = self.active.iter().position(|c| c.id == contract_id) else {
            if self.history.iter().any(|c| c.id == contract_id) {
                return Err(SimError::ContractNotActive(contract_id.to_string()));
            }
            warn!("delivery for unknown contract '{}'", contract_id);
            return Err(SimError::UnknownContract(contract_id.to_string()));
        };
        self.deliver_at(index, quantity, now)
    }

    /// Credit one sold unit of `good` to the earliest accepted open contract wanting it.
    pub fn deliver_sale(&mut self, good: &str, now: GameTime) -> Option<ContractStatus> {
        let index = self
            .active
            .iter()
            .position(|c| c.good == good && !c.is_expired(now))?;
        self.deliver_at(index, 1, now).ok()
    }

    fn deliver_at(
        &mut self,
        index: usize,
        quantity: u32,
        now: GameTime,
    ) -> Result<ContractStatus, SimError> {
        let contract = &mut self.active[index];
        if contract.is_expired(now) {
            return Err(SimError::ContractExpired(contract.id.clone()));
        }
        contract.delivered = contract
            .delivered
            .saturating_add(quantity)
            .min(contract.quantity);
        self.bus.publish(GameEvent::ContractProgress {
            contract_id: contract.id.clone(),
            delivered: contract.delivered,
            required: contract.quantity,
        });
        if contract.delivered < contract.quantity {
            return Ok(ContractStatus::Active);
        }

        let mut contract = self.active.remove(index);
        contract.status = ContractStatus::Completed;
        self.completed_total += 1;
        info!("contract completed: {} (+{} gold)", contract.id, contract.reward);
        self.bus
            .adjust_gold(contract.reward, &format!("contract {}", contract.id));
        self.bus.adjust_reputation(
            &contract.faction,
            contract.reputation_reward,
            &format!("contract {}", contract.id),
        );
        self.bus.publish(GameEvent::ContractCompleted {
            contract_id: contract.id.clone(),
            reward: contract.reward,
        });
        self.bus.notify(
            "Contract Completed",
            format!("{} paid {} gold", contract.client, contract.reward),
            Severity::Success,
        );
        self.archive(contract);
        Ok(ContractStatus::Completed)
    }

    /// Fail every active contract whose deadline has been reached.
    pub fn sweep_deadlines(&mut self, now: GameTime) -> usize {
        let (expired, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|c| c.is_expired(now));
        self.active = open;

        let count = expired.len();
        for mut contract in expired {
            contract.status = ContractStatus::Failed;
            self.failed_total += 1;
            info!(
                "contract failed: {} ({}/{} delivered by {})",
                contract.id, contract.delivered, contract.quantity, contract.expires_at
            );
            let reason = format!("contract {} missed", contract.id);
            self.bus.adjust_gold(-contract.penalty, &reason);
            self.bus
                .adjust_reputation(&contract.faction, -contract.reputation_penalty, &reason);
            self.bus.publish(GameEvent::ContractFailed {
                contract_id: contract.id.clone(),
                penalty: contract.penalty,
            });
            self.bus.notify(
                "Contract Failed",
                format!("The deadline for {} has passed", contract.client),
                Severity::Warning,
            );
            self.archive(contract);
        }
        count
    }

    pub fn cancel(&mut self, contract_id: &str) -> Result<(), SimError> {
        let Some(index) = self.active.iter().position(|c| c.id == contract_id) else {
            if self.history.iter().any(|c| c.id == contract_id) {
                return Err(SimError::ContractNotActive(contract_id.to_string()));
            }
            warn!("cancel requested for unknown contract '{}'", contract_id);
            return Err(SimError::UnknownContract(contract_id.to_string()));
        };
        let mut contract = self.active.remove(index);
        contract.status = ContractStatus::Failed;
        self.failed_total += 1;
        info!("contract canceled: {}", contract.id);
        self.bus.adjust_reputation(
            &contract.faction,
            -CANCEL_REPUTATION_COST,
            &format!("contract {} canceled", contract.id),
        );
        self.bus.publish(GameEvent::ContractCanceled {
            contract_id: contract.id.clone(),
        });
        self.archive(contract);
        Ok(())
    }

    fn archive(&mut self, contract: ActiveContract) {
        self.history.push_back(contract);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn handle_event(&mut self, event: &GameEvent, now: GameTime, factions: &FactionLedger) {
        match event {
            GameEvent::HourTick { time, .. } => {
                self.sweep_deadlines(*time);
            }
            GameEvent::DayTick { day } if day % self.refresh_days == 0 => self.refresh(factions),
            GameEvent::ItemSold { good, .. } => {
                self.deliver_sale(good, now);
            }
            _ => {}
        }
    }
}

impl SaveSection for ContractBoard {
    const SECTION: &'static str = "contracts";
    type Snapshot = ContractSnapshot;

    fn snapshot(&self) -> ContractSnapshot {
        ContractSnapshot {
            available: self.available.clone(),
            active: self.active.clone(),
            history: self.history.iter().cloned().collect(),
            completed_total: self.completed_total,
            failed_total: self.failed_total,
        }
    }

    fn restore(&mut self, snapshot: ContractSnapshot) {
        self.available = snapshot.available;
        self.active = snapshot
            .active
            .into_iter()
            .filter(|c| c.status == ContractStatus::Active)
            .collect();
        self.history = snapshot.history.into_iter().collect();
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.completed_total = snapshot.completed_total;
        self.failed_total = snapshot.failed_total;
    }
}
