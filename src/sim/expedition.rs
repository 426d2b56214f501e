//! Long-distance trade expeditions resolved under risk.
//!
//! An expedition is a three-state machine driven only by comparing the hour
//! tick against stored timestamps: outbound until the midpoint, returning
//! until the return time, then resolved by a single risk roll. Resolved
//! expeditions stay visible until the next tick, then move to history.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use crate::sim::errors::SimError;
use crate::sim::events::{EventBus, GameEvent, Severity};
use crate::sim::faction::{FactionLedger, ReputationLevel};
use crate::sim::player::PlayerQueries;
use crate::sim::progression::Progression;
use crate::sim::save::SaveSection;
use crate::sim::types::GameTime;

pub const MIN_RISK: f64 = 0.01;
pub const MAX_RISK: f64 = 0.5;
pub const MAX_AFFINITY_BONUS: f64 = 0.3;
pub const RETURN_VARIANCE: (f64, f64) = (0.8, 1.2);
const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeGood {
    pub id: String,
    pub name: String,
    pub base_price: i64,
}

impl TradeGood {
    pub fn new(id: &str, name: &str, base_price: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            base_price,
        }
    }
}

/// Conditions for sending expeditions down a route. Empty means always open.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteUnlock {
    #[serde(default)]
    pub rank_token: Option<String>,
    /// Minimum reputation with the route's controlling faction.
    #[serde(default)]
    pub min_reputation: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRoute {
    pub id: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    /// One-way travel time in hours.
    pub travel_hours: GameTime,
    pub base_risk: f64,
    pub profit_multiplier: f64,
    #[serde(default)]
    pub affinity_goods: Vec<String>,
    pub faction: String,
    #[serde(default)]
    pub unlock: RouteUnlock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CargoLine {
    pub good: String,
    pub quantity: u32,
}

impl CargoLine {
    pub fn new(good: &str, quantity: u32) -> Self {
        Self {
            good: good.to_string(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionStatus {
    Outbound,
    Returning,
    Completed,
    Lost,
}

impl ExpeditionStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, ExpeditionStatus::Completed | ExpeditionStatus::Lost)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expedition {
    pub id: String,
    pub route_id: String,
    pub cargo: Vec<CargoLine>,
    pub departed_at: GameTime,
    pub midpoint: GameTime,
    pub return_time: GameTime,
    pub status: ExpeditionStatus,
    pub invested: i64,
    pub expected_return: i64,
    #[serde(default)]
    pub actual_return: i64,
    #[serde(default)]
    pub resolved_at: Option<GameTime>,
}

/// Pricing of a prospective expedition before any goods leave the hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpeditionQuote {
    pub invested: i64,
    pub multiplier: f64,
    pub expected_return: i64,
    pub risk: f64,
}

fn risk_shift(level: ReputationLevel) -> f64 {
    match level {
        ReputationLevel::Hostile => 0.10,
        ReputationLevel::Unfriendly => 0.05,
        ReputationLevel::Neutral => 0.0,
        ReputationLevel::Friendly => -0.05,
        ReputationLevel::Honored => -0.10,
        ReputationLevel::Champion => -0.15,
    }
}

/// Base risk shifted by standing with the controlling faction, clamped.
pub fn effective_risk(route: &TradeRoute, factions: &FactionLedger) -> f64 {
    let shift = factions.level(&route.faction).map_or(0.0, risk_shift);
    (route.base_risk + shift).clamp(MIN_RISK, MAX_RISK)
}

/// Outcome of a single roll: `None` when the cargo is lost.
pub fn settle(expected_return: i64, risk: f64, roll: f64, variance: f64) -> Option<i64> {
    if roll < risk {
        None
    } else {
        Some((expected_return as f64 * variance).round() as i64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExpeditionSnapshot {
    #[serde(default)]
    pub active: Vec<Expedition>,
    #[serde(default)]
    pub history: Vec<Expedition>,
    #[serde(default)]
    pub completed_total: u32,
    #[serde(default)]
    pub lost_total: u32,
    #[serde(default)]
    pub total_invested: i64,
    #[serde(default)]
    pub total_returned: i64,
}

pub struct ExpeditionBoard {
    routes: Vec<TradeRoute>,
    goods: BTreeMap<String, TradeGood>,
    active: Vec<Expedition>,
    history: VecDeque<Expedition>,
    completed_total: u32,
    lost_total: u32,
    total_invested: i64,
    total_returned: i64,
    rng: StdRng,
    bus: EventBus,
}

impl ExpeditionBoard {
    pub fn new(routes: Vec<TradeRoute>, goods: Vec<TradeGood>, bus: EventBus) -> Self {
        Self {
            routes,
            goods: goods.into_iter().map(|g| (g.id.clone(), g)).collect(),
            active: Vec::new(),
            history: VecDeque::new(),
            completed_total: 0,
            lost_total: 0,
            total_invested: 0,
            total_returned: 0,
            rng: StdRng::from_entropy(),
            bus,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn routes(&self) -> &[TradeRoute] {
        &self.routes
    }

    pub fn route(&self, route_id: &str) -> Result<&TradeRoute, SimError> {
        self.routes
            .iter()
            .find(|r| r.id == route_id)
            .ok_or_else(|| SimError::UnknownRoute(route_id.to_string()))
    }

    pub fn good(&self, good_id: &str) -> Option<&TradeGood> {
        self.goods.get(good_id)
    }

    pub fn active(&self) -> &[Expedition] {
        &self.active
    }

    pub fn get(&self, expedition_id: &str) -> Option<&Expedition> {
        self.active.iter().find(|e| e.id == expedition_id)
    }

    pub fn history(&self) -> impl Iterator<Item = &Expedition> {
        self.history.iter()
    }

    pub fn in_flight(&self) -> usize {
        self.active.iter().filter(|e| !e.status.is_resolved()).count()
    }

    pub fn completed_total(&self) -> u32 {
        self.completed_total
    }

    pub fn lost_total(&self) -> u32 {
        self.lost_total
    }

    pub fn total_invested(&self) -> i64 {
        self.total_invested
    }

    pub fn total_returned(&self) -> i64 {
        self.total_returned
    }

    pub fn is_unlocked(
        &self,
        route: &TradeRoute,
        progression: &Progression,
        factions: &FactionLedger,
    ) -> bool {
        let rank_ok = route
            .unlock
            .rank_token
            .as_deref()
            .map_or(true, |token| progression.has_unlock(token));
        let rep_ok = route.unlock.min_reputation.map_or(true, |min| {
            factions
                .get(&route.faction)
                .map_or(false, |rep| rep >= min)
        });
        rank_ok && rep_ok
    }

    /// Merge duplicate lines and reject empty or unknown cargo.
    fn normalize_cargo(&self, cargo: &[CargoLine]) -> Result<Vec<CargoLine>, SimError> {
        let mut merged: BTreeMap<&str, u32> = BTreeMap::new();
        for line in cargo.iter().filter(|l| l.quantity > 0) {
            if !self.goods.contains_key(&line.good) {
                return Err(SimError::UnknownGood(line.good.clone()));
            }
            *merged.entry(line.good.as_str()).or_insert(0) += line.quantity;
        }
        if merged.is_empty() {
            return Err(SimError::EmptyCargo);
        }
        Ok(merged
            .into_iter()
            .map(|(good, quantity)| CargoLine::new(good, quantity))
            .collect())
    }

    pub fn quote(
        &self,
        route_id: &str,
        cargo: &[CargoLine],
        factions: &FactionLedger,
    ) -> Result<ExpeditionQuote, SimError> {
        let route = self.route(route_id)?;
        let cargo = self.normalize_cargo(cargo)?;

        let mut invested = 0i64;
        let mut total_units = 0u32;
        let mut affinity_units = 0u32;
        for line in &cargo {
            let price = self.goods.get(&line.good).map_or(0, |g| g.base_price);
            invested += price * i64::from(line.quantity);
            total_units += line.quantity;
            if route.affinity_goods.contains(&line.good) {
                affinity_units += line.quantity;
            }
        }

        let affinity_bonus = MAX_AFFINITY_BONUS * f64::from(affinity_units) / f64::from(total_units);
        let reputation = factions.get(&route.faction).unwrap_or(0);
        let reputation_bonus = match reputation {
            r if r >= 80 => 0.2,
            r if r >= 50 => 0.1,
            _ => 0.0,
        };
        let multiplier = route.profit_multiplier + affinity_bonus + reputation_bonus;
        Ok(ExpeditionQuote {
            invested,
            multiplier,
            expected_return: (invested as f64 * multiplier).round() as i64,
            risk: effective_risk(route, factions),
        })
    }

    /// Commit goods to a route. The goods leave the player's hold through
    /// `ItemLost` events; nothing changes when validation fails.
    pub fn start(
        &mut self,
        route_id: &str,
        cargo: &[CargoLine],
        player: &dyn PlayerQueries,
        progression: &Progression,
        factions: &FactionLedger,
        now: GameTime,
    ) -> Result<String, SimError> {
        let route = self.route(route_id).map_err(|err| {
            warn!("expedition requested on unknown route '{}'", route_id);
            err
        })?;
        if !self.is_unlocked(route, progression, factions) {
            return Err(SimError::RouteLocked(route_id.to_string()));
        }
        let limit = progression.max_expeditions();
        let in_flight = self.in_flight();
        if in_flight >= limit {
            return Err(SimError::CapacityReached {
                kind: "expedition",
                active: in_flight,
                limit,
            });
        }
        let cargo = self.normalize_cargo(cargo)?;
        for line in &cargo {
            let held = player.item_quantity(&line.good);
            if held < line.quantity {
                return Err(SimError::InsufficientGoods {
                    good: line.good.clone(),
                    needed: line.quantity,
                    held,
                });
            }
        }
        let quote = self.quote(route_id, &cargo, factions)?;
        let travel = route.travel_hours;
        let route_name = route.name.clone();

        let expedition = Expedition {
            id: Uuid::new_v4().to_string(),
            route_id: route_id.to_string(),
            cargo,
            departed_at: now,
            midpoint: now.saturating_add(travel),
            return_time: now.saturating_add(travel.saturating_mul(2)),
            status: ExpeditionStatus::Outbound,
            invested: quote.invested,
            expected_return: quote.expected_return,
            actual_return: 0,
            resolved_at: None,
        };
        for line in &expedition.cargo {
            self.bus.publish(GameEvent::ItemLost {
                item: line.good.clone(),
                quantity: line.quantity,
            });
        }
        info!(
            "expedition {} departed on {} (invested {}, expected {}, risk {:.2})",
            expedition.id, route_id, quote.invested, quote.expected_return, quote.risk
        );
        self.bus.publish(GameEvent::ExpeditionStarted {
            expedition_id: expedition.id.clone(),
            route_id: route_id.to_string(),
            invested: quote.invested,
            return_time: expedition.return_time,
        });
        self.bus.notify(
            "Expedition Departed",
            format!("Your ships sail for {}", route_name),
            Severity::Info,
        );
        self.total_invested += quote.invested;
        let id = expedition.id.clone();
        self.active.push(expedition);
        Ok(id)
    }

    /// Advance every expedition against `now`.
    pub fn tick(&mut self, now: GameTime, factions: &FactionLedger) {
        let (stale, current): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|e| e.resolved_at.map_or(false, |at| at < now));
        self.active = current;
        for expedition in stale {
            debug!("expedition {} archived", expedition.id);
            self.history.push_back(expedition);
        }
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }

        for index in 0..self.active.len() {
            let expedition = &mut self.active[index];
            if expedition.status == ExpeditionStatus::Outbound && now >= expedition.midpoint {
                expedition.status = ExpeditionStatus::Returning;
                debug!("expedition {} turned for home", expedition.id);
                self.bus.publish(GameEvent::ExpeditionReturning {
                    expedition_id: expedition.id.clone(),
                    route_id: expedition.route_id.clone(),
                });
            }
            if expedition.status == ExpeditionStatus::Returning && now >= expedition.return_time {
                self.resolve(index, now, factions);
            }
        }
    }

    fn resolve(&mut self, index: usize, now: GameTime, factions: &FactionLedger) {
        let risk = self
            .routes
            .iter()
            .find(|r| r.id == self.active[index].route_id)
            .map_or(MAX_RISK, |route| effective_risk(route, factions));
        let roll: f64 = self.rng.gen();
        let variance = self.rng.gen_range(RETURN_VARIANCE.0..=RETURN_VARIANCE.1);

        let expedition = &mut self.active[index];
        expedition.resolved_at = Some(now);
        match settle(expedition.expected_return, risk, roll, variance) {
            Some(amount) => {
                expedition.status = ExpeditionStatus::Completed;
                expedition.actual_return = amount;
                self.completed_total += 1;
                self.total_returned += amount;
                info!(
                    "expedition {} returned {} (roll {:.3} vs risk {:.2})",
                    expedition.id, amount, roll, risk
                );
                self.bus
                    .adjust_gold(amount, &format!("expedition {}", expedition.route_id));
                self.bus.publish(GameEvent::ExpeditionCompleted {
                    expedition_id: expedition.id.clone(),
                    route_id: expedition.route_id.clone(),
                    actual_return: amount,
                });
                self.bus.notify(
                    "Expedition Returned",
                    format!("Your cargo sold for {} gold", amount),
                    Severity::Success,
                );
            }
            None => {
                expedition.status = ExpeditionStatus::Lost;
                self.lost_total += 1;
                info!(
                    "expedition {} lost at sea (roll {:.3} vs risk {:.2})",
                    expedition.id, roll, risk
                );
                self.bus.publish(GameEvent::ExpeditionLost {
                    expedition_id: expedition.id.clone(),
                    route_id: expedition.route_id.clone(),
                    invested: expedition.invested,
                });
                self.bus.notify(
                    "Expedition Lost",
                    format!("{} gold of cargo never came home", expedition.invested),
                    Severity::Error,
                );
            }
        }
    }

    pub fn handle_event(&mut self, event: &GameEvent, factions: &FactionLedger) {
        if let GameEvent::HourTick { time, .. } = event {
            self.tick(*time, factions);
        }
    }
}

impl SaveSection for ExpeditionBoard {
    const SECTION: &'static str = "expeditions";
    type Snapshot = ExpeditionSnapshot;

    fn snapshot(&self) -> ExpeditionSnapshot {
        ExpeditionSnapshot {
            active: self.active.clone(),
            history: self.history.iter().cloned().collect(),
            completed_total: self.completed_total,
            lost_total: self.lost_total,
            total_invested: self.total_invested,
            total_returned: self.total_returned,
        }
    }

    fn restore(&mut self, snapshot: ExpeditionSnapshot) {
        let routes = &self.routes;
        self.active = snapshot
            .active
            .into_iter()
            .filter(|e| {
                let known = routes.iter().any(|r| r.id == e.route_id);
                if !known {
                    warn!("saved expedition {} on unknown route '{}' dropped", e.id, e.route_id);
                }
                known
            })
            .collect();
        self.history = snapshot.history.into_iter().collect();
        self.completed_total = snapshot.completed_total;
        self.lost_total = snapshot.lost_total;
        self.total_invested = snapshot.total_invested;
        self.total_returned = snapshot.total_returned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::{drain, EventReceiver};
    use crate::sim::faction::Faction;
    use std::collections::HashMap;

    struct Hold(HashMap<String, u32>);

    impl PlayerQueries for Hold {
        fn gold(&self) -> i64 {
            0
        }
        fn reputation(&self, _faction: &str) -> Option<i32> {
            Some(0)
        }
        fn item_quantity(&self, item: &str) -> u32 {
            self.0.get(item).copied().unwrap_or(0)
        }
        fn flag(&self, _flag: &str) -> Option<crate::sim::types::FlagValue> {
            None
        }
    }

    fn hold() -> Hold {
        Hold(HashMap::from([
            ("good_pepper".to_string(), 10),
            ("good_wool".to_string(), 10),
        ]))
    }

    fn spice_route() -> TradeRoute {
        TradeRoute {
            id: "spice_islands".into(),
            name: "Spice Islands".into(),
            origin: "Lisbon".into(),
            destination: "Malacca".into(),
            travel_hours: 96,
            base_risk: 0.2,
            profit_multiplier: 1.5,
            affinity_goods: vec!["good_pepper".into()],
            faction: "crown".into(),
            unlock: RouteUnlock::default(),
        }
    }

    fn fixture() -> (ExpeditionBoard, FactionLedger, Progression, EventReceiver) {
        let (bus, rx) = EventBus::channel();
        let factions = FactionLedger::new(vec![Faction::new("crown", "The Crown", "")], bus.clone());
        let progression = Progression::new(bus.clone());
        let mut locked = spice_route();
        locked.id = "guarded".into();
        locked.unlock.rank_token = Some("trade_routes".into());
        let board = ExpeditionBoard::new(
            vec![spice_route(), locked],
            vec![
                TradeGood::new("good_pepper", "Pepper", 40),
                TradeGood::new("good_wool", "Wool", 15),
            ],
            bus,
        )
        .with_seed(11);
        (board, factions, progression, rx)
    }

    fn launch(
        board: &mut ExpeditionBoard,
        route: &str,
        cargo: &[CargoLine],
        progression: &Progression,
        factions: &FactionLedger,
        now: GameTime,
    ) -> Result<String, SimError> {
        board.start(route, cargo, &hold(), progression, factions, now)
    }

    #[test]
    fn risk_shifts_with_standing_and_clamps() {
        let (_board, mut factions, _progression, _rx) = fixture();
        let mut route = spice_route();
        assert!((effective_risk(&route, &factions) - 0.2).abs() < 1e-9);
        factions.set_direct("crown", 85).unwrap();
        assert!((effective_risk(&route, &factions) - 0.05).abs() < 1e-9);
        route.base_risk = 0.0;
        assert_eq!(effective_risk(&route, &factions), MIN_RISK);
        factions.set_direct("crown", -90).unwrap();
        route.base_risk = 0.45;
        assert_eq!(effective_risk(&route, &factions), MAX_RISK);
    }

    #[test]
    fn quote_adds_affinity_and_reputation_bonus() {
        let (board, mut factions, _progression, _rx) = fixture();
        let cargo = [CargoLine::new("good_pepper", 5), CargoLine::new("good_wool", 5)];
        let quote = board.quote("spice_islands", &cargo, &factions).unwrap();
        assert_eq!(quote.invested, 275);
        assert!((quote.multiplier - 1.65).abs() < 1e-9);

        factions.set_direct("crown", 80).unwrap();
        let quote = board.quote("spice_islands", &cargo, &factions).unwrap();
        assert!((quote.multiplier - 1.85).abs() < 1e-9);
        assert_eq!(quote.expected_return, 509);
    }

    #[test]
    fn settle_is_a_single_threshold() {
        assert_eq!(settle(1_000, 0.2, 0.19, 1.0), None);
        assert_eq!(settle(1_000, 0.2, 0.2, 0.8), Some(800));
        assert_eq!(settle(1_000, 0.2, 0.99, 1.2), Some(1_200));
    }

    #[test]
    fn start_validates_before_touching_inventory() {
        let (mut board, factions, progression, mut rx) = fixture();
        assert!(matches!(
            launch(&mut board, "guarded", &[CargoLine::new("good_pepper", 1)], &progression, &factions, 0),
            Err(SimError::RouteLocked(_))
        ));
        assert!(matches!(
            launch(&mut board, "spice_islands", &[], &progression, &factions, 0),
            Err(SimError::EmptyCargo)
        ));
        assert!(matches!(
            launch(&mut board, "spice_islands", &[CargoLine::new("good_pepper", 11)], &progression, &factions, 0),
            Err(SimError::InsufficientGoods { needed: 11, held: 10, .. })
        ));
        assert!(matches!(
            launch(&mut board, "atlantis", &[CargoLine::new("good_pepper", 1)], &progression, &factions, 0),
            Err(SimError::UnknownRoute(_))
        ));
        assert!(drain(&mut rx).is_empty());

        launch(&mut board, "spice_islands", &[CargoLine::new("good_pepper", 2)], &progression, &factions, 0)
            .unwrap();
        assert!(matches!(
            launch(&mut board, "spice_islands", &[CargoLine::new("good_pepper", 2)], &progression, &factions, 0),
            Err(SimError::CapacityReached { limit: 1, .. })
        ));
        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            GameEvent::ItemLost {
                item: "good_pepper".into(),
                quantity: 2
            }
        );
    }

    #[test]
    fn schedule_saturates_at_the_end_of_time() {
        let (mut board, factions, progression, _rx) = fixture();
        let now = GameTime::MAX - 100;
        let id = launch(&mut board, "spice_islands", &[CargoLine::new("good_pepper", 1)], &progression, &factions, now)
            .unwrap();
        let expedition = board.get(&id).unwrap();
        assert_eq!(expedition.departed_at, now);
        assert_eq!(expedition.midpoint, GameTime::MAX - 4);
        assert_eq!(expedition.return_time, GameTime::MAX);
    }

    #[test]
    fn lifecycle_follows_timestamps_and_rolls_once() {
        let (mut board, factions, progression, mut rx) = fixture();
        let id = launch(&mut board, "spice_islands", &[CargoLine::new("good_pepper", 5)], &progression, &factions, 168)
            .unwrap();
        let expedition = board.get(&id).unwrap();
        assert_eq!(expedition.midpoint, 264);
        assert_eq!(expedition.return_time, 360);
        drain(&mut rx);

        board.tick(263, &factions);
        assert_eq!(board.get(&id).unwrap().status, ExpeditionStatus::Outbound);
        board.tick(264, &factions);
        assert_eq!(board.get(&id).unwrap().status, ExpeditionStatus::Returning);
        board.tick(359, &factions);
        board.tick(360, &factions);
        let resolved = board.get(&id).unwrap().status;
        assert!(resolved.is_resolved());

        board.tick(360, &factions);
        board.tick(361, &factions);
        assert!(board.get(&id).is_none());
        assert_eq!(board.history().count(), 1);
        assert_eq!(board.completed_total() + board.lost_total(), 1);

        let outcomes = drain(&mut rx)
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    GameEvent::ExpeditionCompleted { .. } | GameEvent::ExpeditionLost { .. }
                )
            })
            .count();
        assert_eq!(outcomes, 1);
    }

    #[test]
    fn late_tick_never_skips_returning() {
        let (mut board, factions, progression, mut rx) = fixture();
        launch(&mut board, "spice_islands", &[CargoLine::new("good_pepper", 1)], &progression, &factions, 0)
            .unwrap();
        drain(&mut rx);
        board.tick(500, &factions);
        let kinds: Vec<&str> = drain(&mut rx)
            .iter()
            .map(|e| e.kind())
            .filter(|k| k.starts_with("expedition_"))
            .collect();
        assert_eq!(kinds[0], "expedition_returning");
        assert!(kinds[1] == "expedition_completed" || kinds[1] == "expedition_lost");
    }
}
