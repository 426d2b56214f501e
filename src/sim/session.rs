//! Session coordinator.
//!
//! [`GameSession`] owns every subsystem, the player collaborator and the
//! receiving end of the event bus. Public operations call into one subsystem
//! and then dispatch whatever events that produced, so by the time a call
//! returns every consequence (gold, reputation, unlocks, achievements) has been
//! applied. Failures come back as `Err` and are also surfaced as a warning
//! notification so a UI listening on the bus can show them.
//!
//! Delivery order for each event is fixed: player, factions, NPCs,
//! progression, quests, contracts, expeditions, achievements, then external
//! subscribers. Contracts therefore sweep deadlines before expeditions resolve
//! within the same hour.

use std::time::Instant;

use log::{debug, info, warn};

use crate::metrics;
use crate::sim::achievement::AchievementTracker;
use crate::sim::clock::GameClock;
use crate::sim::contract::{ActiveContract, ContractBoard, ContractStatus, DEFAULT_POOL_SIZE};
use crate::sim::errors::SimError;
use crate::sim::events::{EventBus, EventReceiver, GameEvent, Severity};
use crate::sim::expedition::{CargoLine, ExpeditionBoard};
use crate::sim::faction::FactionLedger;
use crate::sim::npc::NpcRelations;
use crate::sim::player::{PlayerState, PlayerView};
use crate::sim::progression::Progression;
use crate::sim::quest::{AdvanceOutcome, QuestEngine};
use crate::sim::save::{SaveEnvelope, SaveOrchestrator, SlotInfo};
use crate::sim::seeds::Content;
use crate::sim::storage::{SaveStore, AUTOSAVE_SLOT};
use crate::sim::types::GameTime;

/// Upper bound on events handled by one dispatch pass.
pub const MAX_EVENTS_PER_PASS: usize = 10_000;

type Subscriber = Box<dyn FnMut(&GameEvent)>;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Seeds contract generation and expedition rolls; entropy when absent.
    pub seed: Option<u64>,
    pub contract_pool_size: usize,
    pub contract_refresh_days: u64,
    pub autosave_on_travel: bool,
    pub starting_time: GameTime,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: None,
            contract_pool_size: DEFAULT_POOL_SIZE,
            contract_refresh_days: 1,
            autosave_on_travel: true,
            starting_time: 0,
        }
    }
}

pub struct GameSession {
    bus: EventBus,
    receiver: EventReceiver,
    clock: GameClock,
    player: Box<dyn PlayerState>,
    factions: FactionLedger,
    npcs: NpcRelations,
    progression: Progression,
    quests: QuestEngine,
    contracts: ContractBoard,
    expeditions: ExpeditionBoard,
    achievements: AchievementTracker,
    saves: SaveOrchestrator,
    subscribers: Vec<Subscriber>,
    autosave_on_travel: bool,
    pending_autosave: bool,
}

impl GameSession {
    /// Build a session over `content`. Quest trees are validated here; the
    /// contract pool is filled and the starting wallet is observed before
    /// returning.
    pub fn new(
        content: Content,
        player: Box<dyn PlayerState>,
        store: Box<dyn SaveStore>,
        options: SessionOptions,
    ) -> Result<Self, SimError> {
        let (bus, receiver) = EventBus::channel();
        let factions = FactionLedger::new(content.factions, bus.clone());
        let faction_ids = factions.faction_ids();

        let mut quests = QuestEngine::new(bus.clone());
        for quest in content.quests {
            quests.register(quest)?;
        }

        let mut contracts = ContractBoard::new(content.contracts, bus.clone())
            .with_pool_size(options.contract_pool_size)
            .with_refresh_days(options.contract_refresh_days);
        let mut expeditions = ExpeditionBoard::new(content.routes, content.goods, bus.clone());
        if let Some(seed) = options.seed {
            contracts = contracts.with_seed(seed);
            expeditions = expeditions.with_seed(seed.wrapping_add(1));
        }

        let mut session = Self {
            clock: GameClock::starting_at(options.starting_time, bus.clone()),
            npcs: NpcRelations::new(bus.clone()),
            progression: Progression::new(bus.clone()),
            achievements: AchievementTracker::new(content.achievements, faction_ids, bus.clone()),
            saves: SaveOrchestrator::new(store),
            subscribers: Vec::new(),
            autosave_on_travel: options.autosave_on_travel,
            pending_autosave: false,
            player,
            factions,
            quests,
            contracts,
            expeditions,
            bus,
            receiver,
        };

        session.contracts.refresh(&session.factions);
        let gold = session.player.gold();
        session.bus.publish(GameEvent::GoldChanged { gold });
        session.dispatch();
        info!(
            "session ready: {} quests, {} contracts offered, {} gold",
            session.quests.definitions().count(),
            session.contracts.available().len(),
            gold
        );
        Ok(session)
    }

    // ---- accessors ----

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn now(&self) -> GameTime {
        self.clock.now()
    }

    pub fn player(&self) -> &dyn PlayerState {
        self.player.as_ref()
    }

    pub fn factions(&self) -> &FactionLedger {
        &self.factions
    }

    pub fn npcs(&self) -> &NpcRelations {
        &self.npcs
    }

    pub fn progression(&self) -> &Progression {
        &self.progression
    }

    pub fn quests(&self) -> &QuestEngine {
        &self.quests
    }

    pub fn contracts(&self) -> &ContractBoard {
        &self.contracts
    }

    pub fn expeditions(&self) -> &ExpeditionBoard {
        &self.expeditions
    }

    pub fn achievements(&self) -> &AchievementTracker {
        &self.achievements
    }

    /// Read-only player view including faction reputation.
    pub fn view(&self) -> PlayerView<'_> {
        PlayerView::new(self.player.as_ref(), &self.factions)
    }

    /// Register an external listener. Listeners see every event after all subsystems.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&GameEvent) + 'static,
    {
        self.subscribers.push(Box::new(listener));
    }

    // ---- dispatch ----

    /// Drain the bus, delivering each event in FIFO order. Returns the number handled.
    ///
    /// A travel autosave is written only once the queue is empty, so the
    /// envelope carries every consequence of the arrival.
    pub fn dispatch(&mut self) -> usize {
        let mut handled = 0;
        loop {
            while let Ok(event) = self.receiver.try_recv() {
                self.deliver(&event);
                handled += 1;
                if handled >= MAX_EVENTS_PER_PASS {
                    warn!(
                        "dispatch stopped after {} events; remaining events stay queued",
                        handled
                    );
                    metrics::inc_dispatch_overflow();
                    metrics::add_events_dispatched(handled as u64);
                    return handled;
                }
            }
            if !self.pending_autosave {
                break;
            }
            self.pending_autosave = false;
            self.save(AUTOSAVE_SLOT);
        }
        metrics::add_events_dispatched(handled as u64);
        handled
    }

    fn deliver(&mut self, event: &GameEvent) {
        let now = match event {
            GameEvent::HourTick { time, .. } => *time,
            _ => self.clock.now(),
        };
        self.player.observe(event, &self.bus);
        self.factions.handle_event(event);
        self.npcs.handle_event(event, now);
        self.progression.handle_event(event);
        {
            let view = PlayerView::new(self.player.as_ref(), &self.factions);
            self.quests.handle_event(event, &view);
        }
        self.contracts.handle_event(event, now, &self.factions);
        self.expeditions.handle_event(event, &self.factions);
        self.achievements.handle_event(event, now);
        for subscriber in self.subscribers.iter_mut() {
            subscriber(event);
        }

        if self.autosave_on_travel {
            if let GameEvent::LocationChanged { location } = event {
                debug!("autosave queued after arriving at {}", location);
                self.pending_autosave = true;
            }
        }
    }

    /// Publish an event from the surrounding game and apply its consequences.
    pub fn emit(&mut self, event: GameEvent) {
        self.bus.publish(event);
        self.dispatch();
    }

    /// Dispatch pending events, reporting `result`'s error as a notification first.
    fn settle<T>(&mut self, title: &str, result: Result<T, SimError>) -> Result<T, SimError> {
        if let Err(err) = &result {
            if err.is_invalid_reference() {
                warn!("{}: {}", title, err);
            } else {
                debug!("{}: {}", title, err);
            }
            self.bus.notify(title, err.to_string(), Severity::Warning);
        }
        self.dispatch();
        result
    }

    // ---- time ----

    /// Advance the clock hour by hour, dispatching after each tick.
    pub fn advance_hours(&mut self, hours: u64) {
        for _ in 0..hours {
            self.clock.tick_hour();
            self.dispatch();
        }
    }

    /// Feed real-time update minutes to the clock; returns hours elapsed.
    pub fn advance_minutes(&mut self, minutes: u32) -> u32 {
        let mut elapsed = 0;
        for _ in 0..minutes / 60 {
            elapsed += self.clock.advance_minutes(60);
            self.dispatch();
        }
        elapsed += self.clock.advance_minutes(minutes % 60);
        self.dispatch();
        elapsed
    }

    // ---- player actions ----

    pub fn buy(&mut self, good: &str, price: i64, npc: Option<&str>) {
        self.bus.adjust_gold(-price, &format!("bought {}", good));
        self.bus.publish(GameEvent::ItemGained {
            item: good.to_string(),
            quantity: 1,
        });
        self.emit(GameEvent::ItemBought {
            good: good.to_string(),
            price,
            npc: npc.map(str::to_string),
        });
    }

    /// Sell one unit. Rejected when the player does not hold it.
    pub fn sell(&mut self, good: &str, price: i64, npc: Option<&str>) -> Result<(), SimError> {
        let held = self.player.item_quantity(good);
        if held == 0 {
            let err = SimError::InsufficientGoods {
                good: good.to_string(),
                needed: 1,
                held,
            };
            return self.settle("Cannot Sell", Err(err));
        }
        self.bus.publish(GameEvent::ItemLost {
            item: good.to_string(),
            quantity: 1,
        });
        self.bus.adjust_gold(price, &format!("sold {}", good));
        self.emit(GameEvent::ItemSold {
            good: good.to_string(),
            price,
            npc: npc.map(str::to_string),
        });
        Ok(())
    }

    pub fn talk_to(&mut self, npc_id: &str, npc_name: &str) {
        self.emit(GameEvent::NpcInteraction {
            npc_id: npc_id.to_string(),
            npc_name: npc_name.to_string(),
        });
    }

    pub fn travel(&mut self, location: &str) {
        self.emit(GameEvent::LocationChanged {
            location: location.to_string(),
        });
    }

    // ---- factions ----

    pub fn adjust_reputation(&mut self, faction: &str, delta: i32) -> Result<i32, SimError> {
        let result = self.factions.adjust(faction, delta);
        self.settle("Reputation", result)
    }

    // ---- quests ----

    pub fn can_start_quest(&self, quest_id: &str) -> bool {
        self.quests.can_start(quest_id, &self.view())
    }

    pub fn start_quest(&mut self, quest_id: &str) -> Result<(), SimError> {
        let now = self.clock.now();
        let view = PlayerView::new(self.player.as_ref(), &self.factions);
        let result = self.quests.start(quest_id, &view, now);
        self.settle("Quest Unavailable", result)
    }

    pub fn advance_quest(
        &mut self,
        quest_id: &str,
        choice_id: Option<&str>,
    ) -> Result<AdvanceOutcome, SimError> {
        let view = PlayerView::new(self.player.as_ref(), &self.factions);
        let result = self.quests.advance_stage(quest_id, choice_id, &view);
        self.settle("Quest", result)
    }

    pub fn quest_progress(
        &mut self,
        quest_id: &str,
        amount: u32,
    ) -> Result<Option<AdvanceOutcome>, SimError> {
        let view = PlayerView::new(self.player.as_ref(), &self.factions);
        let result = self.quests.update_progress(quest_id, amount, &view);
        self.settle("Quest", result)
    }

    pub fn abandon_quest(&mut self, quest_id: &str) -> Result<(), SimError> {
        let result = self.quests.abandon(quest_id);
        self.settle("Quest", result)
    }

    // ---- contracts ----

    pub fn refresh_contracts(&mut self) {
        self.contracts.refresh(&self.factions);
        self.dispatch();
    }

    pub fn accept_contract(&mut self, contract_id: &str) -> Result<ActiveContract, SimError> {
        let now = self.clock.now();
        let result = self
            .contracts
            .accept(contract_id, &self.progression, now)
            .map(|contract| contract.clone());
        self.settle("Contract Unavailable", result)
    }

    /// Hand over held goods toward a contract. Only the units the contract
    /// still needs leave the player's hold.
    pub fn deliver_contract(
        &mut self,
        contract_id: &str,
        quantity: u32,
    ) -> Result<ContractStatus, SimError> {
        let result = self.try_deliver_contract(contract_id, quantity);
        self.settle("Delivery Refused", result)
    }

    fn try_deliver_contract(
        &mut self,
        contract_id: &str,
        quantity: u32,
    ) -> Result<ContractStatus, SimError> {
        let now = self.clock.now();
        let Some((good, needed)) = self
            .contracts
            .get(contract_id)
            .map(|c| (c.good.clone(), c.remaining().min(quantity)))
        else {
            return self.contracts.deliver_goods(contract_id, quantity, now);
        };
        let held = self.player.item_quantity(&good);
        if held < needed {
            return Err(SimError::InsufficientGoods { good, needed, held });
        }
        let status = self.contracts.deliver_goods(contract_id, needed, now)?;
        self.bus.publish(GameEvent::ItemLost {
            item: good,
            quantity: needed,
        });
        Ok(status)
    }

    pub fn cancel_contract(&mut self, contract_id: &str) -> Result<(), SimError> {
        let result = self.contracts.cancel(contract_id);
        self.settle("Contract", result)
    }

    // ---- expeditions ----

    pub fn launch_expedition(
        &mut self,
        route_id: &str,
        cargo: &[CargoLine],
    ) -> Result<String, SimError> {
        let now = self.clock.now();
        let view = PlayerView::new(self.player.as_ref(), &self.factions);
        let result = self.expeditions.start(
            route_id,
            cargo,
            &view,
            &self.progression,
            &self.factions,
            now,
        );
        self.settle("Expedition Refused", result)
    }

    // ---- persistence ----

    /// Assemble an envelope from every subsystem's current snapshot.
    pub fn snapshot(&self, slot: &str) -> Result<SaveEnvelope, SimError> {
        let mut envelope = SaveEnvelope::empty(slot, self.clock.now());
        envelope.capture(&self.factions)?;
        envelope.capture(&self.quests)?;
        envelope.capture(&self.contracts)?;
        envelope.capture(&self.expeditions)?;
        envelope.capture(&self.npcs)?;
        envelope.capture(&self.progression)?;
        envelope.capture(&self.achievements)?;
        envelope.player = self.player.snapshot();
        Ok(envelope)
    }

    /// Write every section to `slot`. Publishes `GameSaved` or `SaveFailed`.
    pub fn save(&mut self, slot: &str) -> bool {
        let started = Instant::now();
        let outcome = self
            .snapshot(slot)
            .and_then(|envelope| self.saves.write(slot, &envelope));
        metrics::observe_save_latency(started);
        match outcome {
            Ok(()) => {
                info!("game saved to {} at hour {}", slot, self.clock.now());
                metrics::inc_saves_written();
                self.bus.publish(GameEvent::GameSaved {
                    slot: slot.to_string(),
                });
                true
            }
            Err(err) => {
                warn!("save to {} failed: {}", slot, err);
                metrics::inc_saves_failed();
                self.bus.publish(GameEvent::SaveFailed {
                    slot: slot.to_string(),
                    message: err.to_string(),
                });
                self.bus
                    .notify("Save Failed", err.to_string(), Severity::Error);
                false
            }
        }
    }

    pub fn quick_save(&mut self) -> bool {
        let saved = self.save(AUTOSAVE_SLOT);
        self.dispatch();
        saved
    }

    /// Restore every subsystem from `slot`. Publishes `GameLoaded` or
    /// `LoadFailed`; returns `None` for empty, unreadable or corrupt slots.
    /// Deadlines that passed while saved resolve on the next live hour tick.
    pub fn load(&mut self, slot: &str) -> Option<SaveEnvelope> {
        self.dispatch();
        let envelope = match self.saves.read(slot) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                self.load_failed(slot, format!("slot {} is empty", slot));
                return None;
            }
            Err(err) => {
                self.load_failed(slot, err.to_string());
                return None;
            }
        };

        envelope.restore_into(&mut self.factions);
        envelope.restore_into(&mut self.npcs);
        envelope.restore_into(&mut self.progression);
        envelope.restore_into(&mut self.quests);
        envelope.restore_into(&mut self.contracts);
        envelope.restore_into(&mut self.expeditions);
        envelope.restore_into(&mut self.achievements);
        if let Some(player) = envelope.player.clone() {
            if let Err(err) = self.player.restore(player) {
                warn!("player section in {} unreadable: {}", slot, err);
            }
        }
        self.clock.set_time(envelope.game_time);

        info!("game loaded from {} at hour {}", slot, envelope.game_time);
        metrics::inc_loads_completed();
        self.bus.publish(GameEvent::GameLoaded {
            slot: slot.to_string(),
        });
        self.dispatch();
        Some(envelope)
    }

    fn load_failed(&mut self, slot: &str, message: String) {
        warn!("load from {} failed: {}", slot, message);
        metrics::inc_loads_failed();
        self.bus.publish(GameEvent::LoadFailed {
            slot: slot.to_string(),
            message: message.clone(),
        });
        self.bus.notify("Load Failed", message, Severity::Error);
        self.dispatch();
    }

    pub fn list_slots(&self) -> Result<Vec<SlotInfo>, SimError> {
        self.saves.list()
    }

    pub fn delete_slot(&mut self, slot: &str) -> Result<bool, SimError> {
        let result = self.saves.delete(slot);
        if let Ok(true) = result {
            info!("deleted save slot {}", slot);
        }
        self.settle("Delete Failed", result)
    }
}
