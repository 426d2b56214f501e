mod common;

use common::{count_kind, options_at, record, session, session_with, sled_session};
use mercator::sim::save::REQUIRED_SECTIONS;
use mercator::sim::{
    seeds::seed_goods, CargoLine, Content, Effect, GameEvent, ObjectiveKind, PlayerState, Purse,
    QuestDefinition, QuestStatus, SaveStore, SessionOptions, SledSaveStore, Stage,
    AUTOSAVE_SLOT, SAVE_FORMAT_VERSION,
};
use serde_json::json;
use tempfile::TempDir;

fn well_stocked() -> Purse {
    seed_goods()
        .iter()
        .fold(Purse::new(600), |purse, good| purse.with_item(&good.id, 30))
}

/// Write bytes straight into a slot, bypassing the orchestrator.
fn write_raw(dir: &TempDir, slot: &str, bytes: &[u8]) {
    let store = SledSaveStore::open(dir.path()).unwrap();
    store.put(slot, bytes).unwrap();
}

fn v1_envelope() -> serde_json::Value {
    json!({
        "version": 1,
        "saved_at": "2024-05-01T12:00:00Z",
        "factions": { "reputation": { "crown": 20, "guild": -5 } },
        "quests": {},
        "contracts": {},
        "expeditions": {},
        "npcs": { "npcs": { "npc_hale": { "npc_id": "npc_hale", "name": "Hale", "attitude": 12 } } },
        "progression": { "rank": 1, "highest_gold": 800, "total_trades": 4 },
        "achievements": { "progress": {} }
    })
}

#[test]
fn every_section_survives_a_round_trip() {
    let dir = TempDir::new().unwrap();
    let before = {
        let mut session = sled_session(&dir, well_stocked());
        session.adjust_reputation("crown", 15).unwrap();
        session.adjust_reputation("corsairs", -35).unwrap();

        session.start_quest("crown_envoy").unwrap();
        session.talk_to("npc_governor", "Governor Albuquerque");
        session.sell("good_tea", 30, Some("npc_tea_merchant")).unwrap();

        let offer = session.contracts().available()[0].clone();
        session.accept_contract(&offer.id).unwrap();
        session.deliver_contract(&offer.id, 1).unwrap();
        session
            .launch_expedition("levant", &[CargoLine::new("good_wool", 10)])
            .unwrap();
        session.advance_hours(5);

        assert!(session.save("slot_2"));
        session.snapshot("slot_2").unwrap()
    };

    let mut session = sled_session(&dir, Purse::new(0));
    let events = record(&mut session);
    let loaded = session.load("slot_2").expect("slot_2 loads");
    assert_eq!(loaded.version, SAVE_FORMAT_VERSION);
    assert_eq!(count_kind(&events, "game_loaded"), 1);

    let after = session.snapshot("slot_2").unwrap();
    for section in REQUIRED_SECTIONS {
        assert_eq!(before.section(section), after.section(section), "{}", section);
    }
    assert_eq!(after.game_time, 5);
    assert_eq!(after.player, before.player);
    assert_eq!(session.now(), 5);
    assert_eq!(session.player().item_quantity("good_silk"), 30);
    assert_eq!(session.expeditions().in_flight(), 1);
    assert_eq!(
        session.quests().active("crown_envoy").unwrap().stage_id,
        "the_letter"
    );

    // Restoring is silent: no reputation, rank or contract events replayed.
    assert_eq!(count_kind(&events, "reputation_changed"), 0);
    assert_eq!(count_kind(&events, "rank_up"), 0);
    assert_eq!(count_kind(&events, "contract_accepted"), 0);
}

#[test]
fn listed_slots_follow_saves_and_deletes() {
    let dir = TempDir::new().unwrap();
    let mut session = sled_session(&dir, Purse::new(0));
    assert!(session.list_slots().unwrap().is_empty());

    session.advance_hours(30);
    assert!(session.save("slot_3"));
    assert!(session.quick_save());
    let slots: Vec<String> = session
        .list_slots()
        .unwrap()
        .into_iter()
        .map(|info| info.slot)
        .collect();
    assert_eq!(slots, vec!["slot_3", "autosave"]);
    assert_eq!(session.list_slots().unwrap()[0].game_time, 30);

    assert!(session.delete_slot("slot_3").unwrap());
    assert!(!session.delete_slot("slot_3").unwrap());
    assert!(session.load("slot_3").is_none());
}

#[test]
fn expired_deadlines_resolve_on_the_next_tick() {
    let dir = TempDir::new().unwrap();
    let (contract_id, late) = {
        let mut session = sled_session(&dir, Purse::new(600));
        let id = session.contracts().available()[0].id.clone();
        let contract = session.accept_contract(&id).unwrap();
        let mut envelope = session.snapshot("slot_1").unwrap();
        envelope.game_time = contract.expires_at + 10;
        let bytes = serde_json::to_vec(&envelope).unwrap();
        drop(session);
        write_raw(&dir, "slot_1", &bytes);
        (id, contract.expires_at + 10)
    };

    let mut session = sled_session(&dir, Purse::new(600));
    let events = record(&mut session);
    session.load("slot_1").unwrap();
    assert_eq!(session.now(), late);
    assert!(session.contracts().get(&contract_id).is_some());
    assert_eq!(count_kind(&events, "contract_failed"), 0);

    session.advance_hours(1);
    assert!(session.contracts().get(&contract_id).is_none());
    assert_eq!(count_kind(&events, "contract_failed"), 1);
}

#[test]
fn version_one_saves_are_migrated() {
    let dir = TempDir::new().unwrap();
    write_raw(&dir, "slot_1", v1_envelope().to_string().as_bytes());

    let mut session = sled_session(&dir, Purse::new(0));
    let loaded = session.load("slot_1").expect("v1 save loads");
    assert_eq!(loaded.version, SAVE_FORMAT_VERSION);
    assert_eq!(loaded.game_time, 0);
    assert_eq!(session.factions().get("crown").unwrap(), 20);
    assert_eq!(session.factions().get("guild").unwrap(), -5);
    assert_eq!(session.factions().get("corsairs").unwrap(), 0);
    assert_eq!(session.progression().rank(), 1);
    assert_eq!(session.progression().highest_gold(), 800);
    assert_eq!(session.progression().total_trades(), 4);
    assert_eq!(session.progression().total_gold_earned(), 0);
    let hale = session.npcs().get("npc_hale").unwrap();
    assert_eq!(hale.attitude, 12);
    assert!(hale.flags.is_empty());
}

#[test]
fn unreadable_section_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let mut raw = v1_envelope();
    raw["version"] = json!(SAVE_FORMAT_VERSION);
    raw["game_time"] = json!(12);
    raw["npcs"] = json!({ "npcs": 5 });
    write_raw(&dir, "slot_2", raw.to_string().as_bytes());

    let mut session = sled_session(&dir, Purse::new(0));
    session.talk_to("npc_dockhand", "Dockhand");
    assert!(session.load("slot_2").is_some());
    assert_eq!(session.npcs().known_count(), 0);
    assert_eq!(session.factions().get("crown").unwrap(), 20);
    assert_eq!(session.now(), 12);
}

#[test]
fn corrupt_and_future_slots_fail_cleanly() {
    let dir = TempDir::new().unwrap();
    write_raw(&dir, "slot_1", b"{ not json");
    let mut missing = v1_envelope();
    missing.as_object_mut().unwrap().remove("contracts");
    write_raw(&dir, "slot_2", missing.to_string().as_bytes());
    let mut future = v1_envelope();
    future["version"] = json!(SAVE_FORMAT_VERSION + 1);
    write_raw(&dir, "slot_3", future.to_string().as_bytes());

    let mut session = sled_session(&dir, Purse::new(0));
    session.adjust_reputation("guild", 30).unwrap();
    let events = record(&mut session);
    for slot in ["slot_1", "slot_2", "slot_3"] {
        assert!(session.load(slot).is_none(), "{}", slot);
    }
    assert_eq!(count_kind(&events, "load_failed"), 3);
    assert!(session.list_slots().unwrap().is_empty());
    // A failed load leaves the running game alone.
    assert_eq!(session.factions().get("guild").unwrap(), 30);
}

#[test]
fn memory_store_sessions_save_and_reload() {
    let mut session = session(Purse::new(900).with_item("good_silk", 3));
    session.adjust_reputation("guild", 12).unwrap();
    assert!(session.save("slot_1"));
    session.adjust_reputation("guild", 40).unwrap();
    session.sell("good_silk", 80, None).unwrap();

    session.load("slot_1").unwrap();
    assert_eq!(session.factions().get("guild").unwrap(), 12);
    assert_eq!(session.player().gold(), 900);
    assert_eq!(session.player().item_quantity("good_silk"), 3);
    assert!(!session.achievements().is_unlocked("first_trade"));
}

fn harbor_errand() -> Content {
    let mut content = Content::standard();
    content.quests.push(
        QuestDefinition::new("harbor_errand", "Harbor Errand", "npc_harbormaster")
            .with_stage(Stage::new("reach_harbor", ObjectiveKind::Travel, "harbor"))
            .with_reward(Effect::Reputation {
                faction: "guild".into(),
                amount: 15,
            })
            .with_reward(Effect::Gold { amount: 100 }),
    );
    content
}

#[test]
fn travel_autosave_includes_arrival_rewards() {
    let options = SessionOptions {
        autosave_on_travel: true,
        ..options_at(0)
    };
    let mut session = session_with(harbor_errand(), Purse::new(50), options);
    let events = record(&mut session);
    session.start_quest("harbor_errand").unwrap();
    session.travel("harbor");

    assert_eq!(session.quests().status("harbor_errand"), QuestStatus::Completed);
    assert_eq!(session.factions().get("guild").unwrap(), 15);
    assert_eq!(session.player().gold(), 150);
    assert_eq!(count_kind(&events, "game_saved"), 1);
    // The save is written after every consequence of the arrival.
    assert_eq!(
        events.borrow().last(),
        Some(&GameEvent::GameSaved {
            slot: AUTOSAVE_SLOT.into()
        })
    );

    let live = session.snapshot(AUTOSAVE_SLOT).unwrap();
    session.adjust_reputation("guild", -40).unwrap();
    let saved = session.load(AUTOSAVE_SLOT).expect("autosave loads");
    for section in REQUIRED_SECTIONS {
        assert_eq!(saved.section(section), live.section(section), "{}", section);
    }
    assert_eq!(saved.player, live.player);
    assert_eq!(session.factions().get("guild").unwrap(), 15);
    assert_eq!(session.player().gold(), 150);
    assert_eq!(session.quests().status("harbor_errand"), QuestStatus::Completed);
}

#[test]
fn travel_without_autosave_writes_nothing() {
    let mut session = session(Purse::new(0));
    let events = record(&mut session);
    session.travel("harbor");
    assert_eq!(count_kind(&events, "game_saved"), 0);
    assert!(session.list_slots().unwrap().is_empty());
}
