mod common;

use common::{count_kind, options_at, record, session_with};
use mercator::sim::{
    seeds::seed_contract_templates, Content, ContractStatus, GameEvent, GameSession, PlayerState,
    Purse, SessionOptions, SimError,
};

fn pepper_only(purse: Purse) -> GameSession {
    let content = Content {
        contracts: seed_contract_templates()
            .into_iter()
            .filter(|t| t.id == "crown_pepper")
            .collect(),
        ..Content::standard()
    };
    let options = SessionOptions {
        contract_pool_size: 1,
        ..options_at(0)
    };
    session_with(content, purse, options)
}

fn full_board(purse: Purse) -> GameSession {
    let options = SessionOptions {
        contract_pool_size: 8,
        ..options_at(0)
    };
    session_with(Content::standard(), purse, options)
}

#[test]
fn missed_deadline_charges_penalty_once() {
    let mut session = pepper_only(Purse::new(600));
    let events = record(&mut session);
    session.accept_contract("crown_pepper").unwrap();

    session.advance_hours(47);
    assert!(session.contracts().get("crown_pepper").is_some());
    session.advance_hours(1);
    assert!(session.contracts().get("crown_pepper").is_none());
    assert_eq!(session.contracts().failed_total(), 1);
    assert_eq!(session.player().gold(), 450);
    assert_eq!(session.factions().get("crown").unwrap(), -10);
    assert!(events.borrow().contains(&GameEvent::ContractFailed {
        contract_id: "crown_pepper".into(),
        penalty: 150,
    }));

    session.advance_hours(24);
    assert_eq!(count_kind(&events, "contract_failed"), 1);
    let archived = session.contracts().history().last().unwrap();
    assert_eq!(archived.status, ContractStatus::Failed);
}

#[test]
fn delivering_after_completion_is_rejected() {
    let mut session = pepper_only(Purse::new(0).with_item("good_pepper", 10));
    session.accept_contract("crown_pepper").unwrap();
    assert_eq!(
        session.deliver_contract("crown_pepper", 5).unwrap(),
        ContractStatus::Completed
    );
    assert!(matches!(
        session.deliver_contract("crown_pepper", 1),
        Err(SimError::ContractNotActive(_))
    ));
    assert_eq!(session.player().item_quantity("good_pepper"), 5);
}

#[test]
fn cancel_costs_reputation_but_no_gold() {
    let mut session = pepper_only(Purse::new(600));
    let events = record(&mut session);
    session.accept_contract("crown_pepper").unwrap();

    session.cancel_contract("crown_pepper").unwrap();
    assert!(session.contracts().active().is_empty());
    assert_eq!(session.contracts().failed_total(), 1);
    assert_eq!(session.factions().get("crown").unwrap(), -5);
    assert_eq!(session.player().gold(), 600);
    assert_eq!(count_kind(&events, "contract_canceled"), 1);

    assert!(matches!(
        session.cancel_contract("crown_pepper"),
        Err(SimError::ContractNotActive(_))
    ));
    assert!(matches!(
        session.cancel_contract("guild_silk"),
        Err(SimError::UnknownContract(_))
    ));
}

#[test]
fn market_sale_counts_toward_open_contract() {
    let mut session = pepper_only(Purse::new(600).with_item("good_pepper", 2));
    session.accept_contract("crown_pepper").unwrap();

    session.sell("good_pepper", 45, Some("npc_spice_broker")).unwrap();
    let contract = session.contracts().get("crown_pepper").unwrap();
    assert_eq!(contract.delivered, 1);
    assert_eq!(contract.status, ContractStatus::Active);
    assert_eq!(session.player().item_quantity("good_pepper"), 1);

    // Wool is not wanted by anyone on the board.
    let mut session = pepper_only(Purse::new(0).with_item("good_wool", 1));
    session.accept_contract("crown_pepper").unwrap();
    session.sell("good_wool", 15, None).unwrap();
    assert_eq!(session.contracts().get("crown_pepper").unwrap().delivered, 0);
}

#[test]
fn hostile_factions_offer_nothing() {
    let mut session = full_board(Purse::new(0));
    assert_eq!(session.contracts().available().len(), 8);

    session.adjust_reputation("corsairs", -40).unwrap();
    session.refresh_contracts();
    let offers = session.contracts().available();
    assert_eq!(offers.len(), 6);
    assert!(offers.iter().all(|t| t.faction != "corsairs"));
}

#[test]
fn friendly_standing_raises_offered_reward() {
    let mut session = pepper_only(Purse::new(0));
    assert_eq!(session.contracts().available()[0].reward, 400);

    session.adjust_reputation("crown", 15).unwrap();
    session.refresh_contracts();
    assert_eq!(session.contracts().available()[0].reward, 440);
    let contract = session.accept_contract("crown_pepper").unwrap();
    assert_eq!(contract.reward, 440);
}

#[test]
fn active_contracts_are_capped_by_rank() {
    let mut session = full_board(Purse::new(0));
    let offered: Vec<String> = session
        .contracts()
        .available()
        .iter()
        .map(|t| t.id.clone())
        .collect();
    for id in &offered[..3] {
        session.accept_contract(id).unwrap();
    }
    let err = session.accept_contract(&offered[3]).unwrap_err();
    assert!(matches!(
        err,
        SimError::CapacityReached {
            kind: "contract",
            active: 3,
            limit: 3
        }
    ));
    assert!(matches!(
        session.accept_contract("royal_monopoly"),
        Err(SimError::UnknownContract(_))
    ));
}

#[test]
fn accepted_contracts_leave_the_pool_until_refresh() {
    let mut session = full_board(Purse::new(0));
    session.accept_contract("guild_wine").unwrap();
    assert!(session
        .contracts()
        .available()
        .iter()
        .all(|t| t.id != "guild_wine"));

    // The daily refresh never re-offers a contract already held.
    session.advance_hours(24);
    assert_eq!(session.contracts().available().len(), 7);
    assert!(session
        .contracts()
        .available()
        .iter()
        .all(|t| t.id != "guild_wine"));
}
