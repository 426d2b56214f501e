//! Shared fixtures for integration tests.
#![allow(dead_code)] // Not every test binary uses every helper.

use std::cell::RefCell;
use std::rc::Rc;

use mercator::sim::{
    Content, GameEvent, GameSession, MemorySaveStore, Purse, SessionOptions, SledSaveStore,
};
use tempfile::TempDir;

pub fn options_at(time: u64) -> SessionOptions {
    SessionOptions {
        seed: Some(42),
        starting_time: time,
        autosave_on_travel: false,
        ..SessionOptions::default()
    }
}

/// In-memory session over the standard content.
pub fn session(purse: Purse) -> GameSession {
    session_with(Content::standard(), purse, options_at(0))
}

pub fn session_with(content: Content, purse: Purse, options: SessionOptions) -> GameSession {
    GameSession::new(
        content,
        Box::new(purse),
        Box::new(MemorySaveStore::new()),
        options,
    )
    .expect("session")
}

/// Session backed by a sled store in `dir`. Drop it before reopening the same directory.
pub fn sled_session(dir: &TempDir, purse: Purse) -> GameSession {
    let store = SledSaveStore::open(dir.path()).expect("open sled store");
    GameSession::new(
        Content::standard(),
        Box::new(purse),
        Box::new(store),
        options_at(0),
    )
    .expect("session")
}

/// Record every delivered event.
pub fn record(session: &mut GameSession) -> Rc<RefCell<Vec<GameEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    session.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

pub fn count_kind(events: &Rc<RefCell<Vec<GameEvent>>>, kind: &str) -> usize {
    events.borrow().iter().filter(|e| e.kind() == kind).count()
}
