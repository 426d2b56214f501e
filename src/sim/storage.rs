use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use log::debug;

use crate::sim::errors::SimError;

pub const SAVE_SLOTS: [&str; 3] = ["slot_1", "slot_2", "slot_3"];
pub const AUTOSAVE_SLOT: &str = "autosave";

const TREE_SAVES: &str = "saves";
const KEY_PREFIX: &str = "saves:";

/// Every slot name the orchestrator accepts, manual slots first.
pub fn all_slots() -> impl Iterator<Item = &'static str> {
    SAVE_SLOTS.iter().copied().chain(std::iter::once(AUTOSAVE_SLOT))
}

/// Key-value boundary for save payloads. Values are opaque bytes.
pub trait SaveStore {
    fn put(&self, slot: &str, bytes: &[u8]) -> Result<(), SimError>;
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, SimError>;
    /// Returns whether anything was removed.
    fn remove(&self, slot: &str) -> Result<bool, SimError>;
    /// Slot names currently holding data.
    fn slots(&self) -> Result<Vec<String>, SimError>;
}

/// Sled-backed store; one key per slot in a dedicated tree.
pub struct SledSaveStore {
    _db: sled::Db,
    saves: sled::Tree,
}

impl SledSaveStore {
    /// Open (or create) the save database rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let saves = db.open_tree(TREE_SAVES)?;
        debug!("save store opened at {}", path_ref.display());
        Ok(Self { _db: db, saves })
    }

    fn key(slot: &str) -> Vec<u8> {
        format!("{}{}", KEY_PREFIX, slot).into_bytes()
    }
}

impl SaveStore for SledSaveStore {
    fn put(&self, slot: &str, bytes: &[u8]) -> Result<(), SimError> {
        self.saves.insert(Self::key(slot), bytes)?;
        self.saves.flush()?;
        Ok(())
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, SimError> {
        Ok(self.saves.get(Self::key(slot))?.map(|bytes| bytes.to_vec()))
    }

    fn remove(&self, slot: &str) -> Result<bool, SimError> {
        let removed = self.saves.remove(Self::key(slot))?.is_some();
        self.saves.flush()?;
        Ok(removed)
    }

    fn slots(&self) -> Result<Vec<String>, SimError> {
        let mut slots = Vec::new();
        for entry in self.saves.scan_prefix(KEY_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = std::str::from_utf8(&key)?;
            if let Some(slot) = text.strip_prefix(KEY_PREFIX) {
                slots.push(slot.to_string());
            }
        }
        Ok(slots)
    }
}

/// In-process store for tests and headless runs that should leave nothing on disk.
#[derive(Default)]
pub struct MemorySaveStore {
    slots: RefCell<BTreeMap<String, Vec<u8>>>,
    failing_writes: bool,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails as if storage were full.
    pub fn with_failing_writes(mut self) -> Self {
        self.failing_writes = true;
        self
    }

    /// Overwrite a slot's raw bytes directly, bypassing validation.
    pub fn insert_raw(&self, slot: &str, bytes: &[u8]) {
        self.slots
            .borrow_mut()
            .insert(slot.to_string(), bytes.to_vec());
    }
}

impl SaveStore for MemorySaveStore {
    fn put(&self, slot: &str, bytes: &[u8]) -> Result<(), SimError> {
        if self.failing_writes {
            return Err(SimError::Io(io::Error::new(
                io::ErrorKind::Other,
                "storage quota exceeded",
            )));
        }
        self.insert_raw(slot, bytes);
        Ok(())
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, SimError> {
        Ok(self.slots.borrow().get(slot).cloned())
    }

    fn remove(&self, slot: &str) -> Result<bool, SimError> {
        Ok(self.slots.borrow_mut().remove(slot).is_some())
    }

    fn slots(&self) -> Result<Vec<String>, SimError> {
        Ok(self.slots.borrow().keys().cloned().collect())
    }
}
