//! Saving and restoring match state
//!
//! The whole [`MatchState`] is stored as one JSON document under a fixed key.
//! Anything unreadable or inconsistent loads as a fresh match. A validation
//! that was in flight at save time is dropped on load, since the call that
//! would have answered it did not survive the reload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::state::MatchState;

/// Key the match is stored under
pub const STORAGE_KEY: &str = "quiz-duel.match";

/// Bumped whenever the stored shape changes incompatibly
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    state: &'a MatchState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    state: MatchState,
}

/// Key-value storage the host provides (browser local storage, a file, memory)
pub trait MatchStorage {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&mut self, key: &str, value: String) -> Result<(), PersistError>;
}

/// In-process storage for tests and native embedding
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStorage for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: String) -> Result<(), PersistError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

pub fn encode(state: &MatchState) -> Result<String, PersistError> {
    Ok(serde_json::to_string(&EnvelopeRef {
        version: SCHEMA_VERSION,
        state,
    })?)
}

/// Decode a stored document; `None` if it is not a consistent current-version match
pub fn decode(raw: &str) -> Option<MatchState> {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) if envelope.version == SCHEMA_VERSION => {
            let mut state = envelope.state;
            if !state.is_consistent() {
                tracing::warn!("stored match is inconsistent at stage {:?}", state.stage);
                return None;
            }
            if state.drop_pending_validation() {
                tracing::warn!("validation in flight at save time was dropped");
            }
            Some(state)
        }
        Ok(envelope) => {
            tracing::warn!(
                "stored match has schema version {}, expected {}",
                envelope.version,
                SCHEMA_VERSION
            );
            None
        }
        Err(e) => {
            tracing::warn!("stored match is unreadable: {}", e);
            None
        }
    }
}

/// Stored match, or a fresh one if nothing usable is stored
pub fn load_or_default<S: MatchStorage + ?Sized>(storage: &S) -> MatchState {
    storage
        .read(STORAGE_KEY)
        .and_then(|raw| decode(&raw))
        .unwrap_or_else(MatchState::initial)
}

pub fn save<S: MatchStorage + ?Sized>(storage: &mut S, state: &MatchState) -> Result<(), PersistError> {
    storage.write(STORAGE_KEY, encode(state)?)
}
