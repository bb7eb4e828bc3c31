//! WASM bindings for the browser front end

#![cfg(feature = "wasm")]

use wasm_bindgen::prelude::*;

use crate::engine::{Applied, Command, MatchEngine};
use crate::persist::{decode, encode, STORAGE_KEY};
use crate::question::QuestionPool;
use crate::rules::Rules;
use crate::state::MatchState;
use crate::view::{answer_revealed, board, standings};

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Key the host should store `save()` output under
#[wasm_bindgen]
pub fn storage_key() -> String {
    STORAGE_KEY.to_string()
}

/// One match, owned by the page
#[wasm_bindgen]
pub struct QuizMatch {
    engine: MatchEngine,
    state: MatchState,
}

#[wasm_bindgen]
impl QuizMatch {
    /// Create a match from the question dataset and whatever local storage held.
    ///
    /// Saved data that cannot be read, or that names questions missing from
    /// the dataset, starts a fresh match instead of failing. A validation that
    /// was in flight when the page went away is dropped; the player answers again.
    ///
    /// # Arguments
    /// * `questions_json` - JSON array of questions
    /// * `saved` - document previously returned by `save()`, if any
    ///
    /// # Returns
    /// The match controller, or an error if the question dataset is invalid
    #[wasm_bindgen(constructor)]
    pub fn new(questions_json: &str, saved: Option<String>) -> Result<QuizMatch, JsError> {
        let pool = QuestionPool::from_json(questions_json)
            .map_err(|e| JsError::new(&format!("Invalid questions: {}", e)))?;
        let engine = MatchEngine::new(pool, Rules::standard());
        let state = saved
            .as_deref()
            .and_then(decode)
            .map_or_else(MatchState::initial, |state| engine.restore(state));
        Ok(QuizMatch { engine, state })
    }

    /// Current snapshot
    ///
    /// # Returns
    /// JSON serialized MatchState
    pub fn state(&self) -> Result<JsValue, JsError> {
        to_js(&self.state)
    }

    /// Apply a JSON command such as `{"type":"selectQuestion","id":"q7"}`.
    ///
    /// Commands whose preconditions fail are ignored.
    ///
    /// # Arguments
    /// * `command_json` - JSON serialized Command, tagged by `type`
    ///
    /// # Returns
    /// `{pending}` where `pending` is the validation ticket the host must
    /// answer with a `resolveValidation` command, or null
    pub fn dispatch(&mut self, command_json: &str) -> Result<JsValue, JsError> {
        let command: Command = serde_json::from_str(command_json)
            .map_err(|e| JsError::new(&format!("Invalid command: {}", e)))?;
        let pending = match self.engine.try_apply(&mut self.state, command) {
            Ok(Applied::AwaitingValidation(p)) => Some(p.ticket),
            Ok(Applied::Done) => None,
            Err(reason) => {
                tracing::debug!("command ignored: {}", reason);
                None
            }
        };
        to_js(&DispatchResult { pending })
    }

    /// Unused questions grouped by category with their selectable flags
    ///
    /// # Returns
    /// JSON serialized array of BoardColumn
    pub fn board(&self) -> Result<JsValue, JsError> {
        to_js(&board(&self.engine, &self.state))
    }

    /// Category names in board order
    pub fn categories(&self) -> js_sys::Array {
        self.engine
            .pool()
            .categories()
            .into_iter()
            .map(JsValue::from_str)
            .collect()
    }

    /// The question of the turn in progress
    ///
    /// # Returns
    /// JSON serialized Question, or null between turns
    pub fn current_question(&self) -> Result<JsValue, JsError> {
        to_js(&self.engine.current_question(&self.state))
    }

    /// Whether the canonical answer may be shown; false while a steal is open
    pub fn answer_revealed(&self) -> bool {
        answer_revealed(&self.state)
    }

    /// Who is ahead
    ///
    /// # Returns
    /// JSON serialized Standing: `{outcome: "leader", player}` or `{outcome: "tied"}`
    pub fn standings(&self) -> Result<JsValue, JsError> {
        to_js(&standings(&self.state))
    }

    /// JSON document for local storage, to be stored under `storage_key()`
    pub fn save(&self) -> Result<String, JsError> {
        encode(&self.state).map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
    }
}

#[derive(serde::Serialize)]
struct DispatchResult {
    pending: Option<crate::state::ValidationTicket>,
}
