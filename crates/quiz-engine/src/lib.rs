//! Quiz Duel match engine
//!
//! Turn logic for a two-player category trivia duel: question selection with
//! phase unlocking, one-shot helps, scoring, steals and persistence.
//! This crate is compiled to:
//! - Native (tests and embedding)
//! - WASM (for the browser front end)

mod answer;
mod engine;
mod error;
mod persist;
mod question;
mod rules;
mod state;
mod view;

#[cfg(feature = "wasm")]
mod wasm;

pub use answer::{
    accepted_numbers, check_numeric, coerce_number, judge, AnswerValidator, AnswerValue,
    ScoreLine, StrictValidator,
};
pub use engine::{Applied, Command, MatchEngine, PendingValidation};
pub use error::{PersistError, PoolError, Rejected};
pub use persist::{
    decode, encode, load_or_default, save, MatchStorage, MemoryStorage, SCHEMA_VERSION,
    STORAGE_KEY,
};
pub use question::{AnswerMode, Phase, Question, QuestionPool, QuestionProvider};
pub use rules::{apply_delta, Rules};
pub use state::{
    Attempt, MatchState, PerPlayer, Player, PlayerKey, Stage, StealRecord, TurnRecord,
    TurnScratch, ValidationTicket,
};
pub use view::{answer_revealed, board, standings, BoardColumn, BoardTile, Standing};
