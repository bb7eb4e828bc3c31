//! Error types for the match engine

use thiserror::Error;

use crate::state::Stage;

/// Why a command was not applied.
///
/// The reducer swallows these and returns the state unchanged; they exist so
/// callers and tests can see which guard failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("command not valid in stage {0:?}")]
    WrongStage(Stage),

    #[error("unknown question {0}")]
    UnknownQuestion(String),

    #[error("question {0} was already played")]
    QuestionUsed(String),

    #[error("question {0} is locked until earlier phases are exhausted")]
    QuestionLocked(String),

    #[error("no turn in progress")]
    NoTurn,

    #[error("player has no {0} help left")]
    HelpSpent(&'static str),

    #[error("a help was already used on this question")]
    HelpAlreadyUsed,

    #[error("question defines no 50/50 pair")]
    NoFiftyPair,

    #[error("question defines no hint")]
    NoHint,

    #[error("a validation result is still pending")]
    ValidationPending,

    #[error("validation result does not match the pending attempt")]
    StaleValidation,

    #[error("no steal was offered")]
    StealNotOffered,

    #[error("steal decision was already made")]
    StealDecided,

    #[error("the opponent must accept or decline the steal first")]
    StealDecisionPending,
}

/// Errors building a question pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("duplicate question id {0}")]
    DuplicateId(String),

    #[error("question {0} has zero points")]
    ZeroPoints(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors writing match state to storage
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage write failed: {0}")]
    Storage(String),
}
