//! Match state: the single serializable value the engine transforms

use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::answer::AnswerValue;

/// Which seat a player occupies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKey {
    P1,
    P2,
}

impl PlayerKey {
    pub fn other(self) -> Self {
        match self {
            PlayerKey::P1 => PlayerKey::P2,
            PlayerKey::P2 => PlayerKey::P1,
        }
    }
}

/// One contestant and their remaining one-shot helps
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub score: u32,
    pub streak: u32,
    pub has_x2: bool,
    pub has_fifty: bool,
    pub has_hint: bool,
}

impl Player {
    /// Zero score, no streak, all three helps available
    pub fn fresh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: None,
            score: 0,
            streak: 0,
            has_x2: true,
            has_fifty: true,
            has_hint: true,
        }
    }
}

/// A value kept per seat
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerPlayer<T> {
    pub p1: T,
    pub p2: T,
}

impl<T> Index<PlayerKey> for PerPlayer<T> {
    type Output = T;

    fn index(&self, key: PlayerKey) -> &T {
        match key {
            PlayerKey::P1 => &self.p1,
            PlayerKey::P2 => &self.p2,
        }
    }
}

impl<T> IndexMut<PlayerKey> for PerPlayer<T> {
    fn index_mut(&mut self, key: PlayerKey) -> &mut T {
        match key {
            PlayerKey::P1 => &mut self.p1,
            PlayerKey::P2 => &mut self.p2,
        }
    }
}

/// Stage of the turn state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    #[default]
    Setup,
    Category,
    Ready,
    Question,
    Answer,
    StealTurn,
    Results,
}

/// Whose attempt a validation result belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attempt {
    Own,
    Steal,
}

/// Identity of an answer waiting on the external validator.
///
/// A result is only applied when its ticket equals the one recorded in the
/// turn scratch. `epoch` ties the ticket to one match, so a reset match that
/// replays the same turn and question still issues a different ticket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationTicket {
    pub epoch: u32,
    pub turn: u32,
    pub question_id: String,
    pub attempt: Attempt,
}

/// Per-turn scratch data; absent between turns
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnScratch {
    pub selected_question_id: String,
    pub x2_this_turn: bool,
    pub used_help_this_question: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fifty_options: Option<[String; 2]>,
    pub hint_shown: bool,
    pub steal_offered: bool,
    pub steal_accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steal_by: Option<PlayerKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<AnswerValue>,
    pub passed: bool,
    /// Points the turn owner earned on this question
    #[serde(default)]
    pub awarded: u32,
    /// Outcome of the turn owner's own attempt, once resolved
    #[serde(default)]
    pub own_turn_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<ValidationTicket>,
}

impl TurnScratch {
    pub fn new(question_id: impl Into<String>) -> Self {
        Self {
            selected_question_id: question_id.into(),
            x2_this_turn: false,
            used_help_this_question: false,
            fifty_options: None,
            hint_shown: false,
            steal_offered: false,
            steal_accepted: false,
            steal_by: None,
            submitted: None,
            passed: false,
            awarded: 0,
            own_turn_correct: None,
            pending: None,
        }
    }

    /// Steal offered and the opponent has not answered the offer yet
    pub fn steal_decision_pending(&self) -> bool {
        self.steal_offered && !self.steal_accepted
    }
}

/// Outcome of a steal attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StealRecord {
    pub by: PlayerKey,
    pub correct: bool,
    pub delta: i64,
}

/// Summary of the most recently finished turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub turn: u32,
    pub player: PlayerKey,
    pub question_id: String,
    pub correct: bool,
    pub passed: bool,
    pub awarded: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steal: Option<StealRecord>,
}

/// Everything that changes during a match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// Bumped on every reset
    #[serde(default)]
    pub epoch: u32,
    pub stage: Stage,
    pub active: PlayerKey,
    pub players: PerPlayer<Player>,
    pub used_question_ids: BTreeSet<String>,
    pub turns_taken: PerPlayer<u32>,
    pub turn_index: u32,
    #[serde(default)]
    pub current: Option<TurnScratch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_turn: Option<TurnRecord>,
}

impl MatchState {
    /// Setup stage, both players zeroed with every help available, nothing played
    pub fn initial() -> Self {
        Self {
            epoch: 0,
            stage: Stage::Setup,
            active: PlayerKey::P1,
            players: PerPlayer {
                p1: Player::fresh(""),
                p2: Player::fresh(""),
            },
            used_question_ids: BTreeSet::new(),
            turns_taken: PerPlayer::default(),
            turn_index: 0,
            current: None,
            last_turn: None,
        }
    }

    pub fn active_player(&self) -> &Player {
        &self.players[self.active]
    }

    pub fn is_used(&self, question_id: &str) -> bool {
        self.used_question_ids.contains(question_id)
    }

    /// Initial state of the next match; tickets of this one go stale
    pub fn reset(&self) -> Self {
        Self {
            epoch: self.epoch.wrapping_add(1),
            ..Self::initial()
        }
    }

    /// Whether the turn scratch agrees with the stage.
    ///
    /// A turn is open exactly in Ready, Question, Answer and StealTurn. An
    /// open turn never sits on a used question, has an own-attempt outcome
    /// from Answer on, and names its stealer in StealTurn.
    pub fn is_consistent(&self) -> bool {
        match (self.stage, &self.current) {
            (Stage::Setup | Stage::Category | Stage::Results, None) => true,
            (Stage::Ready | Stage::Question, Some(scratch)) => {
                !self.is_used(&scratch.selected_question_id) && scratch.own_turn_correct.is_none()
            }
            (Stage::Answer, Some(scratch)) => {
                !self.is_used(&scratch.selected_question_id)
                    && scratch.own_turn_correct.is_some()
                    && scratch.pending.is_none()
            }
            (Stage::StealTurn, Some(scratch)) => {
                !self.is_used(&scratch.selected_question_id)
                    && scratch.steal_accepted
                    && scratch.steal_by.is_some()
            }
            _ => false,
        }
    }

    /// Forget a validation that was in flight; returns whether one was.
    ///
    /// The answer it belonged to is cleared too, so the player answers again.
    pub fn drop_pending_validation(&mut self) -> bool {
        match self.current.as_mut() {
            Some(scratch) if scratch.pending.is_some() => {
                scratch.pending = None;
                scratch.submitted = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::initial()
    }
}
