//! Turn state machine
//!
//! Every command is a transition `(state, command) -> state`. A command whose
//! guard fails leaves the state exactly as it was.

use serde::{Deserialize, Serialize};

use crate::answer::{check_numeric, AnswerValidator, AnswerValue};
use crate::error::Rejected;
use crate::question::{AnswerMode, Phase, Question, QuestionPool};
use crate::rules::{apply_delta, Rules};
use crate::state::{
    Attempt, MatchState, Player, PlayerKey, Stage, StealRecord, TurnRecord, TurnScratch,
    ValidationTicket,
};

/// A request from the front end
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default)]
        p1: String,
        #[serde(default)]
        p2: String,
        #[serde(default)]
        p1_avatar: Option<String>,
        #[serde(default)]
        p2_avatar: Option<String>,
    },
    SelectQuestion { id: String },
    Reveal,
    RevealDouble,
    UseFifty,
    UseHint,
    Submit { answer: AnswerValue },
    ResolveValidation { ticket: ValidationTicket, correct: bool },
    Pass,
    Continue,
    AcceptSteal,
    DeclineSteal,
    Reset,
}

/// An answer the caller must validate before the turn can continue
#[derive(Clone, Debug, PartialEq)]
pub struct PendingValidation {
    pub ticket: ValidationTicket,
    pub question: Question,
    pub answer: AnswerValue,
}

/// Result of an accepted command
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    Done,
    AwaitingValidation(PendingValidation),
}

/// Drives a match over a fixed question pool
#[derive(Clone, Debug)]
pub struct MatchEngine {
    pool: QuestionPool,
    rules: Rules,
}

impl MatchEngine {
    pub fn new(pool: QuestionPool, rules: Rules) -> Self {
        Self { pool, rules }
    }

    pub fn pool(&self) -> &QuestionPool {
        &self.pool
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Apply a command, returning the next state.
    ///
    /// Rejected commands return an unchanged copy of `state`.
    pub fn apply(&self, state: &MatchState, command: Command) -> MatchState {
        let mut next = state.clone();
        if let Err(reason) = self.try_apply(&mut next, command) {
            tracing::debug!("command ignored: {}", reason);
        }
        next
    }

    /// Apply a command in place, reporting why it was refused.
    ///
    /// On `Err` the state is untouched.
    pub fn try_apply(&self, state: &mut MatchState, command: Command) -> Result<Applied, Rejected> {
        let mut next = state.clone();
        let applied = self.step(&mut next, command)?;
        *state = next;
        Ok(applied)
    }

    /// Submit an answer and, if it needs the external validator, resolve it immediately
    pub fn submit_with<V: AnswerValidator + ?Sized>(
        &self,
        state: &MatchState,
        answer: AnswerValue,
        validator: &V,
    ) -> MatchState {
        let mut next = state.clone();
        match self.try_apply(&mut next, Command::Submit { answer }) {
            Ok(Applied::Done) => next,
            Ok(Applied::AwaitingValidation(pending)) => {
                let correct = validator.validate(&pending.question, &pending.answer);
                self.apply(
                    &next,
                    Command::ResolveValidation {
                        ticket: pending.ticket,
                        correct,
                    },
                )
            }
            Err(reason) => {
                tracing::debug!("submission ignored: {}", reason);
                next
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Lowest phase that still has an unused question; C once A and B are exhausted
    pub fn unlocked_phase(&self, state: &MatchState) -> Phase {
        Phase::ALL
            .into_iter()
            .find(|phase| {
                self.pool
                    .iter()
                    .any(|q| q.phase == Some(*phase) && !state.is_used(&q.id))
            })
            .unwrap_or(Phase::C)
    }

    pub fn is_selectable(&self, state: &MatchState, question_id: &str) -> bool {
        self.check_selectable(state, question_id).is_ok()
    }

    /// Number of questions not yet played
    pub fn remaining(&self, state: &MatchState) -> usize {
        self.pool.iter().filter(|q| !state.is_used(&q.id)).count()
    }

    /// The question of the turn in progress
    pub fn current_question(&self, state: &MatchState) -> Option<&Question> {
        let scratch = state.current.as_ref()?;
        self.pool.get(&scratch.selected_question_id)
    }

    /// Whether a restored state can continue under this engine's pool
    pub fn is_playable(&self, state: &MatchState) -> bool {
        state.is_consistent()
            && state
                .current
                .as_ref()
                .map_or(true, |scratch| self.pool.get(&scratch.selected_question_id).is_some())
    }

    /// Adopt a state loaded from storage.
    ///
    /// A validation that was in flight when the state was saved is dropped so
    /// the player can answer again. A state this pool cannot continue is
    /// replaced by a fresh match.
    pub fn restore(&self, mut state: MatchState) -> MatchState {
        if !self.is_playable(&state) {
            tracing::warn!("stored match does not fit the question pool, starting fresh");
            return MatchState::initial();
        }
        if state.drop_pending_validation() {
            tracing::warn!("validation in flight at save time was dropped");
        }
        state
    }

    fn check_selectable<'a>(&'a self, state: &MatchState, question_id: &str) -> Result<&'a Question, Rejected> {
        let question = self
            .pool
            .get(question_id)
            .ok_or_else(|| Rejected::UnknownQuestion(question_id.to_string()))?;
        if state.is_used(question_id) {
            return Err(Rejected::QuestionUsed(question_id.to_string()));
        }
        match question.phase {
            Some(phase) if phase != self.unlocked_phase(state) => {
                Err(Rejected::QuestionLocked(question_id.to_string()))
            }
            _ => Ok(question),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    fn step(&self, state: &mut MatchState, command: Command) -> Result<Applied, Rejected> {
        match command {
            Command::Start { p1, p2, p1_avatar, p2_avatar } => {
                self.start(state, [p1, p2], [p1_avatar, p2_avatar])?
            }
            Command::SelectQuestion { id } => self.select_question(state, &id)?,
            Command::Reveal => self.reveal(state, false)?,
            Command::RevealDouble => self.reveal(state, true)?,
            Command::UseFifty => self.use_fifty(state)?,
            Command::UseHint => self.use_hint(state)?,
            Command::Submit { answer } => return self.submit(state, answer),
            Command::ResolveValidation { ticket, correct } => {
                self.resolve_validation(state, &ticket, correct)?
            }
            Command::Pass => self.pass(state)?,
            Command::Continue => self.continue_turn(state)?,
            Command::AcceptSteal => self.accept_steal(state)?,
            Command::DeclineSteal => self.decline_steal(state)?,
            Command::Reset => *state = state.reset(),
        }
        Ok(Applied::Done)
    }

    fn start(
        &self,
        state: &mut MatchState,
        names: [String; 2],
        avatars: [Option<String>; 2],
    ) -> Result<(), Rejected> {
        expect_stage(state, &[Stage::Setup])?;
        let [n1, n2] = names;
        let [a1, a2] = avatars;
        for (key, name, avatar, fallback) in [
            (PlayerKey::P1, n1, a1, &self.rules.default_names[0]),
            (PlayerKey::P2, n2, a2, &self.rules.default_names[1]),
        ] {
            let name = name.trim();
            let mut player = Player::fresh(if name.is_empty() { fallback.as_str() } else { name });
            player.avatar = avatar;
            state.players[key] = player;
        }
        state.stage = if self.remaining(state) > 0 {
            Stage::Category
        } else {
            Stage::Results
        };
        Ok(())
    }

    fn select_question(&self, state: &mut MatchState, question_id: &str) -> Result<(), Rejected> {
        expect_stage(state, &[Stage::Category])?;
        let question = self.check_selectable(state, question_id)?;
        state.current = Some(TurnScratch::new(question.id.clone()));
        state.stage = Stage::Ready;
        Ok(())
    }

    fn reveal(&self, state: &mut MatchState, double: bool) -> Result<(), Rejected> {
        expect_stage(state, &[Stage::Ready])?;
        let active = state.active;
        let scratch = state.current.as_mut().ok_or(Rejected::NoTurn)?;
        if double {
            if !state.players[active].has_x2 {
                return Err(Rejected::HelpSpent("x2"));
            }
            if scratch.used_help_this_question {
                return Err(Rejected::HelpAlreadyUsed);
            }
            state.players[active].has_x2 = false;
            scratch.used_help_this_question = true;
        }
        scratch.x2_this_turn = double;
        state.stage = Stage::Question;
        Ok(())
    }

    /// Shared guard for 50/50 and hint: owner's attempt, nothing spent, nothing in flight
    fn help_scratch<'s>(&self, state: &'s mut MatchState) -> Result<&'s mut TurnScratch, Rejected> {
        expect_stage(state, &[Stage::Question])?;
        let scratch = state.current.as_mut().ok_or(Rejected::NoTurn)?;
        if scratch.pending.is_some() {
            return Err(Rejected::ValidationPending);
        }
        if scratch.used_help_this_question || scratch.x2_this_turn {
            return Err(Rejected::HelpAlreadyUsed);
        }
        Ok(scratch)
    }

    fn use_fifty(&self, state: &mut MatchState) -> Result<(), Rejected> {
        let active = state.active;
        if !state.players[active].has_fifty {
            return Err(Rejected::HelpSpent("50/50"));
        }
        let pair = self
            .current_question(state)
            .ok_or(Rejected::NoTurn)?
            .fifty_pair()
            .ok_or(Rejected::NoFiftyPair)?;
        let scratch = self.help_scratch(state)?;
        scratch.fifty_options = Some(pair);
        scratch.used_help_this_question = true;
        state.players[active].has_fifty = false;
        Ok(())
    }

    fn use_hint(&self, state: &mut MatchState) -> Result<(), Rejected> {
        let active = state.active;
        if !state.players[active].has_hint {
            return Err(Rejected::HelpSpent("hint"));
        }
        self.current_question(state)
            .ok_or(Rejected::NoTurn)?
            .hint_text()
            .ok_or(Rejected::NoHint)?;
        let scratch = self.help_scratch(state)?;
        scratch.hint_shown = true;
        scratch.used_help_this_question = true;
        state.players[active].has_hint = false;
        Ok(())
    }

    /// Scratch and attempt kind for a submission or pass
    fn answering<'s>(&self, state: &'s mut MatchState) -> Result<(Attempt, &'s mut TurnScratch), Rejected> {
        let attempt = match state.stage {
            Stage::Question => Attempt::Own,
            Stage::StealTurn => Attempt::Steal,
            other => return Err(Rejected::WrongStage(other)),
        };
        let scratch = state.current.as_mut().ok_or(Rejected::NoTurn)?;
        if scratch.pending.is_some() {
            return Err(Rejected::ValidationPending);
        }
        Ok((attempt, scratch))
    }

    fn submit(&self, state: &mut MatchState, answer: AnswerValue) -> Result<Applied, Rejected> {
        let question = self.current_question(state).ok_or(Rejected::NoTurn)?.clone();
        let (epoch, turn) = (state.epoch, state.turn_index);
        let (attempt, scratch) = self.answering(state)?;
        scratch.submitted = Some(answer.clone());

        if question.answer_mode == AnswerMode::Numeric {
            let correct = check_numeric(&question, &answer.raw());
            self.resolve(state, attempt, correct, false)?;
            return Ok(Applied::Done);
        }

        let ticket = ValidationTicket {
            epoch,
            turn,
            question_id: question.id.clone(),
            attempt,
        };
        scratch.pending = Some(ticket.clone());
        Ok(Applied::AwaitingValidation(PendingValidation {
            ticket,
            question,
            answer,
        }))
    }

    fn resolve_validation(
        &self,
        state: &mut MatchState,
        ticket: &ValidationTicket,
        correct: bool,
    ) -> Result<(), Rejected> {
        let scratch = state.current.as_mut().ok_or(Rejected::StaleValidation)?;
        if scratch.pending.as_ref() != Some(ticket) {
            return Err(Rejected::StaleValidation);
        }
        scratch.pending = None;
        self.resolve(state, ticket.attempt, correct, false)
    }

    fn pass(&self, state: &mut MatchState) -> Result<(), Rejected> {
        let (attempt, scratch) = self.answering(state)?;
        scratch.submitted = None;
        self.resolve(state, attempt, false, true)
    }

    fn resolve(&self, state: &mut MatchState, attempt: Attempt, correct: bool, passed: bool) -> Result<(), Rejected> {
        match attempt {
            Attempt::Own => self.resolve_own_turn(state, correct, passed),
            Attempt::Steal => self.resolve_steal(state, correct),
        }
    }

    fn resolve_own_turn(&self, state: &mut MatchState, correct: bool, passed: bool) -> Result<(), Rejected> {
        let points = self.current_question(state).ok_or(Rejected::NoTurn)?.points;
        let active = state.active;
        let scratch = state.current.as_mut().ok_or(Rejected::NoTurn)?;
        scratch.own_turn_correct = Some(correct);
        scratch.passed = passed;

        if correct {
            let helped = scratch.used_help_this_question && !scratch.x2_this_turn;
            let award = self.rules.own_turn_award(points, scratch.x2_this_turn, helped);
            scratch.awarded = award;
            scratch.steal_offered = false;
            let player = &mut state.players[active];
            player.score = apply_delta(player.score, i64::from(award));
            player.streak += 1;
        } else {
            scratch.awarded = 0;
            scratch.hint_shown = false;
            scratch.steal_offered = true;
        }
        state.stage = Stage::Answer;
        Ok(())
    }

    fn resolve_steal(&self, state: &mut MatchState, correct: bool) -> Result<(), Rejected> {
        let scratch = state.current.as_ref().ok_or(Rejected::NoTurn)?;
        let stealer = scratch.steal_by.unwrap_or_else(|| state.active.other());
        let delta = if correct {
            i64::from(self.rules.steal_reward)
        } else {
            -i64::from(self.rules.steal_penalty)
        };
        let player = &mut state.players[stealer];
        player.score = apply_delta(player.score, delta);
        self.finish_turn(
            state,
            Some(StealRecord {
                by: stealer,
                correct,
                delta,
            }),
        )
    }

    fn continue_turn(&self, state: &mut MatchState) -> Result<(), Rejected> {
        expect_stage(state, &[Stage::Answer])?;
        let scratch = state.current.as_ref().ok_or(Rejected::NoTurn)?;
        if scratch.steal_decision_pending() {
            return Err(Rejected::StealDecisionPending);
        }
        self.finish_turn(state, None)
    }

    fn steal_offer(state: &mut MatchState) -> Result<&mut TurnScratch, Rejected> {
        expect_stage(state, &[Stage::Answer])?;
        let scratch = state.current.as_mut().ok_or(Rejected::NoTurn)?;
        if !scratch.steal_offered {
            return Err(Rejected::StealNotOffered);
        }
        if scratch.steal_accepted {
            return Err(Rejected::StealDecided);
        }
        Ok(scratch)
    }

    fn accept_steal(&self, state: &mut MatchState) -> Result<(), Rejected> {
        let stealer = state.active.other();
        let scratch = Self::steal_offer(state)?;
        scratch.steal_accepted = true;
        scratch.steal_by = Some(stealer);
        state.stage = Stage::StealTurn;
        Ok(())
    }

    fn decline_steal(&self, state: &mut MatchState) -> Result<(), Rejected> {
        Self::steal_offer(state)?;
        self.finish_turn(state, None)
    }

    /// Close the turn: streak bookkeeping, mark the question used, hand over the turn
    fn finish_turn(&self, state: &mut MatchState, steal: Option<StealRecord>) -> Result<(), Rejected> {
        let scratch = state.current.take().ok_or(Rejected::NoTurn)?;
        let active = state.active;
        let correct = scratch.own_turn_correct == Some(true);

        if !correct {
            state.players[active].streak = 0;
        }
        state
            .used_question_ids
            .insert(scratch.selected_question_id.clone());
        state.turns_taken[active] += 1;
        let turn = state.turn_index;
        state.last_turn = Some(TurnRecord {
            turn,
            player: active,
            question_id: scratch.selected_question_id,
            correct,
            passed: scratch.passed,
            awarded: scratch.awarded,
            steal,
        });
        state.turn_index += 1;
        state.active = active.other();

        tracing::info!(
            "turn {} finished: {:?} correct={} score {}-{}",
            turn,
            active,
            correct,
            state.players.p1.score,
            state.players.p2.score
        );

        state.stage = if self.remaining(state) > 0 {
            Stage::Category
        } else {
            tracing::info!("match finished after {} turns", state.turn_index);
            Stage::Results
        };
        Ok(())
    }
}

fn expect_stage(state: &MatchState, allowed: &[Stage]) -> Result<(), Rejected> {
    if allowed.contains(&state.stage) {
        Ok(())
    } else {
        Err(Rejected::WrongStage(state.stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::StrictValidator;
    use crate::question::fixtures::{numeric, question};
    use serde_json::json;

    fn engine(questions: Vec<Question>) -> MatchEngine {
        MatchEngine::new(QuestionPool::new(questions).unwrap(), Rules::standard())
    }

    fn started(engine: &MatchEngine) -> MatchState {
        engine.apply(
            &MatchState::initial(),
            Command::Start {
                p1: "Ana".into(),
                p2: "Ben".into(),
                p1_avatar: None,
                p2_avatar: None,
            },
        )
    }

    fn select(engine: &MatchEngine, state: &MatchState, id: &str) -> MatchState {
        engine.apply(state, Command::SelectQuestion { id: id.into() })
    }

    fn right() -> AnswerValue {
        AnswerValue::Text("right".into())
    }

    fn wrong() -> AnswerValue {
        AnswerValue::Text("wrong".into())
    }

    fn two_questions() -> MatchEngine {
        engine(vec![
            question("q4", "Cups", 4, None),
            question("q6", "Clubs", 6, None),
        ])
    }

    #[test]
    fn test_start_defaults_blank_names() {
        let engine = two_questions();
        let state = engine.apply(
            &MatchState::initial(),
            Command::Start {
                p1: "  ".into(),
                p2: "Ben".into(),
                p1_avatar: Some("owl".into()),
                p2_avatar: None,
            },
        );
        assert_eq!(state.stage, Stage::Category);
        assert_eq!(state.players.p1.name, "Player 1");
        assert_eq!(state.players.p1.avatar.as_deref(), Some("owl"));
        assert_eq!(state.players.p2.name, "Ben");
    }

    #[test]
    fn test_start_with_empty_pool_goes_to_results() {
        let engine = engine(Vec::new());
        assert_eq!(started(&engine).stage, Stage::Results);
    }

    #[test]
    fn test_correct_answer_scores_points() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        assert_eq!(state.stage, Stage::Ready);
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.submit_with(&state, right(), &StrictValidator);

        assert_eq!(state.stage, Stage::Answer);
        assert_eq!(state.players.p1.score, 4);
        assert_eq!(state.players.p1.streak, 1);
        assert!(!state.current.as_ref().unwrap().steal_offered);

        let state = engine.apply(&state, Command::Continue);
        assert_eq!(state.stage, Stage::Category);
        assert!(state.is_used("q4"));
        assert_eq!(state.active, PlayerKey::P2);
        assert!(state.current.is_none());
        assert_eq!(state.turns_taken.p1, 1);
        assert_eq!(state.turn_index, 1);
        let record = state.last_turn.unwrap();
        assert_eq!(record.awarded, 4);
        assert!(record.correct);
    }

    #[test]
    fn test_double_doubles_and_is_consumed() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let state = engine.apply(&state, Command::RevealDouble);
        assert!(!state.players.p1.has_x2);
        let state = engine.submit_with(&state, right(), &StrictValidator);
        assert_eq!(state.players.p1.score, 8);

        // p2's turn, then p1 again cannot arm x2
        let state = engine.apply(&state, Command::Continue);
        let state = select(&engine, &state, "q6");
        let mut state = engine.apply(&state, Command::Reveal);
        assert!(!state.players.p1.has_x2);
        state.active = PlayerKey::P1;
        state.stage = Stage::Ready;
        assert_eq!(
            engine.try_apply(&mut state.clone(), Command::RevealDouble),
            Err(Rejected::HelpSpent("x2"))
        );
    }

    #[test]
    fn test_hint_caps_award_at_one() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q6");
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.apply(&state, Command::UseHint);
        assert!(state.current.as_ref().unwrap().hint_shown);
        assert!(!state.players.p1.has_hint);
        let state = engine.submit_with(&state, right(), &StrictValidator);
        assert_eq!(state.players.p1.score, 1);
    }

    #[test]
    fn test_fifty_reveals_pair() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q6");
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.apply(&state, Command::UseFifty);
        let scratch = state.current.as_ref().unwrap();
        assert_eq!(
            scratch.fifty_options,
            Some(["right".to_string(), "wrong".to_string()])
        );
        assert!(!state.players.p1.has_fifty);
    }

    #[test]
    fn test_one_help_per_question() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q6");
        let mut armed = engine.apply(&state, Command::RevealDouble);
        assert_eq!(
            engine.try_apply(&mut armed, Command::UseHint),
            Err(Rejected::HelpAlreadyUsed)
        );
        assert_eq!(
            engine.try_apply(&mut armed, Command::UseFifty),
            Err(Rejected::HelpAlreadyUsed)
        );

        let mut hinted = engine.apply(&engine.apply(&state, Command::Reveal), Command::UseHint);
        let before = hinted.clone();
        assert_eq!(
            engine.try_apply(&mut hinted, Command::UseFifty),
            Err(Rejected::HelpAlreadyUsed)
        );
        assert_eq!(hinted, before);
        assert!(hinted.players.p1.has_fifty);
    }

    #[test]
    fn test_help_requires_question_data() {
        let mut q = question("bare", "Cups", 3, None);
        q.hint = None;
        q.fifty = Some(vec!["only".into()]);
        let engine = engine(vec![q]);
        let state = select(&engine, &started(&engine), "bare");
        let mut state = engine.apply(&state, Command::Reveal);
        assert_eq!(engine.try_apply(&mut state, Command::UseHint), Err(Rejected::NoHint));
        assert_eq!(engine.try_apply(&mut state, Command::UseFifty), Err(Rejected::NoFiftyPair));
        assert!(state.players.p1.has_hint && state.players.p1.has_fifty);
    }

    #[test]
    fn test_wrong_answer_offers_steal_and_steal_scores() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.submit_with(&state, wrong(), &StrictValidator);
        assert_eq!(state.stage, Stage::Answer);
        assert!(state.current.as_ref().unwrap().steal_offered);
        assert_eq!(state.players.p1.score, 0);

        let mut blocked = state.clone();
        assert_eq!(
            engine.try_apply(&mut blocked, Command::Continue),
            Err(Rejected::StealDecisionPending)
        );

        let state = engine.apply(&state, Command::AcceptSteal);
        assert_eq!(state.stage, Stage::StealTurn);
        assert_eq!(state.current.as_ref().unwrap().steal_by, Some(PlayerKey::P2));

        let state = engine.submit_with(&state, right(), &StrictValidator);
        assert_eq!(state.players.p2.score, 1);
        assert_eq!(state.stage, Stage::Category);
        // turn passes from the original owner, so p2 is up next
        assert_eq!(state.active, PlayerKey::P2);
        assert!(state.is_used("q4"));
        let steal = state.last_turn.unwrap().steal.unwrap();
        assert_eq!(steal.by, PlayerKey::P2);
        assert_eq!(steal.delta, 1);
    }

    #[test]
    fn test_failed_steal_costs_a_point_but_never_below_zero() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.apply(&state, Command::Pass);
        assert!(state.current.as_ref().unwrap().passed);
        let state = engine.apply(&state, Command::AcceptSteal);
        let state = engine.apply(&state, Command::Pass);
        assert_eq!(state.players.p2.score, 0);
        assert_eq!(state.last_turn.unwrap().steal.unwrap().delta, -1);
    }

    #[test]
    fn test_decline_steal_finishes_turn() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.submit_with(&state, wrong(), &StrictValidator);
        let state = engine.apply(&state, Command::DeclineSteal);
        assert_eq!(state.stage, Stage::Category);
        assert_eq!(state.players.p2.score, 0);
        assert_eq!(state.active, PlayerKey::P2);
    }

    #[test]
    fn test_no_helps_during_steal() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let state = engine.apply(&state, Command::Reveal);
        let state = engine.apply(&state, Command::Pass);
        let mut state = engine.apply(&state, Command::AcceptSteal);
        assert_eq!(
            engine.try_apply(&mut state, Command::UseHint),
            Err(Rejected::WrongStage(Stage::StealTurn))
        );
        assert!(state.players.p2.has_hint);
    }

    #[test]
    fn test_streak_resets_only_at_turn_finish() {
        let engine = engine(vec![
            question("a", "Cups", 2, None),
            question("b", "Cups", 2, None),
            question("c", "Cups", 2, None),
            question("d", "Cups", 2, None),
        ]);
        let mut state = started(&engine);
        for id in ["a", "b"] {
            state = select(&engine, &state, id);
            state = engine.apply(&state, Command::Reveal);
            state = engine.submit_with(&state, right(), &StrictValidator);
            state = engine.apply(&state, Command::Continue);
        }
        assert_eq!(state.players.p1.streak, 1);
        assert_eq!(state.players.p2.streak, 1);

        state = select(&engine, &state, "c");
        state = engine.apply(&state, Command::Reveal);
        state = engine.submit_with(&state, wrong(), &StrictValidator);
        assert_eq!(state.players.p1.streak, 1);
        state = engine.apply(&state, Command::DeclineSteal);
        assert_eq!(state.players.p1.streak, 0);
        assert_eq!(state.players.p2.streak, 1);
    }

    #[test]
    fn test_numeric_resolves_without_validator() {
        let engine = engine(vec![numeric("n", 5, json!(1966))]);
        let state = select(&engine, &started(&engine), "n");
        let mut state = engine.apply(&state, Command::Reveal);
        let applied = engine
            .try_apply(
                &mut state,
                Command::Submit {
                    answer: AnswerValue::Numeric(json!({ "value": "1966" })),
                },
            )
            .unwrap();
        assert_eq!(applied, Applied::Done);
        assert_eq!(state.players.p1.score, 5);
    }

    #[test]
    fn test_async_validation_flow() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let mut state = engine.apply(&state, Command::Reveal);
        let Applied::AwaitingValidation(pending) = engine
            .try_apply(&mut state, Command::Submit { answer: right() })
            .unwrap()
        else {
            panic!("text answers need the validator");
        };
        assert_eq!(pending.ticket.attempt, Attempt::Own);
        assert_eq!(state.stage, Stage::Question);

        // no second submission, pass, or help while in flight
        for cmd in [Command::Submit { answer: wrong() }, Command::Pass, Command::UseHint] {
            assert_eq!(
                engine.try_apply(&mut state, cmd),
                Err(Rejected::ValidationPending)
            );
        }

        let state = engine.apply(
            &state,
            Command::ResolveValidation {
                ticket: pending.ticket.clone(),
                correct: true,
            },
        );
        assert_eq!(state.players.p1.score, 4);

        // replaying the same result is stale
        let mut replay = state.clone();
        assert_eq!(
            engine.try_apply(
                &mut replay,
                Command::ResolveValidation {
                    ticket: pending.ticket,
                    correct: true,
                },
            ),
            Err(Rejected::StaleValidation)
        );
        assert_eq!(replay.players.p1.score, 4);
    }

    #[test]
    fn test_late_validation_after_reset_is_discarded() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let mut state = engine.apply(&state, Command::Reveal);
        let Ok(Applied::AwaitingValidation(pending)) =
            engine.try_apply(&mut state, Command::Submit { answer: right() })
        else {
            panic!("expected pending validation");
        };
        let state = engine.apply(&state, Command::Reset);
        let after = engine.apply(
            &state,
            Command::ResolveValidation {
                ticket: pending.ticket,
                correct: true,
            },
        );
        assert_eq!(after, state);
        assert_eq!(after.stage, Stage::Setup);
    }

    #[test]
    fn test_old_match_ticket_ignored_on_replayed_question() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let mut state = engine.apply(&state, Command::Reveal);
        let Ok(Applied::AwaitingValidation(old)) =
            engine.try_apply(&mut state, Command::Submit { answer: right() })
        else {
            panic!("expected pending validation");
        };

        // same turn, same question, same attempt in the next match
        let state = engine.apply(&state, Command::Reset);
        let state = engine.apply(
            &state,
            Command::Start {
                p1: "Ana".into(),
                p2: "Ben".into(),
                p1_avatar: None,
                p2_avatar: None,
            },
        );
        let state = select(&engine, &state, "q4");
        let mut state = engine.apply(&state, Command::Reveal);
        let Ok(Applied::AwaitingValidation(new)) =
            engine.try_apply(&mut state, Command::Submit { answer: wrong() })
        else {
            panic!("expected pending validation");
        };
        assert_ne!(old.ticket, new.ticket);

        assert_eq!(
            engine.try_apply(
                &mut state,
                Command::ResolveValidation {
                    ticket: old.ticket,
                    correct: true,
                },
            ),
            Err(Rejected::StaleValidation)
        );
        assert_eq!(state.players.p1.score, 0);
        assert_eq!(state.stage, Stage::Question);

        let state = engine.apply(
            &state,
            Command::ResolveValidation {
                ticket: new.ticket,
                correct: false,
            },
        );
        assert_eq!(state.stage, Stage::Answer);
        assert_eq!(state.players.p1.score, 0);
    }

    #[test]
    fn test_phase_gating() {
        let engine = engine(vec![
            question("a1", "Cups", 2, Some(Phase::A)),
            question("b1", "Cups", 4, Some(Phase::B)),
            question("c1", "Cups", 6, Some(Phase::C)),
            question("free", "Clubs", 3, None),
        ]);
        let state = started(&engine);
        assert_eq!(engine.unlocked_phase(&state), Phase::A);
        assert!(engine.is_selectable(&state, "a1"));
        assert!(engine.is_selectable(&state, "free"));
        assert!(!engine.is_selectable(&state, "b1"));
        assert!(!engine.is_selectable(&state, "c1"));

        let locked = select(&engine, &state, "b1");
        assert_eq!(locked, state);

        let mut state = select(&engine, &state, "a1");
        state = engine.apply(&state, Command::Reveal);
        state = engine.apply(&state, Command::Pass);
        state = engine.apply(&state, Command::DeclineSteal);
        assert_eq!(engine.unlocked_phase(&state), Phase::B);
        assert!(engine.is_selectable(&state, "b1"));
        assert!(!engine.is_selectable(&state, "c1"));
        assert!(!engine.is_selectable(&state, "a1"));
    }

    #[test]
    fn test_unlocked_phase_defaults_to_c() {
        let engine = engine(vec![question("free", "Clubs", 3, None)]);
        assert_eq!(engine.unlocked_phase(&started(&engine)), Phase::C);
    }

    #[test]
    fn test_used_question_not_selectable() {
        let engine = two_questions();
        let mut state = select(&engine, &started(&engine), "q4");
        state = engine.apply(&state, Command::Reveal);
        state = engine.submit_with(&state, right(), &StrictValidator);
        state = engine.apply(&state, Command::Continue);
        assert_eq!(
            engine.try_apply(&mut state, Command::SelectQuestion { id: "q4".into() }),
            Err(Rejected::QuestionUsed("q4".into()))
        );
        assert_eq!(
            engine.try_apply(&mut state, Command::SelectQuestion { id: "zz".into() }),
            Err(Rejected::UnknownQuestion("zz".into()))
        );
    }

    #[test]
    fn test_exhausting_pool_reaches_results_and_reset_restores() {
        let engine = two_questions();
        let mut state = started(&engine);
        for id in ["q4", "q6"] {
            state = select(&engine, &state, id);
            state = engine.apply(&state, Command::RevealDouble);
            state = engine.submit_with(&state, right(), &StrictValidator);
            state = engine.apply(&state, Command::Continue);
        }
        assert_eq!(state.stage, Stage::Results);
        assert_eq!(state.players.p1.score, 8);
        assert_eq!(state.players.p2.score, 12);

        let mut stuck = state.clone();
        assert_eq!(
            engine.try_apply(&mut stuck, Command::SelectQuestion { id: "q4".into() }),
            Err(Rejected::WrongStage(Stage::Results))
        );

        let state = engine.apply(&state, Command::Reset);
        assert_eq!(state, MatchState { epoch: 1, ..MatchState::initial() });
        assert!(state.players.p1.has_x2 && state.players.p2.has_x2);
    }

    #[test]
    fn test_commands_out_of_stage_are_noops() {
        let engine = two_questions();
        let state = MatchState::initial();
        for cmd in [
            Command::Reveal,
            Command::RevealDouble,
            Command::UseFifty,
            Command::Pass,
            Command::Continue,
            Command::AcceptSteal,
            Command::DeclineSteal,
            Command::SelectQuestion { id: "q4".into() },
        ] {
            assert_eq!(engine.apply(&state, cmd), state);
        }
    }

    #[test]
    fn test_command_wire_format() {
        let cmd: Command =
            serde_json::from_str(r#"{"type":"start","p1":"Ana","p2Avatar":"fox"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Start {
                p1: "Ana".into(),
                p2: String::new(),
                p1_avatar: None,
                p2_avatar: Some("fox".into()),
            }
        );
        let cmd: Command = serde_json::from_str(
            r#"{"type":"submit","answer":{"mode":"text","value":"Pelé"}}"#,
        )
        .unwrap();
        assert_eq!(cmd, Command::Submit { answer: AnswerValue::Text("Pelé".into()) });
        let cmd: Command = serde_json::from_str(r#"{"type":"revealDouble"}"#).unwrap();
        assert_eq!(cmd, Command::RevealDouble);
    }

    #[test]
    fn test_async_steal_attempt() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let mut state = engine.apply(&state, Command::Reveal);
        let Ok(Applied::AwaitingValidation(own)) =
            engine.try_apply(&mut state, Command::Submit { answer: wrong() })
        else {
            panic!("expected pending validation");
        };
        let state = engine.apply(
            &state,
            Command::ResolveValidation {
                ticket: own.ticket.clone(),
                correct: false,
            },
        );
        let mut state = engine.apply(&state, Command::AcceptSteal);
        assert_eq!(state.stage, Stage::StealTurn);

        let Ok(Applied::AwaitingValidation(steal)) =
            engine.try_apply(&mut state, Command::Submit { answer: right() })
        else {
            panic!("expected pending validation");
        };
        assert_eq!(steal.ticket.attempt, Attempt::Steal);
        assert_eq!(steal.ticket.question_id, "q4");

        // the owner's old result cannot settle the steal
        assert_eq!(
            engine.try_apply(
                &mut state,
                Command::ResolveValidation {
                    ticket: own.ticket,
                    correct: true,
                },
            ),
            Err(Rejected::StaleValidation)
        );
        assert_eq!(state.stage, Stage::StealTurn);

        let state = engine.apply(
            &state,
            Command::ResolveValidation {
                ticket: steal.ticket,
                correct: true,
            },
        );
        assert_eq!(state.stage, Stage::Category);
        assert_eq!(state.players.p2.score, 1);
        assert_eq!(state.players.p1.score, 0);
        let steal = state.last_turn.as_ref().and_then(|t| t.steal.clone()).unwrap();
        assert_eq!(steal.by, PlayerKey::P2);
        assert!(steal.correct);
    }

    #[test]
    fn test_restore_drops_validation_in_flight() {
        let engine = two_questions();
        let state = select(&engine, &started(&engine), "q4");
        let mut state = engine.apply(&state, Command::Reveal);
        let Ok(Applied::AwaitingValidation(pending)) =
            engine.try_apply(&mut state, Command::Submit { answer: right() })
        else {
            panic!("expected pending validation");
        };

        let mut state = engine.restore(state);
        assert_eq!(state.stage, Stage::Question);
        assert!(state.current.as_ref().unwrap().pending.is_none());

        // the lost result is stale, a fresh answer goes through
        assert_eq!(
            engine.try_apply(
                &mut state,
                Command::ResolveValidation {
                    ticket: pending.ticket,
                    correct: true,
                },
            ),
            Err(Rejected::StaleValidation)
        );
        let state = engine.apply(&state, Command::UseHint);
        assert!(state.current.as_ref().unwrap().hint_shown);
        let state = engine.submit_with(&state, right(), &StrictValidator);
        assert_eq!(state.stage, Stage::Answer);
        assert_eq!(state.players.p1.score, 1);
    }

    #[test]
    fn test_restore_rejects_stuck_states() {
        let engine = two_questions();

        let mut no_turn = started(&engine);
        no_turn.stage = Stage::Answer;
        assert!(!engine.is_playable(&no_turn));
        assert_eq!(engine.restore(no_turn), MatchState::initial());

        let mut foreign = select(&engine, &started(&engine), "q4");
        foreign.current = Some(TurnScratch::new("not-in-pool"));
        assert!(!engine.is_playable(&foreign));
        assert_eq!(engine.restore(foreign), MatchState::initial());

        let fine = select(&engine, &started(&engine), "q6");
        assert!(engine.is_playable(&fine));
        assert_eq!(engine.restore(fine.clone()), fine);
    }
}
