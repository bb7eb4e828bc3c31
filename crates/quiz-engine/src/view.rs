//! Read-only projections the front end renders from

use serde::Serialize;

use crate::engine::MatchEngine;
use crate::question::Phase;
use crate::state::{MatchState, PlayerKey, Stage};

/// One cell of the category board
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardTile {
    pub question_id: String,
    pub points: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    pub selectable: bool,
}

/// Unused questions of one category
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub category: String,
    pub tiles: Vec<BoardTile>,
}

/// Every unused question grouped by category, in pool order
pub fn board(engine: &MatchEngine, state: &MatchState) -> Vec<BoardColumn> {
    engine
        .pool()
        .categories()
        .into_iter()
        .filter_map(|category| {
            let tiles: Vec<BoardTile> = engine
                .pool()
                .iter()
                .filter(|q| q.category == category && !state.is_used(&q.id))
                .map(|q| BoardTile {
                    question_id: q.id.clone(),
                    points: q.points,
                    phase: q.phase,
                    selectable: engine.is_selectable(state, &q.id),
                })
                .collect();
            (!tiles.is_empty()).then(|| BoardColumn {
                category: category.to_string(),
                tiles,
            })
        })
        .collect()
}

/// Whether the canonical answer may be displayed.
///
/// Hidden until the turn owner has answered, and hidden from the opponent
/// while they are deciding on or playing a steal.
pub fn answer_revealed(state: &MatchState) -> bool {
    match (state.stage, &state.current) {
        (Stage::Answer, Some(scratch)) => !scratch.steal_decision_pending(),
        _ => false,
    }
}

/// Final or running standing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "player")]
pub enum Standing {
    Leader(PlayerKey),
    Tied,
}

pub fn standings(state: &MatchState) -> Standing {
    let (p1, p2) = (state.players.p1.score, state.players.p2.score);
    match p1.cmp(&p2) {
        std::cmp::Ordering::Greater => Standing::Leader(PlayerKey::P1),
        std::cmp::Ordering::Less => Standing::Leader(PlayerKey::P2),
        std::cmp::Ordering::Equal => Standing::Tied,
    }
}
