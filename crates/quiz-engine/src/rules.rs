//! Scoring rules

use serde::{Deserialize, Serialize};

/// Point values the engine applies when resolving answers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    /// Multiplier for a correct answer with ×2 armed
    pub double_multiplier: f64,
    /// Flat award for a correct answer after 50/50 or hint
    pub helped_award: u32,
    /// Added to the stealer's score on a correct steal
    pub steal_reward: u32,
    /// Taken from the stealer's score on a wrong or passed steal
    pub steal_penalty: u32,
    /// Names used when a player leaves theirs blank
    pub default_names: [String; 2],
}

impl Rules {
    /// The house rules: double for ×2, one point after a help, ±1 on steals
    pub fn standard() -> Self {
        Self {
            double_multiplier: 2.0,
            helped_award: 1,
            steal_reward: 1,
            steal_penalty: 1,
            default_names: ["Player 1".to_string(), "Player 2".to_string()],
        }
    }

    /// Points for a correct own-turn answer
    pub fn own_turn_award(&self, points: u32, doubled: bool, helped: bool) -> u32 {
        if helped {
            return self.helped_award;
        }
        let raw = if doubled {
            f64::from(points) * self.double_multiplier
        } else {
            f64::from(points)
        };
        round_award(raw)
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Round to the nearest integer, never below zero
fn round_award(raw: f64) -> u32 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    // `as` saturates at u32::MAX
    raw.round() as u32
}

/// Apply a signed change to a score, flooring at zero
pub fn apply_delta(score: u32, delta: i64) -> u32 {
    let next = i64::from(score).saturating_add(delta);
    u32::try_from(next.max(0)).unwrap_or(u32::MAX)
}
