//! Submitted answers and how they are judged
//!
//! Numeric questions are checked here. Every other mode is handed to an
//! [`AnswerValidator`] supplied by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::question::{AnswerMode, Question};

/// Final score of a match, as entered for score-line questions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub home: u32,
    pub away: u32,
}

impl ScoreLine {
    /// Parse a canonical score-line: `{"home": h, "away": a}` or `"h-a"` / `"h:a"`
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let (h, a) = s.split_once(['-', ':'])?;
                Some(Self {
                    home: h.trim().parse().ok()?,
                    away: a.trim().parse().ok()?,
                })
            }
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// An answer as submitted by a player, tagged by the mode the UI collected it in
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "kebab-case")]
pub enum AnswerValue {
    MultipleChoice(String),
    Catalog(String),
    /// Whatever the numeric input produced: number, string, or `{ value }`
    Numeric(Value),
    Text(String),
    ScoreLine(ScoreLine),
}

impl AnswerValue {
    pub fn mode(&self) -> AnswerMode {
        match self {
            AnswerValue::MultipleChoice(_) => AnswerMode::MultipleChoice,
            AnswerValue::Catalog(_) => AnswerMode::Catalog,
            AnswerValue::Numeric(_) => AnswerMode::Numeric,
            AnswerValue::Text(_) => AnswerMode::Text,
            AnswerValue::ScoreLine(_) => AnswerMode::ScoreLine,
        }
    }

    /// The untyped value, for numeric coercion
    pub fn raw(&self) -> Value {
        match self {
            AnswerValue::MultipleChoice(s) | AnswerValue::Catalog(s) | AnswerValue::Text(s) => {
                Value::String(s.clone())
            }
            AnswerValue::Numeric(v) => v.clone(),
            AnswerValue::ScoreLine(line) => serde_json::json!({ "home": line.home, "away": line.away }),
        }
    }
}

/// Decides whether a non-numeric answer is correct
pub trait AnswerValidator {
    fn validate(&self, question: &Question, answer: &AnswerValue) -> bool;
}

impl<F> AnswerValidator for F
where
    F: Fn(&Question, &AnswerValue) -> bool,
{
    fn validate(&self, question: &Question, answer: &AnswerValue) -> bool {
        self(question, answer)
    }
}

// ── Numeric coercion ─────────────────────────────────────────────────

/// Coerce a raw value to a finite number.
///
/// Null and blank strings are not numbers. An object carrying a `value`
/// field is unwrapped first. Booleans count as 1 and 0. Arrays and other
/// objects are not numbers.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Null => return None,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_number(s)?,
        Value::Object(map) => return coerce_number(map.get("value")?),
        Value::Array(_) => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let radix = match s.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    match radix {
        // u64 -> f64 is the same rounding the browser applies to large literals
        Some(r) => u64::from_str_radix(&s[2..], r).ok().map(|v| v as f64),
        None => s.parse::<f64>().ok(),
    }
}

/// Numbers a numeric question accepts.
///
/// A non-empty `acceptNumbers` list wins (entries that are not numbers are
/// dropped). Otherwise the single value `acceptNumber`, falling back to `answer`.
pub fn accepted_numbers(question: &Question) -> Vec<f64> {
    match question.accept_numbers.as_deref() {
        Some(list) if !list.is_empty() => list.iter().filter_map(coerce_number).collect(),
        _ => {
            let single = question.accept_number.as_ref().unwrap_or(&question.answer);
            coerce_number(single).into_iter().collect()
        }
    }
}

/// Exact-equality check of a raw submission against the accepted numbers
#[allow(clippy::float_cmp)]
pub fn check_numeric(question: &Question, raw: &Value) -> bool {
    let Some(n) = coerce_number(raw) else {
        return false;
    };
    accepted_numbers(question).iter().any(|accepted| *accepted == n)
}

/// Judge an answer: numeric questions internally, everything else via `validator`
pub fn judge<V: AnswerValidator + ?Sized>(question: &Question, answer: &AnswerValue, validator: &V) -> bool {
    if question.answer_mode == AnswerMode::Numeric {
        check_numeric(question, &answer.raw())
    } else {
        validator.validate(question, answer)
    }
}

// ── Reference validator ──────────────────────────────────────────────

/// Case- and whitespace-insensitive comparison against the canonical answer
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictValidator;

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn canonical_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(normalize(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl AnswerValidator for StrictValidator {
    fn validate(&self, question: &Question, answer: &AnswerValue) -> bool {
        match answer {
            AnswerValue::MultipleChoice(s) | AnswerValue::Catalog(s) | AnswerValue::Text(s) => {
                canonical_text(&question.answer).is_some_and(|c| c == normalize(s))
            }
            AnswerValue::ScoreLine(line) => {
                ScoreLine::from_value(&question.answer).is_some_and(|c| c == *line)
            }
            AnswerValue::Numeric(raw) => check_numeric(question, raw),
        }
    }
}
