//! Question records and the ordered question pool

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PoolError;

/// Unlock tier for gated questions
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    /// Phases in unlock order
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];
}

/// How a question expects to be answered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    MultipleChoice,
    Catalog,
    Numeric,
    Text,
    ScoreLine,
}

/// A single quiz question as supplied by the dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub category: String,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub prompt: String,
    pub answer_mode: AnswerMode,
    /// Canonical correct value, kept raw so numeric coercion sees the dataset as written
    pub answer: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_number: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_numbers: Option<Vec<Value>>,
    /// Choices shown for multiple-choice questions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fifty: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact: Option<String>,
}

impl Question {
    /// The pair revealed by the 50/50 help, if the dataset defines exactly two options
    pub fn fifty_pair(&self) -> Option<[String; 2]> {
        match self.fifty.as_deref() {
            Some([a, b]) => Some([a.clone(), b.clone()]),
            _ => None,
        }
    }

    /// Hint text, ignoring blank entries
    pub fn hint_text(&self) -> Option<&str> {
        self.hint.as_deref().filter(|h| !h.trim().is_empty())
    }
}

/// Source of the static question set
pub trait QuestionProvider {
    fn questions(&self) -> Vec<Question>;
}

impl QuestionProvider for Vec<Question> {
    fn questions(&self) -> Vec<Question> {
        self.clone()
    }
}

/// Immutable, ordered collection of questions for one match
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuestionPool {
    questions: Vec<Question>,
}

impl QuestionPool {
    /// Build a pool, sorting by `order` (stable, so dataset position breaks ties)
    pub fn new(mut questions: Vec<Question>) -> Result<Self, PoolError> {
        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if !seen.insert(q.id.as_str()) {
                return Err(PoolError::DuplicateId(q.id.clone()));
            }
            if q.points == 0 {
                return Err(PoolError::ZeroPoints(q.id.clone()));
            }
        }
        questions.sort_by_key(|q| q.order);
        Ok(Self { questions })
    }

    pub fn from_provider<P: QuestionProvider + ?Sized>(provider: &P) -> Result<Self, PoolError> {
        Self::new(provider.questions())
    }

    /// Parse a JSON array of question records
    pub fn from_json(json: &str) -> Result<Self, PoolError> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Category names in order of first appearance
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for q in &self.questions {
            if !out.contains(&q.category.as_str()) {
                out.push(q.category.as_str());
            }
        }
        out
    }
}
