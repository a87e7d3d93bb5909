//! Generator - question and explanation producers
//!
//! Contains:
//! - ContentGenerator: the seam the session engine calls
//! - CatalogGenerator: offline question bank, also the fallback
//! - LlmGenerator: OpenAI-compatible chat completions

pub mod catalog;
pub mod llm;

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::curriculum::{DifficultyLevel, Topic};
use crate::scoring::{choice_letter, score_response, ScoringHint, Verdict};

pub use catalog::CatalogGenerator;
pub use llm::{ChatMessage, LLMConfig, LLMError, LLMProvider, LlmGenerator};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed generator output: {0}")]
    Malformed(String),
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Llm(#[from] LLMError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    ShortAnswer,
    Numeric,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple choice",
            Self::ShortAnswer => "short answer",
            Self::Numeric => "numeric",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    Generated,
    Fallback,
}

/// One question put to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub topic_id: String,
    pub difficulty: f64,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    pub answer_key: String,
    pub scoring: ScoringHint,
    #[serde(default)]
    pub explanation: Option<String>,
    pub origin: ItemOrigin,
}

impl Item {
    /// Rejects items the engine could not fairly score.
    pub fn validate(&self, expected_topic: &str) -> Result<(), GeneratorError> {
        if self.topic_id != expected_topic {
            return Err(GeneratorError::Malformed(format!(
                "item for {} when {} was requested",
                self.topic_id, expected_topic
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(GeneratorError::Malformed("empty prompt".into()));
        }
        if self.answer_key.trim().is_empty() {
            return Err(GeneratorError::Malformed("empty answer key".into()));
        }
        if self.kind == QuestionKind::MultipleChoice || matches!(self.scoring, ScoringHint::Choice) {
            if self.choices.len() < 2 {
                return Err(GeneratorError::Malformed(
                    "multiple choice needs at least two options".into(),
                ));
            }
            if crate::scoring::resolve_choice(&self.answer_key, &self.choices).is_none() {
                return Err(GeneratorError::Malformed(format!(
                    "answer key {:?} is not one of the options",
                    self.answer_key
                )));
            }
        }
        Ok(())
    }

    pub fn score(&self, response: &str) -> Verdict {
        score_response(&self.scoring, &self.answer_key, &self.choices, response)
    }

    /// Human-readable answer, e.g. `B) 0.25` for a choice item.
    pub fn expected_answer(&self) -> String {
        match crate::scoring::resolve_choice(&self.answer_key, &self.choices) {
            Some(i) if !self.choices.is_empty() => {
                format!("{}) {}", choice_letter(i), self.choices[i])
            }
            _ => self.answer_key.clone(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.prompt.trim().to_string();
        for (i, choice) in self.choices.iter().enumerate() {
            out.push_str(&format!("\n  {}) {}", choice_letter(i), choice));
        }
        out
    }
}

/// What a generator may know about the learner when producing content.
#[derive(Debug, Clone, Default)]
pub struct LearnerContext {
    pub learner_id: String,
    pub mastery: f64,
    pub attempts: u32,
    pub consecutive_correct: u32,
    pub level: DifficultyLevel,
    pub session_accuracy: Option<f64>,
    pub focus_path: Option<String>,
    /// Most recent exchanges, oldest first.
    pub history: Vec<ChatMessage>,
    /// A previous explanation to pick up where it stopped.
    pub continue_from: Option<String>,
}

pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate_item<'a>(
        &'a self,
        topic: &'a Topic,
        difficulty: f64,
        context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<Item, GeneratorError>>;

    fn explain<'a>(
        &'a self,
        topic: &'a Topic,
        context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<String, GeneratorError>>;
}

/// True when a reply looks cut off mid-thought: it trails off with an
/// ellipsis, an open quote or parenthesis, or has no closing punctuation.
pub fn is_incomplete(text: &str) -> bool {
    let text = text.trim_end();
    if text.is_empty() {
        return false;
    }
    if text.ends_with("...") || text.ends_with('"') || text.ends_with('(') {
        return true;
    }
    !text.ends_with(&['.', '!', '?', ':', ';'][..])
}
