use serde::{Deserialize, Serialize};

use crate::scoring::ScoringHint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Probability,
    Ml,
    Trading,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probability => "probability",
            Self::Ml => "ml",
            Self::Trading => "trading",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Probability => "Probability",
            Self::Ml => "Machine Learning",
            Self::Trading => "Trading",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Mid,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Mid => "mid",
            Self::Hard => "hard",
        }
    }

    pub fn harder(&self) -> Self {
        match self {
            Self::Easy => Self::Mid,
            _ => Self::Hard,
        }
    }

    pub fn easier(&self) -> Self {
        match self {
            Self::Hard => Self::Mid,
            _ => Self::Easy,
        }
    }

    /// Offset applied to a topic's base difficulty.
    pub fn offset(&self) -> f64 {
        match self {
            Self::Easy => -0.15,
            Self::Mid => 0.0,
            Self::Hard => 0.15,
        }
    }

    pub fn from_difficulty(difficulty: f64) -> Self {
        if difficulty < 0.35 {
            Self::Easy
        } else if difficulty < 0.7 {
            Self::Mid
        } else {
            Self::Hard
        }
    }
}

/// A canned question stored in the curriculum file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub prompt: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub domain: Domain,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub difficulty: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default)]
    pub path: Option<String>,
}

impl Topic {
    pub fn new(id: impl Into<String>, name: impl Into<String>, domain: Domain, difficulty: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain,
            prerequisites: Vec::new(),
            difficulty,
            keywords: Vec::new(),
            summary: String::new(),
            questions: Vec::new(),
            path: None,
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_question(mut self, question: QuestionSpec) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub name: String,
    pub domain: Domain,
    pub topic_ids: Vec<String>,
}
