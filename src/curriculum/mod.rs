//! Curriculum - the static knowledge graph
//!
//! Contains:
//! - Topic / LearningPath definitions for probability, ML and trading
//! - KnowledgeGraph: prerequisite ordering, depth and unlock checks
//! - The embedded default curriculum (`default_catalog.json`)

pub mod graph;
pub mod topic;

use thiserror::Error;

pub use graph::{KnowledgeGraph, DEFAULT_UNLOCK_THRESHOLD};
pub use topic::{DifficultyLevel, Domain, LearningPath, QuestionSpec, Topic};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("duplicate topic id: {0}")]
    DuplicateTopic(String),
    #[error("topic {topic} requires unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { topic: String, prerequisite: String },
    #[error("prerequisite cycle among: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("invalid catalog: {0}")]
    Invalid(String),
    #[error("catalog parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog read failed: {0}")]
    Io(#[from] std::io::Error),
}
