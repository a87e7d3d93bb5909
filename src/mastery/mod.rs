//! Mastery - per-learner, per-topic proficiency
//!
//! Contains:
//! - MasteryRecord / MasteryParams: the score and spacing update rule
//! - LearnerProfile: everything persisted for one learner
//! - MasteryStore: serialized per-learner access with write-through saves

pub mod model;
pub mod profile;
pub mod store;

use thiserror::Error;

use crate::persistence::PersistenceError;

pub use model::{apply_outcome, next_score, spacing_interval_ms, MasteryParams, MasteryRecord};
pub use profile::{LearnerProfile, ProfileStats};
pub use store::{MasteryStore, MasteryUpdate, ProfileLoad};

#[derive(Debug, Error)]
pub enum MasteryError {
    #[error("topic is not in the catalog: {0}")]
    InvalidTopic(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
