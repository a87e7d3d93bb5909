//! Persistence Layer - durable per-learner profile storage
//!
//! Contains:
//! - ProfileStore: the storage seam used by the mastery store
//! - FileProfileStore: one checksummed file per learner, atomic replace
//! - InMemoryProfileStore: process-local store for tests and demos

pub mod file;
pub mod memory;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::mastery::LearnerProfile;

pub use file::FileProfileStore;
pub use memory::InMemoryProfileStore;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored profile for {learner_id} is corrupted: {reason}")]
    Corrupted { learner_id: String, reason: String },
    #[error("invalid learner id: {0:?}")]
    InvalidLearnerId(String),
    #[error("profile for {0} was not loaded from storage; refusing to overwrite it")]
    Detached(String),
}

impl PersistenceError {
    /// Only transient I/O failures are worth a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

pub trait ProfileStore: Send + Sync {
    /// Loads a learner's profile; a learner with nothing stored gets an
    /// empty profile created at `now_ms`.
    fn load<'a>(
        &'a self,
        learner_id: &'a str,
        now_ms: i64,
    ) -> BoxFuture<'a, Result<LearnerProfile, PersistenceError>>;

    /// Durably replaces the learner's profile. Must be atomic per learner.
    fn save<'a>(
        &'a self,
        learner_id: &'a str,
        profile: &'a LearnerProfile,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;
}

pub(crate) fn validate_learner_id(learner_id: &str) -> Result<(), PersistenceError> {
    if learner_id.trim().is_empty() || learner_id.chars().any(char::is_control) {
        return Err(PersistenceError::InvalidLearnerId(learner_id.to_string()));
    }
    Ok(())
}
