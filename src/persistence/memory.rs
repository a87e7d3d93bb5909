use std::collections::HashMap;

use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::mastery::LearnerProfile;
use crate::persistence::{validate_learner_id, PersistenceError, ProfileStore};

#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, LearnerProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self, learner_id: &str) -> Option<LearnerProfile> {
        self.profiles.read().get(learner_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn load<'a>(
        &'a self,
        learner_id: &'a str,
        now_ms: i64,
    ) -> BoxFuture<'a, Result<LearnerProfile, PersistenceError>> {
        Box::pin(async move {
            validate_learner_id(learner_id)?;
            Ok(self
                .stored(learner_id)
                .unwrap_or_else(|| LearnerProfile::new(learner_id, now_ms)))
        })
    }

    fn save<'a>(
        &'a self,
        learner_id: &'a str,
        profile: &'a LearnerProfile,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(async move {
            validate_learner_id(learner_id)?;
            self.profiles
                .write()
                .insert(learner_id.to_string(), profile.clone());
            Ok(())
        })
    }
}
