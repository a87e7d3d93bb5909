use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::curriculum::KnowledgeGraph;
use crate::mastery::model::{apply_outcome, MasteryParams, MasteryRecord};
use crate::mastery::profile::LearnerProfile;
use crate::mastery::MasteryError;
use crate::persistence::{PersistenceError, ProfileStore};

#[derive(Debug, Default)]
struct LearnerSlot {
    profile: Option<LearnerProfile>,
    dirty: bool,
    /// Set when storage could not be read; such a profile is never saved.
    detached: bool,
    recovery_notice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileLoad {
    pub profile: LearnerProfile,
    pub recovery_notice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MasteryUpdate {
    pub previous: MasteryRecord,
    pub record: MasteryRecord,
    /// Why the update is only held in memory, if it could not be saved.
    pub unsaved: Option<String>,
}

impl MasteryUpdate {
    pub fn is_saved(&self) -> bool {
        self.unsaved.is_none()
    }
}

/// Per-learner mastery records with write-through persistence.
///
/// Every operation for one learner runs under that learner's async mutex, so
/// two sessions of the same learner cannot lose each other's updates. Other
/// learners only share the lock map, which is never held across an await.
pub struct MasteryStore {
    graph: Arc<KnowledgeGraph>,
    store: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    params: MasteryParams,
    learners: Mutex<HashMap<String, Arc<AsyncMutex<LearnerSlot>>>>,
}

impl MasteryStore {
    pub fn new(
        graph: Arc<KnowledgeGraph>,
        store: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        params: MasteryParams,
    ) -> Self {
        Self {
            graph,
            store,
            clock,
            params,
            learners: Mutex::new(HashMap::new()),
        }
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    pub fn params(&self) -> &MasteryParams {
        &self.params
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Loads the learner (if needed) and hands back any one-off notice about
    /// recovering from unreadable storage.
    pub async fn open(&self, learner_id: &str) -> Result<ProfileLoad, MasteryError> {
        let slot = self.slot(learner_id);
        let mut slot = slot.lock().await;
        let profile = self.ensure_loaded(learner_id, &mut slot).await?.clone();
        Ok(ProfileLoad {
            profile,
            recovery_notice: slot.recovery_notice.take(),
        })
    }

    pub async fn profile(&self, learner_id: &str) -> Result<LearnerProfile, MasteryError> {
        let slot = self.slot(learner_id);
        let mut slot = slot.lock().await;
        Ok(self.ensure_loaded(learner_id, &mut slot).await?.clone())
    }

    /// Create-if-absent read of one record. A created record only lives in
    /// memory until the next scored update is saved.
    pub async fn get(&self, learner_id: &str, topic_id: &str) -> Result<MasteryRecord, MasteryError> {
        self.check_topic(topic_id)?;
        let now = self.clock.now_ms();
        let slot = self.slot(learner_id);
        let mut slot = slot.lock().await;
        let profile = self.ensure_loaded(learner_id, &mut slot).await?;
        Ok(profile.record_or_create(topic_id, now).clone())
    }

    pub async fn update(
        &self,
        learner_id: &str,
        topic_id: &str,
        correct: bool,
        latency: Duration,
    ) -> Result<MasteryUpdate, MasteryError> {
        self.check_topic(topic_id)?;
        let slot = self.slot(learner_id);
        let mut slot = slot.lock().await;
        let now = self.clock.now_ms();

        let profile = self.ensure_loaded(learner_id, &mut slot).await?;
        let previous = profile.record_or_create(topic_id, now).clone();
        let record = apply_outcome(&previous, correct, latency, now, &self.params);
        profile.apply(record.clone(), correct, self.params.mastered_threshold);
        slot.dirty = true;

        debug!(
            learner_id,
            topic_id,
            correct,
            score = record.score,
            next_due_at = record.next_due_at,
            "mastery updated"
        );

        let unsaved = self.persist(learner_id, &mut slot).await;
        Ok(MasteryUpdate {
            previous,
            record,
            unsaved,
        })
    }

    /// Re-saves a learner whose last write failed. No-op when clean.
    pub async fn flush(&self, learner_id: &str) -> Result<(), MasteryError> {
        let slot = self.slot(learner_id);
        let mut slot = slot.lock().await;
        if !slot.dirty {
            return Ok(());
        }
        if slot.detached {
            return Err(PersistenceError::Detached(learner_id.to_string()).into());
        }
        let Some(profile) = slot.profile.as_ref() else {
            return Ok(());
        };
        let result = self.save_with_retry(learner_id, profile).await;
        result?;
        slot.dirty = false;
        Ok(())
    }

    pub async fn is_dirty(&self, learner_id: &str) -> bool {
        let slot = self.slot(learner_id);
        let slot = slot.lock().await;
        slot.dirty
    }

    /// Drops a learner's cached profile when no call is using it and nothing
    /// is waiting to be saved. Returns whether it was dropped.
    pub fn release(&self, learner_id: &str) -> bool {
        let mut learners = self.learners.lock();
        let Some(slot) = learners.get(learner_id) else {
            return false;
        };
        // other holders cloned the Arc under this map lock
        if Arc::strong_count(slot) > 1 {
            return false;
        }
        let releasable = match slot.try_lock() {
            Ok(slot) => !slot.dirty && !slot.detached,
            Err(_) => false,
        };
        if releasable {
            learners.remove(learner_id);
            debug!(learner_id, "learner profile released");
        }
        releasable
    }

    /// Number of learners whose profiles are cached.
    pub fn loaded_learners(&self) -> usize {
        self.learners.lock().len()
    }

    fn check_topic(&self, topic_id: &str) -> Result<(), MasteryError> {
        if self.graph.contains(topic_id) {
            Ok(())
        } else {
            warn!(topic_id, "mastery access for topic missing from catalog");
            Err(MasteryError::InvalidTopic(topic_id.to_string()))
        }
    }

    fn slot(&self, learner_id: &str) -> Arc<AsyncMutex<LearnerSlot>> {
        let mut learners = self.learners.lock();
        Arc::clone(learners.entry(learner_id.to_string()).or_default())
    }

    async fn ensure_loaded<'s>(
        &self,
        learner_id: &str,
        slot: &'s mut LearnerSlot,
    ) -> Result<&'s mut LearnerProfile, MasteryError> {
        if slot.profile.is_none() {
            let now = self.clock.now_ms();
            let profile = match self.load_with_retry(learner_id, now).await {
                Ok(profile) => profile,
                Err(err @ PersistenceError::InvalidLearnerId(_)) => return Err(err.into()),
                Err(err @ PersistenceError::Corrupted { .. }) => {
                    warn!(learner_id, error = %err, "starting learner from an empty profile");
                    slot.recovery_notice = Some(format!(
                        "Your saved progress could not be read ({err}); starting fresh."
                    ));
                    LearnerProfile::new(learner_id, now)
                }
                Err(err) => {
                    warn!(learner_id, error = %err, "profile unreadable, continuing in memory only");
                    slot.detached = true;
                    slot.recovery_notice = Some(format!(
                        "Your saved progress is unavailable right now ({err}); this session will not be saved."
                    ));
                    LearnerProfile::new(learner_id, now)
                }
            };
            info!(learner_id, records = profile.records.len(), "learner profile loaded");
            slot.profile = Some(profile);
        }
        Ok(slot.profile.get_or_insert_with(|| LearnerProfile::new(learner_id, 0)))
    }

    async fn persist(&self, learner_id: &str, slot: &mut LearnerSlot) -> Option<String> {
        if slot.detached {
            return Some(PersistenceError::Detached(learner_id.to_string()).to_string());
        }
        let profile = slot.profile.as_ref()?;
        let result = self.save_with_retry(learner_id, profile).await;
        match result {
            Ok(()) => {
                slot.dirty = false;
                None
            }
            Err(err) => {
                warn!(learner_id, error = %err, "mastery update kept in memory only");
                Some(err.to_string())
            }
        }
    }

    async fn load_with_retry(
        &self,
        learner_id: &str,
        now: i64,
    ) -> Result<LearnerProfile, PersistenceError> {
        match self.store.load(learner_id, now).await {
            Err(err) if err.is_retryable() => {
                warn!(learner_id, error = %err, "profile load failed, retrying once");
                self.store.load(learner_id, now).await
            }
            other => other,
        }
    }

    async fn save_with_retry(
        &self,
        learner_id: &str,
        profile: &LearnerProfile,
    ) -> Result<(), PersistenceError> {
        match self.store.save(learner_id, profile).await {
            Err(err) if err.is_retryable() => {
                warn!(learner_id, error = %err, "profile save failed, retrying once");
                self.store.save(learner_id, profile).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::curriculum::{Domain, Topic};
    use crate::persistence::InMemoryProfileStore;

    fn setup() -> (MasteryStore, Arc<InMemoryProfileStore>, Arc<ManualClock>) {
        let graph = KnowledgeGraph::new(
            vec![
                Topic::new("a", "A", Domain::Probability, 0.2),
                Topic::new("b", "B", Domain::Probability, 0.4).with_prerequisites(["a"]),
            ],
            vec![],
        )
        .unwrap();
        let backing = Arc::new(InMemoryProfileStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = MasteryStore::new(
            Arc::new(graph),
            backing.clone(),
            clock.clone(),
            MasteryParams::default(),
        );
        (store, backing, clock)
    }

    #[tokio::test]
    async fn test_get_creates_zero_record() {
        let (store, backing, _) = setup();
        let record = store.get("u", "a").await.unwrap();
        assert_eq!(record.score, 0.0);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.next_due_at, 1_000_000);
        assert!(backing.stored("u").is_none());
    }

    #[tokio::test]
    async fn test_update_writes_through() {
        let (store, backing, clock) = setup();
        clock.advance_secs(5);
        let update = store
            .update("u", "a", true, Duration::from_secs(3))
            .await
            .unwrap();
        assert!(update.is_saved());
        assert!((update.record.score - 0.25).abs() < 1e-12);
        let saved = backing.stored("u").unwrap();
        assert_eq!(saved.record("a"), Some(&update.record));
        assert_eq!(saved.stats.total_attempts, 1);
        assert!(!store.is_dirty("u").await);
    }

    #[tokio::test]
    async fn test_unknown_topic_rejected() {
        let (store, backing, _) = setup();
        let err = store
            .update("u", "zzz", true, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, MasteryError::InvalidTopic(t) if t == "zzz"));
        assert!(matches!(
            store.get("u", "zzz").await,
            Err(MasteryError::InvalidTopic(_))
        ));
        assert!(backing.is_empty());
    }

    #[tokio::test]
    async fn test_release_drops_only_clean_profiles() {
        let (store, backing, _) = setup();
        store.update("u", "a", true, Duration::ZERO).await.unwrap();
        store.get("v", "a").await.unwrap();
        assert_eq!(store.loaded_learners(), 2);

        assert!(store.release("u"));
        assert!(store.release("v"));
        assert!(!store.release("nobody"));
        assert_eq!(store.loaded_learners(), 0);

        // a released learner comes back from the backing store
        let record = store.get("u", "a").await.unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(backing.stored("u").unwrap().record("a"), Some(&record));
    }

    #[tokio::test]
    async fn test_release_keeps_busy_and_unsaved_profiles() {
        let (store, _, _) = setup();
        store.get("u", "a").await.unwrap();
        let held = store.slot("u");
        assert!(!store.release("u"));
        drop(held);

        store.slot("u").lock().await.dirty = true;
        assert!(!store.release("u"));
        assert_eq!(store.loaded_learners(), 1);
    }

    #[tokio::test]
    async fn test_profile_reloads_from_backing_store() {
        let (store, backing, clock) = setup();
        store.update("u", "a", true, Duration::ZERO).await.unwrap();
        let fresh = MasteryStore::new(
            Arc::clone(store.graph()),
            backing,
            clock,
            MasteryParams::default(),
        );
        let profile = fresh.profile("u").await.unwrap();
        assert_eq!(profile.record("a").unwrap().attempts, 1);
    }
}
