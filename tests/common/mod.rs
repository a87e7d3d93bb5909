#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use quantcoach::clock::ManualClock;
use quantcoach::curriculum::{KnowledgeGraph, Topic};
use quantcoach::generator::{
    CatalogGenerator, ContentGenerator, GeneratorError, Item, ItemOrigin, LearnerContext,
};
use quantcoach::mastery::{LearnerProfile, MasteryParams, MasteryStore};
use quantcoach::persistence::{InMemoryProfileStore, PersistenceError, ProfileStore};
use quantcoach::session::{SessionConfig, SessionEngine};

pub const START_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Serve,
    Fail,
    Hang,
}

/// Generator that follows a script, then serves catalog items.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Step>>,
    pub item_calls: AtomicUsize,
    pub explain_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn item_calls(&self) -> usize {
        self.item_calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        self.script.lock().pop_front().unwrap_or(Step::Serve)
    }
}

impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn generate_item<'a>(
        &'a self,
        topic: &'a Topic,
        difficulty: f64,
        context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<Item, GeneratorError>> {
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        Box::pin(async move {
            match step {
                Step::Serve => Ok(CatalogGenerator::new().item_for(
                    topic,
                    difficulty,
                    context,
                    ItemOrigin::Generated,
                )),
                Step::Fail => Err(GeneratorError::Unavailable("scripted failure".into())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(GeneratorError::Unavailable("woke up".into()))
                }
            }
        })
    }

    fn explain<'a>(
        &'a self,
        topic: &'a Topic,
        _context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<String, GeneratorError>> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        Box::pin(async move {
            match step {
                Step::Serve => Ok(format!("{} in short.", topic.name)),
                _ => Err(GeneratorError::Unavailable("scripted failure".into())),
            }
        })
    }
}

/// In-memory store whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryProfileStore,
    pub fail_saves: AtomicBool,
    pub fail_loads: AtomicBool,
    pub saves: AtomicUsize,
}

impl FlakyStore {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

fn io_error() -> PersistenceError {
    PersistenceError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable"))
}

impl ProfileStore for FlakyStore {
    fn load<'a>(
        &'a self,
        learner_id: &'a str,
        now_ms: i64,
    ) -> BoxFuture<'a, Result<LearnerProfile, PersistenceError>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Box::pin(async { Err(io_error()) });
        }
        self.inner.load(learner_id, now_ms)
    }

    fn save<'a>(
        &'a self,
        learner_id: &'a str,
        profile: &'a LearnerProfile,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Box::pin(async { Err(io_error()) });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(learner_id, profile)
    }
}

pub fn builtin_graph() -> Arc<KnowledgeGraph> {
    Arc::new(KnowledgeGraph::builtin().expect("builtin catalog loads"))
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        generator_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

pub struct Harness {
    pub engine: SessionEngine,
    pub mastery: Arc<MasteryStore>,
    pub store: Arc<FlakyStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self::build(steps, Arc::new(FlakyStore::default()))
    }

    pub fn plain() -> Self {
        Self::new(Vec::<Step>::new())
    }

    pub fn with_store(store: Arc<FlakyStore>) -> Self {
        Self::build(Vec::<Step>::new(), store)
    }

    fn build(steps: impl IntoIterator<Item = Step>, store: Arc<FlakyStore>) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let mastery = Arc::new(MasteryStore::new(
            builtin_graph(),
            store.clone(),
            clock.clone(),
            MasteryParams::default(),
        ));
        let generator = Arc::new(ScriptedGenerator::new(steps));
        let engine = SessionEngine::new(mastery.clone(), generator.clone(), fast_config());
        Self {
            engine,
            mastery,
            store,
            generator,
            clock,
        }
    }

    /// Answer key of the item currently waiting for the learner.
    pub async fn pending_answer(&self, learner_id: &str) -> String {
        let state = self
            .engine
            .session_snapshot(learner_id)
            .await
            .expect("session exists");
        state
            .pending()
            .expect("an item is pending")
            .item
            .answer_key
            .clone()
    }
}
