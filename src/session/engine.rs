use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::format_ms;
use crate::curriculum::{DifficultyLevel, KnowledgeGraph, LearningPath, Topic};
use crate::generator::{
    is_incomplete, CatalogGenerator, ChatMessage, ContentGenerator, GeneratorError, Item,
    ItemOrigin, LearnerContext,
};
use crate::mastery::{LearnerProfile, MasteryRecord, MasteryStore};
use crate::scheduler::{NextTopic, Scheduler};
use crate::session::commands::{parse_command, Command};
use crate::session::state::{PendingItem, SessionPhase, SessionState};

const MASTERY_SHIFT: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Generator calls per item before the catalog fallback is used.
    pub generator_attempts: u32,
    pub generator_timeout: Duration,
    pub history_window: usize,
    pub adapt_after: u32,
    pub lower_accuracy: f64,
    pub upper_accuracy: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            generator_attempts: 2,
            generator_timeout: Duration::from_secs(20),
            history_window: 4,
            adapt_after: 3,
            lower_accuracy: 0.5,
            upper_accuracy: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    AwaitingAnswer,
    Idle,
    NothingDue { next_review_at: Option<i64> },
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Notice {
    /// The answer was scored but the profile is only held in memory.
    ProgressNotSaved(String),
    ProfileRecovered(String),
    /// Topic id whose item came from the offline question bank.
    FallbackItem(String),
    GeneratorUnavailable(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Self::ProgressNotSaved(reason) => {
                format!("Your progress could not be saved right now ({reason}). It will be retried.")
            }
            Self::ProfileRecovered(message) => message.clone(),
            Self::FallbackItem(_) => {
                "The tutor model was unavailable, so this question comes from the offline question bank."
                    .to_string()
            }
            Self::GeneratorUnavailable(reason) => format!("The tutor model is unavailable ({reason})."),
            Self::Error(reason) => format!("Something went wrong: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub topic_id: String,
    pub correct: bool,
    pub expected: String,
    pub detail: String,
    pub score_before: f64,
    pub score_after: f64,
    pub next_due_at: i64,
    pub saved: bool,
}

/// What the presentation layer shows after one learner message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub session_id: Uuid,
    pub display_text: String,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub topic_id: Option<String>,
    pub feedback: Option<Feedback>,
    pub notices: Vec<Notice>,
}

impl Reply {
    pub fn is_awaiting_answer(&self) -> bool {
        self.status == SessionStatus::AwaitingAnswer
    }
}

#[derive(Debug, Default)]
struct Turn {
    lines: Vec<String>,
    notices: Vec<Notice>,
    feedback: Option<Feedback>,
    nothing_due: Option<Option<i64>>,
}

impl Turn {
    fn say(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn finish(self, state: &SessionState) -> Reply {
        let status = match &state.phase {
            SessionPhase::AwaitingResponse(_) => SessionStatus::AwaitingAnswer,
            SessionPhase::Ended => SessionStatus::Ended,
            SessionPhase::Idle | SessionPhase::Scoring => match self.nothing_due {
                Some(next_review_at) => SessionStatus::NothingDue { next_review_at },
                None => SessionStatus::Idle,
            },
        };
        let topic_id = state
            .pending()
            .map(|p| p.item.topic_id.clone())
            .or_else(|| state.current_topic.clone());
        Reply {
            session_id: state.session_id,
            display_text: self.lines.join("\n\n"),
            status,
            topic_id,
            feedback: self.feedback,
            notices: self.notices,
        }
    }
}

/// Drives tutoring conversations for any number of learners.
///
/// A session moves `Idle -> AwaitingResponse -> Scoring -> Idle` and ends
/// on an exit command. Mastery is only written once an answer has been
/// scored, so dropping a turn midway loses at most the pending item.
pub struct SessionEngine {
    mastery: Arc<MasteryStore>,
    scheduler: Scheduler,
    generator: Arc<dyn ContentGenerator>,
    fallback: CatalogGenerator,
    config: SessionConfig,
    sessions: Mutex<HashMap<String, Arc<AsyncMutex<SessionState>>>>,
}

impl SessionEngine {
    pub fn new(
        mastery: Arc<MasteryStore>,
        generator: Arc<dyn ContentGenerator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(Arc::clone(&mastery)),
            mastery,
            generator,
            fallback: CatalogGenerator::new(),
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn mastery(&self) -> &Arc<MasteryStore> {
        &self.mastery
    }

    fn graph(&self) -> &KnowledgeGraph {
        self.mastery.graph()
    }

    /// Opens a fresh session, replacing any previous one for the learner,
    /// and presents the first item.
    pub async fn start_session(&self, learner_id: &str) -> Reply {
        let state = SessionState::new(learner_id, self.mastery.now_ms());
        let slot = Arc::new(AsyncMutex::new(state));
        self.sessions
            .lock()
            .insert(learner_id.to_string(), Arc::clone(&slot));

        let mut state = slot.lock().await;
        let mut turn = Turn::default();
        if self.begin(&mut state, &mut turn).await {
            self.advance(&mut state, &mut turn).await;
        }
        self.finish(&slot, &state, turn)
    }

    pub async fn handle_message(&self, learner_id: &str, text: &str) -> Reply {
        let (slot, created) = self.session_slot(learner_id);
        let mut state = slot.lock().await;
        let mut turn = Turn::default();

        if created || state.is_ended() {
            if state.is_ended() {
                *state = SessionState::new(learner_id, self.mastery.now_ms());
            }
            if !self.begin(&mut state, &mut turn).await {
                return self.finish(&slot, &state, turn);
            }
        }
        if matches!(state.phase, SessionPhase::Scoring) {
            warn!(learner_id, "previous turn was interrupted while scoring");
            state.phase = SessionPhase::Idle;
        }

        state.turn_count += 1;
        let text = text.trim();
        let awaiting = state.pending().is_some();
        debug!(learner_id, turn = state.turn_count, phase = state.phase.name(), "message received");

        match parse_command(text) {
            Some(Command::Exit) => self.end(&mut state, &mut turn).await,
            Some(Command::Explain) => self.explain(&mut state, &mut turn, false).await,
            Some(Command::Continue) => self.explain(&mut state, &mut turn, true).await,
            Some(Command::Skip) => {
                if awaiting {
                    state.phase = SessionPhase::Idle;
                    turn.say("Skipped. Nothing was recorded for that question.");
                }
                self.advance(&mut state, &mut turn).await;
            }
            Some(Command::Next) if awaiting => {
                turn.say("Answer the question below, or type `skip` to move on.");
                reprompt(&state, &mut turn);
            }
            Some(Command::Next) => self.advance(&mut state, &mut turn).await,
            Some(Command::Progress) => {
                match self.mastery.profile(learner_id).await {
                    Ok(profile) => turn.say(progress_text(self.graph(), &profile, self.mastered_threshold())),
                    Err(err) => turn.notices.push(Notice::Error(err.to_string())),
                }
                reprompt(&state, &mut turn);
            }
            Some(Command::Paths) => {
                turn.say(paths_text(self.graph(), state.focus_path.as_deref()));
                reprompt(&state, &mut turn);
            }
            Some(Command::Focus(name)) => self.focus(&mut state, &mut turn, name).await,
            None if awaiting && text.is_empty() => {
                turn.say("Type your answer, or `skip` to move on.");
                reprompt(&state, &mut turn);
            }
            None if awaiting => {
                self.score(&mut state, &mut turn, text).await;
                self.advance(&mut state, &mut turn).await;
            }
            None => self.advance(&mut state, &mut turn).await,
        }
        self.finish(&slot, &state, turn)
    }

    /// Ends the learner's session, discarding any unanswered item and
    /// flushing progress that failed to save earlier.
    pub async fn end_session(&self, learner_id: &str) -> Reply {
        let mut turn = Turn::default();
        let Some(slot) = self.sessions.lock().get(learner_id).cloned() else {
            turn.say("There is no active session.");
            let mut state = SessionState::new(learner_id, self.mastery.now_ms());
            state.phase = SessionPhase::Ended;
            return turn.finish(&state);
        };
        let mut state = slot.lock().await;
        if state.is_ended() {
            turn.say("This session has already ended.");
        } else {
            self.end(&mut state, &mut turn).await;
        }
        self.finish(&slot, &state, turn)
    }

    /// Number of sessions currently held in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    pub async fn session_snapshot(&self, learner_id: &str) -> Option<SessionState> {
        let slot = self.sessions.lock().get(learner_id).cloned()?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    fn session_slot(&self, learner_id: &str) -> (Arc<AsyncMutex<SessionState>>, bool) {
        let mut sessions = self.sessions.lock();
        if let Some(slot) = sessions.get(learner_id) {
            return (Arc::clone(slot), false);
        }
        let slot = Arc::new(AsyncMutex::new(SessionState::new(
            learner_id,
            self.mastery.now_ms(),
        )));
        sessions.insert(learner_id.to_string(), Arc::clone(&slot));
        (slot, true)
    }

    /// Builds the reply. An ended session is dropped, together with the
    /// learner's cached profile when it has nothing left to save.
    fn finish(
        &self,
        slot: &Arc<AsyncMutex<SessionState>>,
        state: &SessionState,
        turn: Turn,
    ) -> Reply {
        let reply = turn.finish(state);
        if state.is_ended() {
            {
                let mut sessions = self.sessions.lock();
                if sessions
                    .get(&state.learner_id)
                    .is_some_and(|current| Arc::ptr_eq(current, slot))
                {
                    sessions.remove(&state.learner_id);
                }
            }
            self.mastery.release(&state.learner_id);
        }
        reply
    }

    fn mastered_threshold(&self) -> f64 {
        self.mastery.params().mastered_threshold
    }

    /// Loads the learner and greets them. False when the session cannot run.
    async fn begin(&self, state: &mut SessionState, turn: &mut Turn) -> bool {
        match self.mastery.open(&state.learner_id).await {
            Ok(load) => {
                if let Some(message) = load.recovery_notice {
                    turn.notices.push(Notice::ProfileRecovered(message));
                }
                info!(
                    learner_id = %state.learner_id,
                    session_id = %state.session_id,
                    known_topics = load.profile.records.len(),
                    "session started"
                );
                turn.say(greeting(self.graph(), &load.profile, self.mastered_threshold()));
                true
            }
            Err(err) => {
                error!(learner_id = %state.learner_id, error = %err, "cannot open learner");
                turn.notices.push(Notice::Error(err.to_string()));
                turn.say("I can't open a session for this learner.");
                state.phase = SessionPhase::Ended;
                false
            }
        }
    }

    async fn advance(&self, state: &mut SessionState, turn: &mut Turn) {
        let focus: Option<LearningPath> = state
            .focus_path
            .as_deref()
            .and_then(|name| self.graph().path(name))
            .cloned();
        let next = match self
            .scheduler
            .next_topic_in(&state.learner_id, focus.as_ref())
            .await
        {
            Ok(next) => next,
            Err(err) => {
                error!(learner_id = %state.learner_id, error = %err, "scheduling failed");
                turn.notices.push(Notice::Error(err.to_string()));
                state.phase = SessionPhase::Idle;
                return;
            }
        };

        let topic_id = match &next {
            NextTopic::NoEligibleTopic { next_due_at } => {
                state.phase = SessionPhase::Idle;
                turn.nothing_due = Some(*next_due_at);
                turn.say(caught_up_text(*next_due_at, focus.as_ref()));
                return;
            }
            NextTopic::Due { topic_id, .. } | NextTopic::New { topic_id } => topic_id.clone(),
        };

        let graph = Arc::clone(self.mastery.graph());
        let topic = match graph.get(&topic_id) {
            Ok(topic) => topic,
            Err(err) => {
                error!(topic_id = %topic_id, error = %err, "scheduled topic missing from catalog");
                turn.notices.push(Notice::Error(err.to_string()));
                state.phase = SessionPhase::Idle;
                return;
            }
        };
        let record = match self.mastery.get(&state.learner_id, &topic_id).await {
            Ok(record) => record,
            Err(err) => {
                turn.notices.push(Notice::Error(err.to_string()));
                state.phase = SessionPhase::Idle;
                return;
            }
        };

        let difficulty = target_difficulty(topic, &record, state.level);
        let context = self.context_for(state, &record);
        let (item, notice) = self.request_item(topic, difficulty, &context).await;
        turn.notices.extend(notice);

        let heading = if next.is_review() { "Review" } else { "New topic" };
        turn.say(format!(
            "{heading}: {} ({}, {})\n{}\n(answer: {})",
            topic.name,
            topic.domain.display_name(),
            state.level.as_str(),
            item.render(),
            item.scoring.describe()
        ));
        debug!(
            learner_id = %state.learner_id,
            topic_id = %topic_id,
            difficulty,
            origin = ?item.origin,
            "item presented"
        );
        state.current_topic = Some(topic_id);
        state.phase = SessionPhase::AwaitingResponse(PendingItem {
            item,
            presented_at: self.mastery.now_ms(),
        });
    }

    async fn score(&self, state: &mut SessionState, turn: &mut Turn, text: &str) {
        let pending = match std::mem::replace(&mut state.phase, SessionPhase::Scoring) {
            SessionPhase::AwaitingResponse(pending) => pending,
            other => {
                state.phase = other;
                return;
            }
        };
        let item = pending.item;
        let latency_ms = self.mastery.now_ms().saturating_sub(pending.presented_at).max(0);
        let verdict = item.score(text);

        let outcome = self
            .mastery
            .update(
                &state.learner_id,
                &item.topic_id,
                verdict.correct,
                Duration::from_millis(latency_ms as u64),
            )
            .await;

        let summary = match outcome {
            Ok(update) => {
                if let Some(reason) = &update.unsaved {
                    turn.notices.push(Notice::ProgressNotSaved(reason.clone()));
                }
                let text = feedback_text(self.graph(), &item, verdict.correct, &update.previous, &update.record);
                turn.feedback = Some(Feedback {
                    topic_id: item.topic_id.clone(),
                    correct: verdict.correct,
                    expected: item.expected_answer(),
                    detail: verdict.detail,
                    score_before: update.previous.score,
                    score_after: update.record.score,
                    next_due_at: update.record.next_due_at,
                    saved: update.unsaved.is_none(),
                });
                text
            }
            Err(err) => {
                error!(learner_id = %state.learner_id, error = %err, "answer could not be recorded");
                turn.notices.push(Notice::Error(err.to_string()));
                "I couldn't record that answer.".to_string()
            }
        };

        state.record_answer(verdict.correct);
        if state.adapt_level(
            self.config.adapt_after,
            self.config.lower_accuracy,
            self.config.upper_accuracy,
        ) {
            info!(learner_id = %state.learner_id, level = state.level.as_str(), "difficulty level changed");
        }
        let window = self.config.history_window;
        state.remember(ChatMessage::assistant(item.render()), window);
        state.remember(ChatMessage::user(text), window);
        turn.say(summary);
        state.phase = SessionPhase::Idle;
    }

    async fn explain(&self, state: &mut SessionState, turn: &mut Turn, continuing: bool) {
        let Some(topic_id) = state.current_topic.clone() else {
            turn.say("There is nothing to explain yet. Type `next` for a question.");
            return;
        };
        if continuing && state.last_explanation.is_none() {
            turn.say("There is nothing to continue. Type `explain` for an explanation.");
            reprompt(state, turn);
            return;
        }
        let graph = Arc::clone(self.mastery.graph());
        let Ok(topic) = graph.get(&topic_id) else {
            turn.notices.push(Notice::Error(format!("unknown topic {topic_id}")));
            return;
        };
        let record = self
            .mastery
            .get(&state.learner_id, &topic_id)
            .await
            .unwrap_or_else(|_| MasteryRecord::new(topic_id.as_str(), self.mastery.now_ms()));

        let mut context = self.context_for(state, &record);
        if continuing {
            context.continue_from = state.last_explanation.clone();
        }
        let context = &context;
        let result = self
            .with_retries("explanation", &topic.id, move || {
                self.generator.explain(topic, context)
            })
            .await;

        match result {
            Ok(text) => {
                let window = self.config.history_window;
                state.remember(
                    ChatMessage::user(if continuing { "continue" } else { "explain" }),
                    window,
                );
                state.remember(ChatMessage::assistant(text.as_str()), window);
                let more = is_incomplete(&text);
                state.last_explanation = more.then(|| text.clone());
                turn.say(text);
                if more {
                    turn.say("(type `continue` for more)");
                }
            }
            Err(err) => {
                turn.notices.push(Notice::GeneratorUnavailable(err.to_string()));
                turn.say(self.fallback.explanation_for(topic));
                turn.say("(the tutor model is unavailable right now; type `explain` to try again)");
            }
        }
        reprompt(state, turn);
    }

    async fn focus(&self, state: &mut SessionState, turn: &mut Turn, name: Option<String>) {
        match name {
            None => {
                state.focus_path = None;
                turn.say("Focus cleared: questions come from every learning path.");
            }
            Some(name) => match self.graph().path(&name) {
                Some(path) => {
                    turn.say(format!("Focusing on the {} path.", path.name));
                    state.focus_path = Some(path.name.clone());
                }
                None => {
                    turn.say(format!("I don't know a path called \"{name}\"."));
                    turn.say(paths_text(self.graph(), state.focus_path.as_deref()));
                }
            },
        }
        if state.pending().is_some() {
            reprompt(state, turn);
        } else {
            self.advance(state, turn).await;
        }
    }

    async fn end(&self, state: &mut SessionState, turn: &mut Turn) {
        if let Some(pending) = state.pending() {
            debug!(learner_id = %state.learner_id, item_id = %pending.item.id, "discarding unanswered item");
        }
        if let Err(err) = self.mastery.flush(&state.learner_id).await {
            warn!(learner_id = %state.learner_id, error = %err, "progress not flushed at session end");
            turn.notices.push(Notice::ProgressNotSaved(err.to_string()));
        }

        let mut summary = format!(
            "Session over: {} answered, {} correct",
            state.answered, state.correct
        );
        if let Some(accuracy) = state.accuracy() {
            summary.push_str(&format!(" ({:.0}%)", accuracy * 100.0));
        }
        summary.push('.');
        if let Ok(profile) = self.mastery.profile(&state.learner_id).await {
            summary.push_str(&format!(
                " Topics mastered: {}/{}.",
                profile.stats.topics_mastered,
                self.graph().len()
            ));
        }
        summary.push_str(" See you next time!");
        turn.say(summary);

        info!(
            learner_id = %state.learner_id,
            session_id = %state.session_id,
            answered = state.answered,
            correct = state.correct,
            "session ended"
        );
        state.phase = SessionPhase::Ended;
    }

    fn context_for(&self, state: &SessionState, record: &MasteryRecord) -> LearnerContext {
        LearnerContext {
            learner_id: state.learner_id.clone(),
            mastery: record.score,
            attempts: record.attempts,
            consecutive_correct: record.consecutive_correct,
            level: state.level,
            session_accuracy: state.accuracy(),
            focus_path: state.focus_path.clone(),
            history: state.history.iter().cloned().collect(),
            continue_from: None,
        }
    }

    async fn request_item(
        &self,
        topic: &Topic,
        difficulty: f64,
        context: &LearnerContext,
    ) -> (Item, Option<Notice>) {
        let result = self
            .with_retries("item", &topic.id, move || async move {
                let item = self.generator.generate_item(topic, difficulty, context).await?;
                item.validate(&topic.id)?;
                Ok::<Item, GeneratorError>(item)
            })
            .await;
        match result {
            Ok(item) => (item, None),
            Err(_) => {
                let item = self
                    .fallback
                    .item_for(topic, difficulty, context, ItemOrigin::Fallback);
                (item, Some(Notice::FallbackItem(topic.id.clone())))
            }
        }
    }

    /// Runs a generator call under the configured timeout, up to the
    /// configured number of attempts.
    async fn with_retries<T, F, Fut>(
        &self,
        what: &'static str,
        topic_id: &str,
        mut call: F,
    ) -> Result<T, GeneratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GeneratorError>>,
    {
        let attempts = self.config.generator_attempts.max(1);
        let mut last = GeneratorError::Unavailable("no attempt made".into());
        for attempt in 1..=attempts {
            let result = match timeout(self.config.generator_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout(self.config.generator_timeout)),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        what,
                        topic_id,
                        attempt,
                        generator = self.generator.name(),
                        error = %err,
                        "generator call failed"
                    );
                    last = err;
                }
            }
        }
        Err(last)
    }
}

fn reprompt(state: &SessionState, turn: &mut Turn) {
    if let Some(pending) = state.pending() {
        turn.say(pending.item.render());
    }
}

/// Topic base difficulty nudged by mastery, then by the session level.
pub fn target_difficulty(topic: &Topic, record: &MasteryRecord, level: DifficultyLevel) -> f64 {
    (topic.difficulty + MASTERY_SHIFT * (record.score - 0.5) + level.offset()).clamp(0.0, 1.0)
}

fn greeting(graph: &KnowledgeGraph, profile: &LearnerProfile, mastered_threshold: f64) -> String {
    let opening = if profile.records.is_empty() {
        "Welcome to QuantCoach! We'll start with the foundations and build up.".to_string()
    } else {
        format!(
            "Welcome back! {}",
            progress_text(graph, profile, mastered_threshold)
        )
    };
    format!(
        "{opening}\nEducational content only, not trading advice.\n\
         Commands: explain, continue, skip, progress, paths, path <name>, exit."
    )
}

fn progress_text(graph: &KnowledgeGraph, profile: &LearnerProfile, mastered_threshold: f64) -> String {
    let stats = &profile.stats;
    let mut out = format!(
        "Progress: {}/{} topics mastered, {:.0}% accuracy over {} answers, streak {} (best {}).",
        stats.topics_mastered,
        graph.len(),
        stats.accuracy() * 100.0,
        stats.total_attempts,
        stats.current_streak,
        stats.longest_streak
    );
    for path in graph.paths() {
        let mastered = path
            .topic_ids
            .iter()
            .filter(|id| profile.mastery(id) >= mastered_threshold)
            .count();
        out.push_str(&format!(
            "\n- {}: {}/{} mastered",
            path.name,
            mastered,
            path.topic_ids.len()
        ));
    }
    out
}

fn paths_text(graph: &KnowledgeGraph, focus: Option<&str>) -> String {
    let mut out = String::from("Learning paths:");
    for path in graph.paths() {
        let marker = if focus.is_some_and(|f| f.eq_ignore_ascii_case(&path.name)) {
            " (current focus)"
        } else {
            ""
        };
        out.push_str(&format!(
            "\n- {} [{}], {} topics{marker}",
            path.name,
            path.domain.display_name(),
            path.topic_ids.len()
        ));
    }
    out.push_str("\nType `path <name>` to focus on one, `path all` to clear.");
    out
}

fn caught_up_text(next_due_at: Option<i64>, focus: Option<&LearningPath>) -> String {
    let scope = focus
        .map(|p| format!(" in the {} path", p.name))
        .unwrap_or_default();
    match next_due_at {
        Some(at) => format!(
            "You're all caught up{scope}. The next review is due {}.",
            format_ms(at)
        ),
        None if focus.is_some() => format!(
            "Nothing is available{scope} yet. Type `path all` to study everything."
        ),
        None => "You've worked through everything available. Great job!".to_string(),
    }
}

fn feedback_text(
    graph: &KnowledgeGraph,
    item: &Item,
    correct: bool,
    previous: &MasteryRecord,
    record: &MasteryRecord,
) -> String {
    let name = graph
        .topic(&item.topic_id)
        .map(|t| t.name.as_str())
        .unwrap_or(item.topic_id.as_str());
    let mut out = if correct {
        "Correct!".to_string()
    } else {
        format!("Not quite. The answer is {}.", item.expected_answer())
    };
    if let Some(explanation) = item.explanation.as_deref().filter(|e| !e.trim().is_empty()) {
        out.push(' ');
        out.push_str(explanation.trim());
    }
    out.push_str(&format!(
        "\nMastery of {name}: {:.0}% -> {:.0}%. Next review {}.",
        previous.score * 100.0,
        record.score * 100.0,
        format_ms(record.next_due_at)
    ));
    out
}
