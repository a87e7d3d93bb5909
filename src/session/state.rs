use std::collections::VecDeque;

use serde::Serialize;
use uuid::Uuid;

use crate::curriculum::DifficultyLevel;
use crate::generator::{ChatMessage, Item};

#[derive(Debug, Clone, Serialize)]
pub struct PendingItem {
    pub item: Item,
    pub presented_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingResponse(PendingItem),
    /// The pending item has been taken for scoring.
    Scoring,
    Ended,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingResponse(_) => "awaiting_response",
            Self::Scoring => "scoring",
            Self::Ended => "ended",
        }
    }
}

/// Everything a session remembers between messages. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub learner_id: String,
    pub started_at: i64,
    pub phase: SessionPhase,
    pub current_topic: Option<String>,
    pub focus_path: Option<String>,
    pub level: DifficultyLevel,
    pub turn_count: u32,
    pub answered: u32,
    pub correct: u32,
    pub history: VecDeque<ChatMessage>,
    pub last_explanation: Option<String>,
}

impl SessionState {
    pub fn new(learner_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            learner_id: learner_id.into(),
            started_at: now_ms,
            phase: SessionPhase::Idle,
            current_topic: None,
            focus_path: None,
            level: DifficultyLevel::default(),
            turn_count: 0,
            answered: 0,
            correct: 0,
            history: VecDeque::new(),
            last_explanation: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, SessionPhase::Ended)
    }

    pub fn pending(&self) -> Option<&PendingItem> {
        match &self.phase {
            SessionPhase::AwaitingResponse(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn accuracy(&self) -> Option<f64> {
        (self.answered > 0).then(|| self.correct as f64 / self.answered as f64)
    }

    pub fn record_answer(&mut self, correct: bool) {
        self.answered += 1;
        if correct {
            self.correct += 1;
        }
    }

    /// Steps the level once enough answers are in: down below `lower`
    /// accuracy, up above `upper`.
    pub fn adapt_level(&mut self, min_answers: u32, lower: f64, upper: f64) -> bool {
        if self.answered < min_answers {
            return false;
        }
        let Some(accuracy) = self.accuracy() else {
            return false;
        };
        let next = if accuracy < lower {
            self.level.easier()
        } else if accuracy > upper {
            self.level.harder()
        } else {
            self.level
        };
        let changed = next != self.level;
        self.level = next;
        changed
    }

    pub fn remember(&mut self, message: ChatMessage, window: usize) {
        self.history.push_back(message);
        while self.history.len() > window {
            self.history.pop_front();
        }
    }
}
