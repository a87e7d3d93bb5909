use std::time::Duration;

use serde::{Deserialize, Serialize};

const MAX_DOUBLINGS: u32 = 62;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryParams {
    /// Gain applied to the remaining headroom on a correct answer.
    pub alpha: f64,
    /// Share of the current score lost on an incorrect answer.
    pub beta: f64,
    pub mastered_threshold: f64,
    pub base_interval_secs: i64,
    pub max_interval_secs: i64,
    pub latency_smoothing: f64,
}

impl Default for MasteryParams {
    fn default() -> Self {
        Self {
            alpha: 0.25,
            beta: 0.15,
            mastered_threshold: 0.85,
            base_interval_secs: 600,
            max_interval_secs: 60 * 86_400,
            latency_smoothing: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub topic_id: String,
    pub score: f64,
    pub consecutive_correct: u32,
    pub attempts: u32,
    #[serde(default)]
    pub correct_count: u32,
    pub created_at: i64,
    pub last_reviewed_at: i64,
    pub next_due_at: i64,
    #[serde(default)]
    pub mean_latency_ms: Option<f64>,
}

impl MasteryRecord {
    pub fn new(topic_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            topic_id: topic_id.into(),
            score: 0.0,
            consecutive_correct: 0,
            attempts: 0,
            correct_count: 0,
            created_at: now_ms,
            last_reviewed_at: now_ms,
            next_due_at: now_ms,
            mean_latency_ms: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.attempts == 0
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        !self.is_new() && self.next_due_at <= now_ms
    }

    pub fn overdue_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.next_due_at)
    }

    pub fn interval_ms(&self) -> i64 {
        self.next_due_at - self.last_reviewed_at
    }

    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.attempts as f64
        }
    }
}

/// `base * 2^consecutive_correct`, capped at the configured maximum.
pub fn spacing_interval_ms(params: &MasteryParams, consecutive_correct: u32) -> i64 {
    let base_ms = params.base_interval_secs.max(0).saturating_mul(1000);
    let max_ms = params.max_interval_secs.max(0).saturating_mul(1000);
    let doublings = consecutive_correct.min(MAX_DOUBLINGS);
    base_ms.saturating_mul(1i64 << doublings).min(max_ms)
}

pub fn next_score(score: f64, correct: bool, params: &MasteryParams) -> f64 {
    let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
    let next = if correct {
        score + params.alpha * (1.0 - score)
    } else {
        score - params.beta * score
    };
    next.clamp(0.0, 1.0)
}

/// Folds one scored answer into a record and reschedules it.
pub fn apply_outcome(
    record: &MasteryRecord,
    correct: bool,
    latency: Duration,
    now_ms: i64,
    params: &MasteryParams,
) -> MasteryRecord {
    let consecutive_correct = if correct {
        record.consecutive_correct.saturating_add(1)
    } else {
        0
    };
    let latency_ms = latency.as_millis().min(u64::MAX as u128) as f64;
    let mean_latency_ms = Some(match record.mean_latency_ms {
        Some(prev) => {
            let w = params.latency_smoothing.clamp(0.0, 1.0);
            prev * (1.0 - w) + latency_ms * w
        }
        None => latency_ms,
    });

    MasteryRecord {
        topic_id: record.topic_id.clone(),
        score: next_score(record.score, correct, params),
        consecutive_correct,
        attempts: record.attempts.saturating_add(1),
        correct_count: record.correct_count.saturating_add(u32::from(correct)),
        created_at: record.created_at,
        last_reviewed_at: now_ms,
        next_due_at: now_ms.saturating_add(spacing_interval_ms(params, consecutive_correct)),
        mean_latency_ms,
    }
}
