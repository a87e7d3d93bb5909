use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::mastery::model::MasteryRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub topics_mastered: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_attempts: u64,
    pub total_correct: u64,
}

impl ProfileStats {
    pub fn accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_correct as f64 / self.total_attempts as f64
        }
    }
}

/// Everything persisted for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub learner_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub records: BTreeMap<String, MasteryRecord>,
    #[serde(default)]
    pub stats: ProfileStats,
}

impl LearnerProfile {
    pub fn new(learner_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            learner_id: learner_id.into(),
            created_at: now_ms,
            updated_at: now_ms,
            records: BTreeMap::new(),
            stats: ProfileStats::default(),
        }
    }

    pub fn record(&self, topic_id: &str) -> Option<&MasteryRecord> {
        self.records.get(topic_id)
    }

    /// Create-if-absent: first touch of a topic yields a zeroed record.
    pub fn record_or_create(&mut self, topic_id: &str, now_ms: i64) -> &mut MasteryRecord {
        self.records
            .entry(topic_id.to_string())
            .or_insert_with(|| MasteryRecord::new(topic_id, now_ms))
    }

    pub fn mastery(&self, topic_id: &str) -> f64 {
        self.records.get(topic_id).map(|r| r.score).unwrap_or(0.0)
    }

    pub fn mastery_by_topic(&self) -> HashMap<String, f64> {
        self.records
            .iter()
            .map(|(id, r)| (id.clone(), r.score))
            .collect()
    }

    /// Supersedes the stored record for `record.topic_id` and refreshes stats.
    pub fn apply(&mut self, record: MasteryRecord, correct: bool, mastered_threshold: f64) {
        self.updated_at = self.updated_at.max(record.last_reviewed_at);
        self.records.insert(record.topic_id.clone(), record);

        let stats = &mut self.stats;
        stats.total_attempts += 1;
        if correct {
            stats.total_correct += 1;
            stats.current_streak += 1;
            stats.longest_streak = stats.longest_streak.max(stats.current_streak);
        } else {
            stats.current_streak = 0;
        }
        stats.topics_mastered = self
            .records
            .values()
            .filter(|r| r.score >= mastered_threshold)
            .count() as u32;
    }
}
