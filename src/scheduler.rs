//! Next-topic selection.
//!
//! Only unlocked topics are candidates. Due reviews come first (most
//! overdue, then topic id). Otherwise the easiest topic never attempted,
//! ties broken by graph depth and id.
//! Selection is a pure function of the graph, the profile and the time.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::curriculum::{KnowledgeGraph, LearningPath};
use crate::mastery::{LearnerProfile, MasteryError, MasteryStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextTopic {
    Due { topic_id: String, overdue_ms: i64 },
    New { topic_id: String },
    /// Nothing due and nothing unlocked left to start.
    NoEligibleTopic { next_due_at: Option<i64> },
}

impl NextTopic {
    pub fn topic_id(&self) -> Option<&str> {
        match self {
            Self::Due { topic_id, .. } | Self::New { topic_id } => Some(topic_id),
            Self::NoEligibleTopic { .. } => None,
        }
    }

    pub fn is_review(&self) -> bool {
        matches!(self, Self::Due { .. })
    }
}

pub struct Scheduler {
    mastery: Arc<MasteryStore>,
}

impl Scheduler {
    pub fn new(mastery: Arc<MasteryStore>) -> Self {
        Self { mastery }
    }

    pub async fn next_topic(&self, learner_id: &str) -> Result<NextTopic, MasteryError> {
        self.next_topic_in(learner_id, None).await
    }

    /// Like `next_topic`, restricted to one learning path when given.
    pub async fn next_topic_in(
        &self,
        learner_id: &str,
        focus: Option<&LearningPath>,
    ) -> Result<NextTopic, MasteryError> {
        let profile = self.mastery.profile(learner_id).await?;
        let now = self.mastery.now_ms();
        let next = select_next(self.mastery.graph(), &profile, now, focus);
        debug!(learner_id, ?next, "scheduled");
        Ok(next)
    }
}

pub fn select_next(
    graph: &KnowledgeGraph,
    profile: &LearnerProfile,
    now_ms: i64,
    focus: Option<&LearningPath>,
) -> NextTopic {
    let mastery = profile.mastery_by_topic();
    let mut due: Vec<(i64, &str)> = Vec::new();
    let mut fresh: Vec<(f64, usize, &str)> = Vec::new();
    let mut next_due_at: Option<i64> = None;

    for topic in graph.topics() {
        if let Some(path) = focus {
            if !path.topic_ids.iter().any(|id| id == &topic.id) {
                continue;
            }
        }
        // a prerequisite that slipped below the threshold locks reviews too
        if !graph.is_unlocked(&topic.id, &mastery).unwrap_or(false) {
            continue;
        }
        match profile.record(&topic.id) {
            Some(record) if !record.is_new() => {
                if record.is_due(now_ms) {
                    due.push((record.overdue_ms(now_ms), topic.id.as_str()));
                } else {
                    next_due_at = Some(match next_due_at {
                        Some(t) => t.min(record.next_due_at),
                        None => record.next_due_at,
                    });
                }
            }
            _ => {
                let depth = graph.depth_of(&topic.id).unwrap_or(0);
                fresh.push((topic.difficulty, depth, topic.id.as_str()));
            }
        }
    }

    if let Some(&(overdue_ms, topic_id)) = due
        .iter()
        .min_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)))
    {
        return NextTopic::Due {
            topic_id: topic_id.to_string(),
            overdue_ms,
        };
    }

    fresh
        .iter()
        .min_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(b.2))
        })
        .map(|&(_, _, topic_id)| NextTopic::New {
            topic_id: topic_id.to_string(),
        })
        .unwrap_or(NextTopic::NoEligibleTopic { next_due_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::{Domain, Topic};
    use crate::mastery::MasteryRecord;

    const NOW: i64 = 10_000_000;

    fn graph() -> KnowledgeGraph {
        KnowledgeGraph::new(
            vec![
                Topic::new("prob", "Probability", Domain::Probability, 0.2),
                Topic::new("bayes", "Bayes", Domain::Probability, 0.4).with_prerequisites(["prob"]),
                Topic::new("orders", "Orders", Domain::Trading, 0.2),
                Topic::new("kelly", "Kelly", Domain::Trading, 0.3)
                    .with_prerequisites(["prob", "orders"]),
            ],
            vec![LearningPath {
                name: "Trading".into(),
                domain: Domain::Trading,
                topic_ids: vec!["orders".into(), "kelly".into()],
            }],
        )
        .unwrap()
    }

    fn reviewed(profile: &mut LearnerProfile, id: &str, score: f64, due_at: i64) {
        let mut record = MasteryRecord::new(id, 0);
        record.score = score;
        record.attempts = 1;
        record.next_due_at = due_at;
        profile.records.insert(id.to_string(), record);
    }

    #[test]
    fn test_fresh_learner_gets_easiest_root_by_id() {
        let profile = LearnerProfile::new("u", 0);
        assert_eq!(
            select_next(&graph(), &profile, NOW, None),
            NextTopic::New {
                topic_id: "orders".into()
            }
        );
    }

    #[test]
    fn test_most_overdue_review_wins() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "prob", 0.7, NOW - 100);
        reviewed(&mut profile, "orders", 0.7, NOW - 5_000);
        assert_eq!(
            select_next(&graph(), &profile, NOW, None),
            NextTopic::Due {
                topic_id: "orders".into(),
                overdue_ms: 5_000
            }
        );
    }

    #[test]
    fn test_equal_overdue_breaks_on_id() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "prob", 0.7, NOW - 100);
        reviewed(&mut profile, "orders", 0.7, NOW - 100);
        assert_eq!(
            select_next(&graph(), &profile, NOW, None).topic_id(),
            Some("orders")
        );
    }

    #[test]
    fn test_locked_topics_are_skipped() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "prob", 0.7, NOW + 1_000);
        reviewed(&mut profile, "orders", 0.3, NOW + 500);
        // kelly needs orders >= 0.6; bayes is unlocked by prob.
        assert_eq!(
            select_next(&graph(), &profile, NOW, None).topic_id(),
            Some("bayes")
        );
    }

    #[test]
    fn test_review_waits_while_prerequisite_is_below_threshold() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "prob", 0.55, NOW + 1_000);
        reviewed(&mut profile, "bayes", 0.4, NOW - 10);
        assert_eq!(
            select_next(&graph(), &profile, NOW, None),
            NextTopic::New {
                topic_id: "orders".into()
            }
        );

        // back above the threshold, the overdue review is served again
        profile.records.get_mut("prob").unwrap().score = 0.65;
        assert_eq!(
            select_next(&graph(), &profile, NOW, None),
            NextTopic::Due {
                topic_id: "bayes".into(),
                overdue_ms: 10
            }
        );
    }

    #[test]
    fn test_nothing_eligible_reports_earliest_due() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "orders", 0.3, NOW + 500);
        reviewed(&mut profile, "prob", 0.3, NOW + 200);
        assert_eq!(
            select_next(&graph(), &profile, NOW, None),
            NextTopic::NoEligibleTopic {
                next_due_at: Some(NOW + 200)
            }
        );
    }

    #[test]
    fn test_focus_restricts_to_path() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "prob", 0.9, NOW - 10);
        reviewed(&mut profile, "orders", 0.9, NOW + 10);
        let g = graph();
        let path = g.path("trading").cloned();
        assert_eq!(
            select_next(&g, &profile, NOW, path.as_ref()).topic_id(),
            Some("kelly")
        );
        assert!(select_next(&g, &profile, NOW, None).is_review());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut profile = LearnerProfile::new("u", 0);
        reviewed(&mut profile, "prob", 0.65, NOW - 1);
        let g = graph();
        let first = select_next(&g, &profile, NOW, None);
        for _ in 0..10 {
            assert_eq!(select_next(&g, &profile, NOW, None), first);
        }
    }
}
