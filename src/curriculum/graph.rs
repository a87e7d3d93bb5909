use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::curriculum::topic::{Domain, LearningPath, QuestionSpec, Topic};
use crate::curriculum::CatalogError;

pub const DEFAULT_UNLOCK_THRESHOLD: f64 = 0.6;

const BUILTIN_CATALOG: &str = include_str!("default_catalog.json");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    learning_paths: Vec<PathEntry>,
}

#[derive(Debug, Deserialize)]
struct PathEntry {
    name: String,
    domain: Domain,
    topics: Vec<TopicEntry>,
}

#[derive(Debug, Deserialize)]
struct TopicEntry {
    id: String,
    name: String,
    #[serde(default)]
    domain: Option<Domain>,
    #[serde(default)]
    prerequisites: Vec<String>,
    difficulty: f64,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    questions: Vec<QuestionSpec>,
}

/// Read-only topic catalog. Topics are kept in curriculum order: every topic
/// appears after all of its prerequisites, otherwise declaration order wins.
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    topics: Vec<Topic>,
    index: HashMap<String, usize>,
    depths: Vec<usize>,
    paths: Vec<LearningPath>,
    unlock_threshold: f64,
}

impl KnowledgeGraph {
    pub fn new(topics: Vec<Topic>, paths: Vec<LearningPath>) -> Result<Self, CatalogError> {
        let mut declared: HashMap<&str, usize> = HashMap::with_capacity(topics.len());
        for (i, topic) in topics.iter().enumerate() {
            if topic.id.trim().is_empty() {
                return Err(CatalogError::Invalid("topic with empty id".to_string()));
            }
            if !topic.difficulty.is_finite() || !(0.0..=1.0).contains(&topic.difficulty) {
                return Err(CatalogError::Invalid(format!(
                    "difficulty of {} must be within [0, 1], got {}",
                    topic.id, topic.difficulty
                )));
            }
            if declared.insert(topic.id.as_str(), i).is_some() {
                return Err(CatalogError::DuplicateTopic(topic.id.clone()));
            }
        }
        for topic in &topics {
            for prereq in &topic.prerequisites {
                if !declared.contains_key(prereq.as_str()) {
                    return Err(CatalogError::UnknownPrerequisite {
                        topic: topic.id.clone(),
                        prerequisite: prereq.clone(),
                    });
                }
            }
        }
        for path in &paths {
            for id in &path.topic_ids {
                if !declared.contains_key(id.as_str()) {
                    return Err(CatalogError::UnknownTopic(id.clone()));
                }
            }
        }

        let order = curriculum_order(&topics, &declared)?;

        let mut slots: Vec<Option<Topic>> = topics.into_iter().map(Some).collect();
        let ordered: Vec<Topic> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        let index: HashMap<String, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        let mut depths = vec![0usize; ordered.len()];
        for (i, topic) in ordered.iter().enumerate() {
            depths[i] = topic
                .prerequisites
                .iter()
                .filter_map(|p| index.get(p))
                .map(|&j| depths[j] + 1)
                .max()
                .unwrap_or(0);
        }

        Ok(Self {
            topics: ordered,
            index,
            depths,
            paths,
            unlock_threshold: DEFAULT_UNLOCK_THRESHOLD,
        })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut topics = Vec::new();
        let mut paths = Vec::with_capacity(file.learning_paths.len());

        for entry in file.learning_paths {
            let topic_ids = entry.topics.iter().map(|t| t.id.clone()).collect();
            for t in entry.topics {
                topics.push(Topic {
                    id: t.id,
                    name: t.name,
                    domain: t.domain.unwrap_or(entry.domain),
                    prerequisites: t.prerequisites,
                    difficulty: t.difficulty,
                    keywords: t.keywords,
                    summary: t.summary,
                    questions: t.questions,
                    path: Some(entry.name.clone()),
                });
            }
            paths.push(LearningPath {
                name: entry.name,
                domain: entry.domain,
                topic_ids,
            });
        }

        Self::new(topics, paths)
    }

    pub fn with_unlock_threshold(mut self, threshold: f64) -> Self {
        self.unlock_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn unlock_threshold(&self) -> f64 {
        self.unlock_threshold
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn contains(&self, topic_id: &str) -> bool {
        self.index.contains_key(topic_id)
    }

    pub fn topic(&self, topic_id: &str) -> Option<&Topic> {
        self.index.get(topic_id).map(|&i| &self.topics[i])
    }

    pub fn get(&self, topic_id: &str) -> Result<&Topic, CatalogError> {
        self.topic(topic_id)
            .ok_or_else(|| CatalogError::UnknownTopic(topic_id.to_string()))
    }

    pub fn prerequisites_of(&self, topic_id: &str) -> Result<&[String], CatalogError> {
        self.get(topic_id).map(|t| t.prerequisites.as_slice())
    }

    /// Length of the longest prerequisite chain below `topic_id`.
    pub fn depth_of(&self, topic_id: &str) -> Result<usize, CatalogError> {
        self.index
            .get(topic_id)
            .map(|&i| self.depths[i])
            .ok_or_else(|| CatalogError::UnknownTopic(topic_id.to_string()))
    }

    /// A topic is unlocked when every prerequisite reaches the unlock
    /// threshold. Topics absent from `mastery_by_topic` count as zero.
    pub fn is_unlocked(
        &self,
        topic_id: &str,
        mastery_by_topic: &HashMap<String, f64>,
    ) -> Result<bool, CatalogError> {
        let prerequisites = self.prerequisites_of(topic_id)?;
        Ok(prerequisites.iter().all(|p| {
            mastery_by_topic.get(p).copied().unwrap_or(0.0) >= self.unlock_threshold
        }))
    }

    pub fn paths(&self) -> &[LearningPath] {
        &self.paths
    }

    pub fn path(&self, name: &str) -> Option<&LearningPath> {
        let wanted = name.trim();
        self.paths
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
    }
}

fn curriculum_order(
    topics: &[Topic],
    declared: &HashMap<&str, usize>,
) -> Result<Vec<usize>, CatalogError> {
    let mut indegree = vec![0usize; topics.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); topics.len()];
    for (i, topic) in topics.iter().enumerate() {
        for prereq in &topic.prerequisites {
            let p = declared[prereq.as_str()];
            indegree[i] += 1;
            dependents[p].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(topics.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }

    if order.len() < topics.len() {
        let mut stuck: Vec<String> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0)
            .map(|(i, _)| topics[i].id.clone())
            .collect();
        stuck.sort();
        return Err(CatalogError::Cycle(stuck));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> KnowledgeGraph {
        KnowledgeGraph::new(
            vec![
                Topic::new("bayes", "Bayes", Domain::Probability, 0.4)
                    .with_prerequisites(["cond"]),
                Topic::new("cond", "Conditional", Domain::Probability, 0.2),
                Topic::new("kelly", "Kelly", Domain::Trading, 0.7)
                    .with_prerequisites(["bayes", "ev"]),
                Topic::new("ev", "Expected value", Domain::Probability, 0.3),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_topics_follow_prerequisites() {
        let g = graph();
        let ids: Vec<&str> = g.topics().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["cond", "bayes", "ev", "kelly"]);
    }

    #[test]
    fn test_depths() {
        let g = graph();
        assert_eq!(g.depth_of("cond").unwrap(), 0);
        assert_eq!(g.depth_of("bayes").unwrap(), 1);
        assert_eq!(g.depth_of("kelly").unwrap(), 2);
    }

    #[test]
    fn test_unknown_topic() {
        let g = graph();
        assert!(matches!(
            g.prerequisites_of("nope"),
            Err(CatalogError::UnknownTopic(id)) if id == "nope"
        ));
        assert!(g.is_unlocked("nope", &HashMap::new()).is_err());
    }

    #[test]
    fn test_is_unlocked_threshold() {
        let g = graph();
        let mut mastery = HashMap::new();
        assert!(g.is_unlocked("cond", &mastery).unwrap());
        assert!(!g.is_unlocked("bayes", &mastery).unwrap());

        mastery.insert("cond".to_string(), 0.59);
        assert!(!g.is_unlocked("bayes", &mastery).unwrap());
        mastery.insert("cond".to_string(), 0.6);
        assert!(g.is_unlocked("bayes", &mastery).unwrap());

        mastery.insert("bayes".to_string(), 0.9);
        assert!(!g.is_unlocked("kelly", &mastery).unwrap());
        mastery.insert("ev".to_string(), 0.7);
        assert!(g.is_unlocked("kelly", &mastery).unwrap());
    }

    #[test]
    fn test_custom_threshold() {
        let g = graph().with_unlock_threshold(0.9);
        let mastery = HashMap::from([("cond".to_string(), 0.8)]);
        assert!(!g.is_unlocked("bayes", &mastery).unwrap());
    }

    #[test]
    fn test_cycle_rejected() {
        let err = KnowledgeGraph::new(
            vec![
                Topic::new("a", "A", Domain::Ml, 0.1).with_prerequisites(["c"]),
                Topic::new("b", "B", Domain::Ml, 0.1).with_prerequisites(["a"]),
                Topic::new("c", "C", Domain::Ml, 0.1).with_prerequisites(["b"]),
                Topic::new("d", "D", Domain::Ml, 0.1),
            ],
            vec![],
        )
        .unwrap_err();
        match err {
            CatalogError::Cycle(ids) => assert_eq!(ids, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_prerequisite_is_cycle() {
        let err = KnowledgeGraph::new(
            vec![Topic::new("a", "A", Domain::Ml, 0.1).with_prerequisites(["a"])],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Cycle(_)));
    }

    #[test]
    fn test_duplicate_and_unknown_prerequisite() {
        let dup = KnowledgeGraph::new(
            vec![
                Topic::new("a", "A", Domain::Ml, 0.1),
                Topic::new("a", "A again", Domain::Ml, 0.2),
            ],
            vec![],
        );
        assert!(matches!(dup, Err(CatalogError::DuplicateTopic(_))));

        let missing = KnowledgeGraph::new(
            vec![Topic::new("a", "A", Domain::Ml, 0.1).with_prerequisites(["ghost"])],
            vec![],
        );
        assert!(matches!(
            missing,
            Err(CatalogError::UnknownPrerequisite { .. })
        ));
    }

    #[test]
    fn test_difficulty_out_of_range() {
        let err = KnowledgeGraph::new(vec![Topic::new("a", "A", Domain::Ml, 1.5)], vec![]);
        assert!(matches!(err, Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let g = KnowledgeGraph::builtin().unwrap();
        assert!(g.len() >= 10);
        assert_eq!(g.topics()[0].id, "conditional-probability");
        assert!(g.prerequisites_of("conditional-probability").unwrap().is_empty());
        assert_eq!(g.paths().len(), 3);
        assert!(g.path("quantitative trading").is_some());
        for topic in g.topics() {
            assert!(topic.path.is_some(), "{} has no path", topic.id);
            assert!(!topic.questions.is_empty(), "{} has no questions", topic.id);
        }
    }

    #[test]
    fn test_from_json_inherits_path_domain() {
        let raw = r#"{
            "learning_paths": [
                {
                    "name": "Basics",
                    "domain": "probability",
                    "topics": [
                        { "id": "coin", "name": "Coin flips", "difficulty": 0.1 },
                        { "id": "dice", "name": "Dice", "difficulty": 0.2,
                          "prerequisites": ["coin"], "domain": "trading" }
                    ]
                }
            ]
        }"#;
        let g = KnowledgeGraph::from_json(raw).unwrap();
        assert_eq!(g.topic("coin").unwrap().domain, Domain::Probability);
        assert_eq!(g.topic("dice").unwrap().domain, Domain::Trading);
        assert_eq!(g.topic("dice").unwrap().path.as_deref(), Some("Basics"));
        assert_eq!(g.path("basics").unwrap().topic_ids, vec!["coin", "dice"]);
    }
}
