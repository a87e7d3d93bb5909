use futures::future::BoxFuture;
use uuid::Uuid;

use crate::curriculum::{QuestionSpec, Topic};
use crate::generator::{
    ContentGenerator, GeneratorError, Item, ItemOrigin, LearnerContext, QuestionKind,
};
use crate::scoring::{parse_number, ScoringHint};

/// Serves the question bank stored with each topic.
///
/// Questions rotate with the learner's attempt count so a review does not
/// repeat the previous question. Topics without a bank get a keyword-graded
/// "explain it in your own words" prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogGenerator;

impl CatalogGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn item_for(
        &self,
        topic: &Topic,
        difficulty: f64,
        context: &LearnerContext,
        origin: ItemOrigin,
    ) -> Item {
        if topic.questions.is_empty() {
            return generic_item(topic, difficulty, origin);
        }
        let index = context.attempts as usize % topic.questions.len();
        from_question(topic, &topic.questions[index], difficulty, origin)
    }

    pub fn explanation_for(&self, topic: &Topic) -> String {
        if topic.summary.trim().is_empty() {
            format!(
                "{} is part of the {} track. Try a question on it and I will walk you through the answer.",
                topic.name,
                topic.domain.display_name()
            )
        } else {
            topic.summary.trim().to_string()
        }
    }
}

impl ContentGenerator for CatalogGenerator {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn generate_item<'a>(
        &'a self,
        topic: &'a Topic,
        difficulty: f64,
        context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<Item, GeneratorError>> {
        let item = self.item_for(topic, difficulty, context, ItemOrigin::Generated);
        Box::pin(async move { Ok(item) })
    }

    fn explain<'a>(
        &'a self,
        topic: &'a Topic,
        _context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<String, GeneratorError>> {
        let text = self.explanation_for(topic);
        Box::pin(async move { Ok(text) })
    }
}

fn from_question(topic: &Topic, question: &QuestionSpec, difficulty: f64, origin: ItemOrigin) -> Item {
    let kind = if !question.choices.is_empty() {
        QuestionKind::MultipleChoice
    } else if parse_number(&question.answer).is_some() {
        QuestionKind::Numeric
    } else {
        QuestionKind::ShortAnswer
    };
    let scoring = match (&question.scoring, kind) {
        (Some(hint), _) => hint.clone(),
        (None, QuestionKind::MultipleChoice) => ScoringHint::Choice,
        (None, _) => ScoringHint::default_for(topic.domain, &question.answer, &topic.keywords),
    };
    Item {
        id: Uuid::new_v4(),
        topic_id: topic.id.clone(),
        difficulty,
        kind,
        prompt: question.prompt.clone(),
        choices: question.choices.clone(),
        answer_key: question.answer.clone(),
        scoring,
        explanation: question.explanation.clone(),
        origin,
    }
}

fn generic_item(topic: &Topic, difficulty: f64, origin: ItemOrigin) -> Item {
    let keywords = if topic.keywords.is_empty() {
        vec![topic.name.to_lowercase()]
    } else {
        topic.keywords.clone()
    };
    Item {
        id: Uuid::new_v4(),
        topic_id: topic.id.clone(),
        difficulty,
        kind: QuestionKind::ShortAnswer,
        prompt: format!(
            "In a sentence or two, explain {} in your own words.",
            topic.name
        ),
        choices: Vec::new(),
        answer_key: keywords.join(", "),
        scoring: ScoringHint::Keywords {
            keywords,
            min_matches: 1,
        },
        explanation: (!topic.summary.is_empty()).then(|| topic.summary.clone()),
        origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::{Domain, KnowledgeGraph};

    #[tokio::test]
    async fn test_rotates_through_bank() {
        let graph = KnowledgeGraph::builtin().unwrap();
        let topic = graph.get("conditional-probability").unwrap();
        let generator = CatalogGenerator::new();
        let mut ctx = LearnerContext::default();
        let first = generator.generate_item(topic, 0.2, &ctx).await.unwrap();
        ctx.attempts = 1;
        let second = generator.generate_item(topic, 0.2, &ctx).await.unwrap();
        assert_ne!(first.prompt, second.prompt);
        assert!(first.validate(&topic.id).is_ok());
        assert!(second.validate(&topic.id).is_ok());
    }

    #[test]
    fn test_every_builtin_question_is_answerable() {
        let graph = KnowledgeGraph::builtin().unwrap();
        let generator = CatalogGenerator::new();
        for topic in graph.topics() {
            for attempts in 0..topic.questions.len() as u32 {
                let ctx = LearnerContext {
                    attempts,
                    ..Default::default()
                };
                let item = generator.item_for(topic, topic.difficulty, &ctx, ItemOrigin::Fallback);
                item.validate(&topic.id).unwrap();
                let key = item.answer_key.clone();
                assert!(item.score(&key).correct, "{}: {}", topic.id, item.prompt);
            }
        }
    }

    #[test]
    fn test_generic_item_without_bank() {
        let topic = Topic::new("drift", "Drift", Domain::Trading, 0.4)
            .with_keywords(["trend", "mean"]);
        let item = CatalogGenerator::new().item_for(
            &topic,
            0.4,
            &LearnerContext::default(),
            ItemOrigin::Fallback,
        );
        assert_eq!(item.kind, QuestionKind::ShortAnswer);
        assert_eq!(item.origin, ItemOrigin::Fallback);
        assert!(item.score("it follows the trend").correct);
        assert!(!item.score("no clue").correct);
    }
}
