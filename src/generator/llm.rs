use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::curriculum::{DifficultyLevel, Domain, Topic};
use crate::generator::{
    ContentGenerator, GeneratorError, Item, ItemOrigin, LearnerContext, QuestionKind,
};
use crate::scoring::{parse_number, ScoringHint};

const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_API_ENDPOINT: &str = "https://api.groq.com/openai/v1";
const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 120;
const DEFAULT_MAX_RETRIES: usize = 2;
const ITEM_MAX_TOKENS: u32 = 400;
const BASE_BACKOFF_MS: u64 = 200;

const TUTOR_PROMPT: &str = "You are QuantCoach, an educational assistant for probability, \
machine learning and quantitative trading.

Your role is to help the learner UNDERSTAND concepts, not to give trading advice.

You CANNOT and DO NOT:
- Provide trading recommendations or investment advice
- Predict market movements or give stock picks
- Access real market data or execute trades

All content is for educational purposes only. Trading involves substantial risk \
and past performance does not guarantee future results.";

const EXPLAIN_STYLE: &str = "Keep responses to 2-3 complete sentences. If you have more \
to say, end your response with \"...\" to show that more is available. Never stop mid-sentence.";

const CONTINUE_STYLE: &str = "IMPORTANT: You are continuing from an incomplete reply. \
Complete the sentence that was cut off, then add 1-2 more complete sentences.";

const ITEM_FORMAT: &str = "Reply with ONE JSON object and nothing else, using these fields:
{\"question\": string, \"choices\": [string] (empty unless multiple choice), \
\"answer\": string (the option letter for multiple choice, a number for numeric), \
\"tolerance\": number or null, \"keywords\": [string] (key ideas a correct short answer mentions), \
\"explanation\": string}";

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: usize,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl LLMConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_string("LLM_API_KEY").or_else(|| env_string("GROQ_API_KEY")),
            model: env_string("LLM_MODEL").unwrap_or(defaults.model),
            api_endpoint: normalize_endpoint(
                env_string("LLM_API_ENDPOINT")
                    .or_else(|| env_string("LLM_BASE_URL"))
                    .unwrap_or(defaults.api_endpoint),
            ),
            timeout: env_parse::<u64>("LLM_TIMEOUT")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(defaults.temperature),
            max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            max_retries: env_parse("LLM_MAX_RETRIES").unwrap_or(defaults.max_retries),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.model.trim().is_empty()
            && !self.api_endpoint.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

#[derive(Clone)]
pub struct LLMProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LLMProvider {
    pub fn new(config: LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(LLMConfig::from_env())
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn is_available(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ChatResponse, LLMError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LLMError::NotConfigured("LLM_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": max_tokens,
            "stream": false
        });

        self.post_with_retry(&url, api_key, &payload).await
    }

    pub async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String, LLMError> {
        let response = self.chat(messages, max_tokens).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = response.model.as_deref().unwrap_or(&self.config.model),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "LLM completion"
            );
        }
        response
            .first_content()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(LLMError::EmptyChoices)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, LLMError> {
        let max_retries = self.config.max_retries;
        let mut last_error: Option<LLMError> = None;

        for retry in 0..=max_retries {
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            warn!(error = %e, body = %String::from_utf8_lossy(&bytes), "unparseable LLM response");
                            LLMError::Json(e)
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = LLMError::HttpStatus { status, body };
                    if retry < max_retries && is_retryable(status) {
                        warn!(retry, ?status, "LLM request failed, retrying");
                        sleep(backoff(retry)).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = LLMError::Request(e);
                    if retry < max_retries {
                        warn!(retry, error = %err, "LLM request error, retrying");
                        sleep(backoff(retry)).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(LLMError::NotConfigured("unknown")))
    }
}

/// Content generator backed by an OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct LlmGenerator {
    provider: LLMProvider,
}

impl LlmGenerator {
    /// The session engine retries item requests itself, so each attempt
    /// here is a single HTTP call.
    pub fn new(provider: LLMProvider) -> Self {
        Self {
            provider: provider.with_max_retries(0),
        }
    }

    async fn generate(
        &self,
        topic: &Topic,
        difficulty: f64,
        context: &LearnerContext,
    ) -> Result<Item, GeneratorError> {
        if !self.provider.is_available() {
            return Err(GeneratorError::Unavailable("no LLM API key configured".into()));
        }
        let kind = question_kind_for(topic, context.attempts);
        let messages = vec![
            ChatMessage::system(format!(
                "{TUTOR_PROMPT}\n\n{}\n{ITEM_FORMAT}",
                context_block(topic, context)
            )),
            ChatMessage::user(item_request(topic, difficulty, kind)),
        ];
        let raw = self
            .provider
            .complete(&messages, self.provider.config().max_tokens.max(ITEM_MAX_TOKENS))
            .await?;
        parse_item(topic, difficulty, &raw)
    }

    async fn explain_topic(
        &self,
        topic: &Topic,
        context: &LearnerContext,
    ) -> Result<String, GeneratorError> {
        if !self.provider.is_available() {
            return Err(GeneratorError::Unavailable("no LLM API key configured".into()));
        }
        let (style, request) = match &context.continue_from {
            Some(previous) => (
                CONTINUE_STYLE,
                format!("Please complete this incomplete reply and continue: \"{previous}\""),
            ),
            None => (
                EXPLAIN_STYLE,
                format!(
                    "Tell me more about {} ({}). {}",
                    topic.name,
                    topic.domain.display_name(),
                    match context.level {
                        DifficultyLevel::Easy => "Keep it intuitive.",
                        DifficultyLevel::Mid => "Include the key formula.",
                        DifficultyLevel::Hard => {
                            "Include the formula and one subtle pitfall."
                        }
                    }
                ),
            ),
        };

        let mut messages = vec![ChatMessage::system(format!(
            "{TUTOR_PROMPT}\n\n{}\n{style}",
            context_block(topic, context)
        ))];
        messages.extend(context.history.iter().cloned());
        messages.push(ChatMessage::user(request));

        Ok(self
            .provider
            .complete(&messages, self.provider.config().max_tokens)
            .await?)
    }
}

impl ContentGenerator for LlmGenerator {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn generate_item<'a>(
        &'a self,
        topic: &'a Topic,
        difficulty: f64,
        context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<Item, GeneratorError>> {
        Box::pin(self.generate(topic, difficulty, context))
    }

    fn explain<'a>(
        &'a self,
        topic: &'a Topic,
        context: &'a LearnerContext,
    ) -> BoxFuture<'a, Result<String, GeneratorError>> {
        Box::pin(self.explain_topic(topic, context))
    }
}

/// Alternates question styles across attempts; probability favours numbers.
pub fn question_kind_for(topic: &Topic, attempts: u32) -> QuestionKind {
    match (topic.domain, attempts % 2) {
        (Domain::Probability, 0) => QuestionKind::Numeric,
        (_, 0) => QuestionKind::MultipleChoice,
        (Domain::Probability, _) => QuestionKind::MultipleChoice,
        _ => QuestionKind::ShortAnswer,
    }
}

fn context_block(topic: &Topic, context: &LearnerContext) -> String {
    let mut out = format!(
        "Current topic: {} ({}). Learner mastery: {:.0}% over {} attempts. Target level: {}.",
        topic.name,
        topic.domain.display_name(),
        context.mastery * 100.0,
        context.attempts,
        context.level.as_str()
    );
    if let Some(accuracy) = context.session_accuracy {
        out.push_str(&format!(
            "\nThis session: {:.0}% correct, {} in a row on this topic.",
            accuracy * 100.0,
            context.consecutive_correct
        ));
    }
    if let Some(path) = &context.focus_path {
        out.push_str(&format!("\nLearner has selected learning path: {path}."));
    }
    if !topic.summary.is_empty() {
        out.push_str(&format!("\nTopic summary: {}", topic.summary));
    }
    out
}

fn item_request(topic: &Topic, difficulty: f64, kind: QuestionKind) -> String {
    let shape = match kind {
        QuestionKind::MultipleChoice => "a multiple choice question with 4 options (A, B, C, D)",
        QuestionKind::ShortAnswer => "a short answer question that needs a brief explanation",
        QuestionKind::Numeric => "a question whose answer is a single number",
    };
    format!(
        "Give me {shape} about {} at {} difficulty ({:.2} on a 0-1 scale).",
        topic.name,
        DifficultyLevel::from_difficulty(difficulty).as_str(),
        difficulty
    )
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    question: String,
    #[serde(default)]
    choices: Vec<String>,
    answer: serde_json::Value,
    #[serde(default)]
    tolerance: Option<f64>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Parses the model's JSON reply, tolerating code fences and chatter
/// around the object.
pub fn parse_item(topic: &Topic, difficulty: f64, raw: &str) -> Result<Item, GeneratorError> {
    let start = raw
        .find('{')
        .ok_or_else(|| GeneratorError::Malformed("no JSON object in reply".into()))?;
    let end = raw
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| GeneratorError::Malformed("unterminated JSON object".into()))?;
    let parsed: GeneratedQuestion = serde_json::from_str(&raw[start..=end])
        .map_err(|e| GeneratorError::Malformed(e.to_string()))?;

    let answer = match &parsed.answer {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(GeneratorError::Malformed(format!(
                "answer must be a string or number, got {other}"
            )))
        }
    };
    let choices: Vec<String> = parsed
        .choices
        .iter()
        .map(|c| strip_option_label(c).to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let keywords: Vec<String> = parsed
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    let (kind, scoring) = if !choices.is_empty() {
        (QuestionKind::MultipleChoice, ScoringHint::Choice)
    } else if parse_number(&answer).is_some() {
        let scoring = match parsed.tolerance {
            Some(tolerance) if tolerance.is_finite() && tolerance > 0.0 => ScoringHint::Numeric {
                tolerance,
                relative: false,
            },
            _ => ScoringHint::default_for(topic.domain, &answer, &[]),
        };
        (QuestionKind::Numeric, scoring)
    } else if !keywords.is_empty() {
        (
            QuestionKind::ShortAnswer,
            ScoringHint::keywords_for(topic.domain, keywords),
        )
    } else {
        (
            QuestionKind::ShortAnswer,
            ScoringHint::default_for(topic.domain, &answer, &topic.keywords),
        )
    };

    let item = Item {
        id: Uuid::new_v4(),
        topic_id: topic.id.clone(),
        difficulty,
        kind,
        prompt: parsed.question.trim().to_string(),
        choices,
        answer_key: answer,
        scoring,
        explanation: parsed.explanation.filter(|e| !e.trim().is_empty()),
        origin: ItemOrigin::Generated,
    };
    item.validate(&topic.id)?;
    Ok(item)
}

/// "A) Market order" and "a. Market order" become "Market order".
fn strip_option_label(choice: &str) -> &str {
    let trimmed = choice.trim();
    let mut chars = trimmed.char_indices();
    if let (Some((_, c)), Some((i, sep))) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() && matches!(sep, ')' | '.' | ':') {
            return trimmed[i + sep.len_utf8()..].trim();
        }
    }
    trimmed
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.trim().parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn backoff(retry: usize) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * (1 << retry.min(6)))
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
