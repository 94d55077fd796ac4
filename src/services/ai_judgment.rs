use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::core::config::Settings;

const JUDGMENT_SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading short free-text answers.

You receive a JSON object:
{
  "question": "the question the student answered",
  "preferred_answer": "a reference answer or rubric, may be null",
  "answer": "the student's answer"
}

Decide whether the student's answer correctly answers the question.
Judge the meaning, not the wording: an answer that agrees with the reference in substance
is correct even when phrased differently. An answer that is off-topic, contradicts the
reference, or is empty is incorrect.

Respond with a strict JSON object and nothing else:
{"correct": true}
or
{"correct": false}
"#;

const ERROR_BODY_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JudgmentRequest {
    #[serde(skip)]
    pub(crate) task_answer_id: Uuid,
    pub(crate) question: String,
    pub(crate) preferred_answer: Option<String>,
    pub(crate) answer: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TokenUsage {
    pub(crate) prompt_tokens: i64,
    pub(crate) completion_tokens: i64,
    pub(crate) total_tokens: i64,
}

impl TokenUsage {
    fn from_openai(usage: &Value) -> Self {
        let read = |key: &str| usage.get(key).and_then(Value::as_i64).unwrap_or(0);
        let prompt_tokens = read("prompt_tokens");
        let completion_tokens = read("completion_tokens");
        let total_tokens = usage
            .get("total_tokens")
            .and_then(Value::as_i64)
            .unwrap_or(prompt_tokens + completion_tokens);

        Self { prompt_tokens, completion_tokens, total_tokens }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Judgment {
    pub(crate) is_correct: bool,
    pub(crate) usage: TokenUsage,
    pub(crate) latency: Duration,
    pub(crate) model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum JudgmentError {
    /// Rate limiting, timeouts, network faults, server errors, unusable model output.
    #[error("transient judgment failure: {0}")]
    Transient(String),
    /// Bad request, rejected credentials, refused content.
    #[error("permanent judgment failure: {0}")]
    Permanent(String),
}

impl JudgmentError {
    pub(crate) fn detail(&self) -> &str {
        match self {
            Self::Transient(detail) | Self::Permanent(detail) => detail,
        }
    }
}

/// Correctness verdict for one answer. Implementations hold no per-call state
/// and are shared across workers and runs.
#[async_trait]
pub(crate) trait JudgmentClient: Send + Sync {
    async fn evaluate(&self, request: &JudgmentRequest) -> Result<Judgment, JudgmentError>;
}

/// OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone)]
pub(crate) struct LlmJudgmentClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl LlmJudgmentClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(settings.ai().request_timeout())
            .build()
            .context("Failed to build judgment HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            temperature: settings.ai().ai_temperature,
        })
    }
}

#[async_trait]
impl JudgmentClient for LlmJudgmentClient {
    async fn evaluate(&self, request: &JudgmentRequest) -> Result<Judgment, JudgmentError> {
        let user_prompt = serde_json::to_string_pretty(request).map_err(|err| {
            JudgmentError::Permanent(format!("Failed to encode judgment payload: {err}"))
        })?;

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": JUDGMENT_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        tracing::debug!(
            task_answer_id = %request.task_answer_id,
            model = %self.model,
            "Sending judgment request"
        );

        let timer = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|err| {
            JudgmentError::Transient(format!("Failed to read judgment response body: {err}"))
        })?;

        if !status.is_success() {
            return Err(classify_status(status, &raw_body));
        }

        let body: Value = serde_json::from_str(&raw_body).map_err(|err| {
            JudgmentError::Transient(format!("Judgment API returned non-JSON body: {err}"))
        })?;
        let parsed = parse_completion(&body, &self.model)?;
        let latency = timer.elapsed();

        tracing::info!(
            task_answer_id = %request.task_answer_id,
            latency_seconds = latency.as_secs_f64(),
            total_tokens = parsed.usage.total_tokens,
            "Judgment completed"
        );

        Ok(Judgment {
            is_correct: parsed.is_correct,
            usage: parsed.usage,
            latency,
            model: parsed.model,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedCompletion {
    is_correct: bool,
    usage: TokenUsage,
    model: String,
}

fn classify_transport_error(err: reqwest::Error) -> JudgmentError {
    if err.is_builder() {
        return JudgmentError::Permanent(format!("Invalid judgment request: {err}"));
    }
    if err.is_timeout() {
        return JudgmentError::Transient(format!("Judgment API timed out: {err}"));
    }

    JudgmentError::Transient(format!("Failed to call judgment API: {err}"))
}

fn classify_status(status: StatusCode, raw_body: &str) -> JudgmentError {
    let detail = format!("Judgment API returned {status}: {}", extract_error_message(raw_body));

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        JudgmentError::Transient(detail)
    } else {
        JudgmentError::Permanent(detail)
    }
}

fn extract_error_message(raw_body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(raw_body).ok();
    let message = parsed.as_ref().and_then(|body| {
        let error = body.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
    });

    message.unwrap_or_else(|| raw_body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect())
}

fn parse_completion(body: &Value, requested_model: &str) -> Result<ParsedCompletion, JudgmentError> {
    let choice = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| JudgmentError::Transient("Judgment response has no choices".to_string()))?;

    if choice.get("finish_reason").and_then(Value::as_str) == Some("content_filter") {
        return Err(JudgmentError::Permanent(
            "Judgment request was rejected by the content filter".to_string(),
        ));
    }

    let message = choice.get("message");
    if let Some(refusal) = message.and_then(|value| value.get("refusal")).and_then(Value::as_str) {
        return Err(JudgmentError::Permanent(format!("Model refused to judge: {refusal}")));
    }

    let content = message
        .and_then(|value| value.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            JudgmentError::Transient("Judgment response is missing message content".to_string())
        })?;

    let usage = body.get("usage").map(TokenUsage::from_openai).unwrap_or_default();
    let model = body.get("model").and_then(Value::as_str).unwrap_or(requested_model).to_string();

    Ok(ParsedCompletion { is_correct: parse_verdict(content)?, usage, model })
}

/// Accepts `{"correct": bool}`, optionally fenced in a markdown code block,
/// or a one-element array of such objects.
fn parse_verdict(content: &str) -> Result<bool, JudgmentError> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(cleaned).map_err(|err| {
        JudgmentError::Transient(format!("Judgment content is not valid JSON: {err}"))
    })?;

    let verdict = match &value {
        Value::Array(items) if items.len() == 1 => items[0].get("correct"),
        Value::Object(_) => value.get("correct"),
        _ => None,
    };

    verdict.and_then(Value::as_bool).ok_or_else(|| {
        JudgmentError::Transient("Judgment content has no boolean `correct` field".to_string())
    })
}
