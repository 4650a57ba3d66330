//! LLM Client: the single point of entry for language-model inference.
//!
//! ARCHITECTURAL RULE: No other module may call the inference endpoint directly.
//! The assessment engine talks to `dyn InferenceClient`; `LlmClient` is the HTTP
//! implementation against an OpenAI-compatible chat-completions API.
//!
//! One call = one HTTP attempt. Retry policy lives in the assessment engine,
//! which needs the transient/permanent classification produced here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

const MAX_TOKENS: u32 = 2048;

/// Whether an inference failure is worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Timeouts, connection failures, 5xx and rate limiting.
    #[error("transient inference failure: {0}")]
    Transient(String),

    /// Authentication failures, malformed requests, unusable responses.
    #[error("permanent inference failure: {0}")]
    Permanent(String),
}

impl InferenceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, InferenceError::Transient(_))
    }
}

/// A single prompt sent to the model.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
}

/// Language-model inference collaborator. Returns the raw assistant text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first non-empty assistant message.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .iter()
            .filter_map(|c| c.message.content.as_deref())
            .find(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// HTTP inference client authenticated with a bearer credential.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl InferenceClient for LlmClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(classify_status(status, message));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Permanent(format!("malformed response body: {e}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .text()
            .map(str::to_string)
            .ok_or_else(|| InferenceError::Permanent("LLM returned empty content".to_string()))
    }
}

fn classify_transport_error(error: reqwest::Error) -> InferenceError {
    if error.is_timeout() {
        InferenceError::Transient(format!("request timed out: {error}"))
    } else if error.is_connect() || error.is_request() {
        InferenceError::Transient(format!("connection failed: {error}"))
    } else {
        InferenceError::Permanent(error.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> InferenceError {
    let detail = format!("API error (status {}): {}", status.as_u16(), message);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        InferenceError::Transient(detail)
    } else {
        InferenceError::Permanent(detail)
    }
}
