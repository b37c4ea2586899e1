//! Narrow interface to the language model that picks tools, roles and
//! replies. Everything the runtime knows about a provider goes through
//! [`LlmClient::complete`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use freddie_core::config::{LlmConfig, LlmProvider};

pub mod anthropic;
pub mod openai;
pub mod scripted;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use scripted::ScriptedLlmClient;

/// Provider-neutral message. Tool traffic only lives for the duration of a
/// turn; persisted history is plain user/assistant text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmMessage {
    User { content: String },
    Assistant { content: Option<String>, tool_calls: Vec<ToolCall> },
    ToolResult { call_id: String, content: String, is_error: bool },
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant { content: Some(content.into()), tool_calls: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), tool_calls: Vec::new() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall { id: id.into(), name: name.into(), arguments }],
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm request timed out after {0} seconds")]
    Timeout(u64),
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("provider unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("API error ({error_type}): {message}")]
    Api { error_type: String, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(error) => error.is_timeout() || error.is_connect() || error.is_request(),
            Self::Timeout(_) | Self::RateLimited(_) | Self::Unavailable { .. } => true,
            Self::Unauthorized(_) | Self::Api { .. } | Self::Parse(_) | Self::Configuration(_) => {
                false
            }
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

/// Builds the HTTP client for the configured provider. Ollama speaks the
/// OpenAI chat-completions dialect at its `/v1` endpoint.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.provider {
        LlmProvider::OpenAi | LlmProvider::Ollama => Ok(Arc::new(OpenAiClient::new(config)?)),
        LlmProvider::Anthropic => Ok(Arc::new(AnthropicClient::new(config)?)),
    }
}

/// Maps a non-success provider response onto [`LlmError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> LlmError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(1);
        return LlmError::RateLimited(retry_after);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => return LlmError::Http(error),
    };
    let message = error_body_message(&body);

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return LlmError::Unauthorized(message);
    }
    if status.is_server_error() {
        return LlmError::Unavailable { status: status.as_u16(), message };
    }
    LlmError::Api { error_type: status.as_str().to_string(), message }
}

pub(crate) fn error_body_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
