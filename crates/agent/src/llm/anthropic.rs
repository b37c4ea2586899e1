use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use freddie_core::config::LlmConfig;

use super::{
    error_from_response, Completion, CompletionRequest, LlmClient, LlmError, LlmMessage, ToolCall,
    ToolSpec,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic Messages API client with tool use.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::Configuration("anthropic requires llm.api_key".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key_header = HeaderValue::from_str(api_key.expose_secret()).map_err(|_| {
            LlmError::Configuration("llm.api_key contains invalid header characters".to_string())
        })?;
        headers.insert("x-api-key", key_header);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { client, endpoint, model: config.model.clone() })
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages: Vec<Message> = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            let (role, block) = match message {
                LlmMessage::User { content } => {
                    ("user", vec![ContentBlock::Text { text: content.clone() }])
                }
                LlmMessage::Assistant { content, tool_calls } => {
                    let mut blocks: Vec<ContentBlock> = content
                        .iter()
                        .map(|text| ContentBlock::Text { text: text.clone() })
                        .collect();
                    blocks.extend(tool_calls.iter().map(|call| ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }));
                    ("assistant", blocks)
                }
                LlmMessage::ToolResult { call_id, content, is_error } => (
                    "user",
                    vec![ContentBlock::ToolResult {
                        tool_use_id: call_id.clone(),
                        content: content.clone(),
                        is_error: is_error.then_some(true),
                    }],
                ),
            };

            // Consecutive tool results travel in a single user message.
            match messages.last_mut() {
                Some(last) if last.role == role && role == "user" => last.content.extend(block),
                _ => messages.push(Message { role: role.to_string(), content: block }),
            }
        }

        ChatRequest {
            model: self.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: (!request.system.is_empty()).then(|| request.system.clone()),
            messages,
            tools: (!request.tools.is_empty())
                .then(|| request.tools.iter().map(Tool::from_spec).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = self.build_request(&request);
        let response =
            self.client.post(format!("{}/messages", self.endpoint)).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Parse(format!("failed to parse response: {error}")))?;
        debug!(model = %self.model, stop_reason = ?payload.stop_reason, "anthropic response received");
        Ok(payload.into_completion())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

impl Tool {
    fn from_spec(spec: &ToolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.input_schema.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl ChatResponse {
    fn into_completion(self) -> Completion {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => texts.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, arguments: input })
                }
                _ => {}
            }
        }

        Completion { text: (!texts.is_empty()).then(|| texts.join("\n")), tool_calls }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use freddie_core::config::{AppConfig, LlmProvider};

    use super::{AnthropicClient, ChatResponse};
    use crate::llm::{CompletionRequest, LlmError, LlmMessage};

    fn client() -> AnthropicClient {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Anthropic;
        config.api_key = Some("sk-ant-test".to_string().into());
        AnthropicClient::new(&config).expect("client")
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let config = AppConfig::default().llm;
        let result = AnthropicClient::new(&config);
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[test]
    fn consecutive_tool_results_share_one_user_message() {
        let request = CompletionRequest {
            system: "You are Freddie.".to_string(),
            messages: vec![
                LlmMessage::user("status of ORD1001 and ORD1002?"),
                LlmMessage::Assistant { content: None, tool_calls: Vec::new() },
                LlmMessage::ToolResult {
                    call_id: "a".to_string(),
                    content: "shipped".to_string(),
                    is_error: false,
                },
                LlmMessage::ToolResult {
                    call_id: "b".to_string(),
                    content: "missing".to_string(),
                    is_error: true,
                },
            ],
            tools: Vec::new(),
        };

        let body = serde_json::to_value(client().build_request(&request)).expect("serialize");
        let messages = body["messages"].as_array().expect("messages");

        assert_eq!(body["system"], "You are Freddie.");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["content"].as_array().map(Vec::len), Some(2));
        assert_eq!(messages[2]["content"][1]["is_error"], true);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tool_use_blocks_become_tool_calls() {
        let response: ChatResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "view_cart", "input": {}}
            ],
            "stop_reason": "tool_use"
        }))
        .expect("deserialize");

        let completion = response.into_completion();
        assert_eq!(completion.text.as_deref(), Some("Let me check."));
        assert_eq!(completion.tool_calls[0].name, "view_cart");
    }
}
