use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use freddie_core::config::LlmConfig;

use super::{
    error_from_response, Completion, CompletionRequest, LlmClient, LlmError, LlmMessage, ToolCall,
    ToolSpec,
};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Chat-completions client with function calling. Also used for Ollama and
/// other OpenAI-compatible endpoints through `llm.base_url`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let endpoint = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { client, endpoint, api_key: config.api_key.clone(), model: config.model.clone() })
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(OpenAiMessage::text("system", &request.system));

        for message in &request.messages {
            match message {
                LlmMessage::User { content } => messages.push(OpenAiMessage::text("user", content)),
                LlmMessage::Assistant { content, tool_calls } => messages.push(OpenAiMessage {
                    role: "assistant".to_string(),
                    content: content.clone(),
                    tool_calls: (!tool_calls.is_empty())
                        .then(|| tool_calls.iter().map(OpenAiToolCall::from_call).collect()),
                    tool_call_id: None,
                }),
                LlmMessage::ToolResult { call_id, content, .. } => messages.push(OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                }),
            }
        }

        OpenAiRequest {
            model: self.model.clone(),
            messages,
            tools: (!request.tools.is_empty())
                .then(|| request.tools.iter().map(OpenAiTool::from_spec).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = self.build_request(&request);
        let mut http = self.client.post(format!("{}/chat/completions", self.endpoint)).json(&body);
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key.expose_secret());
        }

        let response = http.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let payload: OpenAiResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Parse(format!("failed to parse completion: {error}")))?;
        debug!(model = %self.model, choices = payload.choices.len(), "openai completion received");
        payload.into_completion()
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: OpenAiFunctionCall,
}

impl OpenAiToolCall {
    fn from_call(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: OpenAiFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    /// JSON-encoded object, as the API transmits it.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunctionSpec,
}

impl OpenAiTool {
    fn from_spec(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: OpenAiFunctionSpec {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

impl OpenAiResponse {
    fn into_completion(self) -> Result<Completion, LlmError> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(LlmError::Parse("completion contained no choices".to_string()));
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                // Models occasionally emit malformed JSON; the tool layer reports it.
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments)),
            })
            .collect();

        let text = choice.message.content.filter(|content| !content.trim().is_empty());
        Ok(Completion { text, tool_calls })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use freddie_core::config::AppConfig;

    use super::{OpenAiClient, OpenAiResponse};
    use crate::llm::{CompletionRequest, LlmMessage, ToolCall, ToolSpec};

    fn client() -> OpenAiClient {
        let mut config = AppConfig::default().llm;
        config.base_url = Some("http://localhost:11434/v1/".to_string());
        OpenAiClient::new(&config).expect("client")
    }

    #[test]
    fn request_carries_system_prompt_tools_and_tool_results() {
        let request = CompletionRequest {
            system: "You are Freddie.".to_string(),
            messages: vec![
                LlmMessage::user("add running shoes"),
                LlmMessage::Assistant {
                    content: None,
                    tool_calls: vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "add_to_cart".to_string(),
                        arguments: json!({"product": "running", "size": "small"}),
                    }],
                },
                LlmMessage::ToolResult {
                    call_id: "call_1".to_string(),
                    content: "{\"status\":\"ok\"}".to_string(),
                    is_error: false,
                },
            ],
            tools: vec![ToolSpec {
                name: "add_to_cart".to_string(),
                description: "Add to cart".to_string(),
                input_schema: json!({"type": "object"}),
            }],
        };

        let body = serde_json::to_value(client().build_request(&request)).expect("serialize");

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["name"], "add_to_cart");
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        assert_eq!(client().endpoint, "http://localhost:11434/v1");
    }

    #[test]
    fn response_tool_call_arguments_are_decoded() {
        let payload: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "lookup_order", "arguments": "{\"order_id\":\"ORD1001\"}"}
                    }]
                }
            }]
        }))
        .expect("deserialize");

        let completion = payload.into_completion().expect("completion");
        assert_eq!(completion.text, None);
        assert_eq!(completion.tool_calls[0].arguments["order_id"], "ORD1001");
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let payload: OpenAiResponse =
            serde_json::from_value(json!({"choices": []})).expect("deserialize");
        assert!(payload.into_completion().is_err());
    }
}
