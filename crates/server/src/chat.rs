use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use freddie_agent::voice::AudioBuffer;
use freddie_agent::{ChatRequest, GatewayError};
use freddie_core::domain::conversation::Role;
use freddie_core::errors::InterfaceError;

use crate::app::AppState;

const DEFAULT_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Deserialize)]
pub struct TextChatRequest {
    pub message: String,
    pub user_id: String,
    #[serde(default, alias = "email")]
    pub contact: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextChatResponse {
    pub response: String,
    pub role: Role,
    pub conversation_key: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceChatParams {
    pub user_id: String,
    #[serde(default, alias = "email")]
    pub contact: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_channels() -> u16 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatError {
    pub error: String,
    pub correlation_id: String,
}

type ChatFailure = (StatusCode, Json<ChatError>);

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat/text", post(text_chat)).route("/chat/voice", post(voice_chat))
}

async fn text_chat(
    State(state): State<AppState>,
    payload: Result<Json<TextChatRequest>, JsonRejection>,
) -> Result<Json<TextChatResponse>, ChatFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let Json(body) = payload.map_err(|rejection| bad_request(rejection.body_text(), &correlation_id))?;

    let reply = state
        .gateway
        .handle_text(
            ChatRequest { message: body.message, user_id: body.user_id, contact: body.contact },
            &correlation_id,
        )
        .await
        .map_err(|error| failure(error, &correlation_id))?;

    Ok(Json(TextChatResponse {
        response: reply.response,
        role: reply.role,
        conversation_key: reply.conversation_key.to_string(),
    }))
}

async fn voice_chat(
    State(state): State<AppState>,
    params: Result<Query<VoiceChatParams>, QueryRejection>,
    body: Bytes,
) -> Result<Response, ChatFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let Query(params) = params.map_err(|rejection| bad_request(rejection.body_text(), &correlation_id))?;
    let audio = AudioBuffer::new(body.to_vec(), params.sample_rate, params.channels)
        .map_err(|error| failure(GatewayError::Speech(error), &correlation_id))?;

    let voice = state
        .gateway
        .handle_voice(params.user_id, params.contact, audio, &correlation_id)
        .await
        .map_err(|error| failure(error, &correlation_id))?;

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (HeaderName::from_static("x-sample-rate"), voice.audio.sample_rate.to_string()),
        (HeaderName::from_static("x-channels"), voice.audio.channels.to_string()),
        (HeaderName::from_static("x-agent-role"), voice.reply.role.as_str().to_string()),
    ];
    Ok((headers, voice.audio.bytes).into_response())
}

fn bad_request(message: String, correlation_id: &str) -> ChatFailure {
    (
        StatusCode::BAD_REQUEST,
        Json(ChatError { error: message, correlation_id: correlation_id.to_string() }),
    )
}

fn failure(error: GatewayError, correlation_id: &str) -> ChatFailure {
    let interface = error.into_interface(correlation_id);
    let status = match interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.chat.request_failed",
        correlation_id,
        status = status.as_u16(),
        error = %interface,
        "chat request failed"
    );
    (
        status,
        Json(ChatError {
            error: interface.message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use freddie_agent::build_gateway_with;
    use freddie_agent::llm::{Completion, LlmError, ScriptedLlmClient};
    use freddie_core::config::AppConfig;

    use crate::app::{router, AppState};

    async fn app_with(config: AppConfig, llm: ScriptedLlmClient) -> Router {
        let gateway = build_gateway_with(&config, Arc::new(llm)).await.expect("gateway");
        router(AppState::new(&config, Arc::new(gateway)))
    }

    async fn post_json(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn text_chat_returns_reply_role_and_key() {
        let app = app_with(
            AppConfig::default(),
            ScriptedLlmClient::new([Completion::text("Hi! I'm Freddie. How can I help?")]),
        )
        .await;

        let body = json!({"message": "hello", "user_id": "zaid", "email": "zaid@example.com"});
        let (status, payload) = post_json(app, "/chat/text", body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["response"], "Hi! I'm Freddie. How can I help?");
        assert_eq!(payload["role"], "general");
        assert_eq!(payload["conversation_key"], "zaid:zaid@example.com");
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let app = app_with(AppConfig::default(), ScriptedLlmClient::default()).await;

        let body = json!({"message": "", "user_id": "zaid"});
        let (status, payload) = post_json(app, "/chat/text", body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["error"], "message must not be empty");
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = app_with(AppConfig::default(), ScriptedLlmClient::default()).await;

        let (status, payload) = post_json(app, "/chat/text", "{\"message\": 42".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload["error"].is_string());
    }

    #[tokio::test]
    async fn unavailable_model_is_service_unavailable() {
        let mut config = AppConfig::default();
        config.llm.max_retries = 0;
        let app = app_with(
            config,
            ScriptedLlmClient::from_results([Err(LlmError::Unavailable {
                status: 503,
                message: "overloaded".to_string(),
            })]),
        )
        .await;

        let body = json!({"message": "hello", "user_id": "zaid"});
        let (status, payload) = post_json(app, "/chat/text", body.to_string()).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(payload["error"].as_str().is_some_and(|error| error.contains("overloaded")));
    }

    #[tokio::test]
    async fn unexpected_fault_is_internal_error_with_text() {
        let app = app_with(AppConfig::default(), ScriptedLlmClient::default()).await;

        let body = json!({"message": "hello", "user_id": "zaid"});
        let (status, payload) = post_json(app, "/chat/text", body.to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(payload["error"].as_str().is_some_and(|error| error.contains("no scripted completion")));
    }

    #[tokio::test]
    async fn voice_is_unavailable_when_disabled() {
        let app = app_with(AppConfig::default(), ScriptedLlmClient::default()).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat/voice?user_id=zaid&sample_rate=16000&channels=1")
                    .body(Body::from(vec![1_u8, 2, 3, 4]))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn voice_without_user_is_bad_request() {
        let app = app_with(AppConfig::default(), ScriptedLlmClient::default()).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat/voice?sample_rate=16000")
                    .body(Body::from(vec![1_u8, 2, 3, 4]))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
