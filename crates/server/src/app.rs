use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use freddie_agent::ChatGateway;
use freddie_core::config::AppConfig;

use crate::{chat, health};

/// Configuration facts reported by `/health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub llm_provider: &'static str,
    pub llm_model: String,
    pub routing_mode: &'static str,
    pub notification_mode: &'static str,
    pub voice_enabled: bool,
}

impl RuntimeInfo {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            llm_provider: config.llm.provider.as_str(),
            llm_model: config.llm.model.clone(),
            routing_mode: config.agent.routing_mode.as_str(),
            notification_mode: config.notification.mode.as_str(),
            voice_enabled: config.voice.enabled,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ChatGateway>,
    pub info: Arc<RuntimeInfo>,
}

impl AppState {
    pub fn new(config: &AppConfig, gateway: Arc<ChatGateway>) -> Self {
        Self { gateway, info: Arc::new(RuntimeInfo::from_config(config)) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes())
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
