use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app::{AppState, RuntimeInfo};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: HealthCheck,
    pub runtime: RuntimeInfo,
    pub checked_at: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let sessions = match state.gateway.sessions().count().await {
        Ok(count) => HealthCheck {
            status: "ready",
            detail: format!("{count} active conversation(s)"),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("session store unreachable: {error}"),
        },
    };
    let ready = sessions.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "{} products in catalog",
                state.gateway.shop().catalog().products().len()
            ),
        },
        sessions,
        runtime: state.info.as_ref().clone(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
