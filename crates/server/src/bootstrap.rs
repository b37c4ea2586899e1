use std::sync::Arc;

use freddie_agent::gateway::AssemblyError;
use freddie_agent::{build_gateway, ChatGateway};
use freddie_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

pub struct Application {
    pub config: AppConfig,
    pub gateway: Arc<ChatGateway>,
}

impl Application {
    pub fn state(&self) -> AppState {
        AppState::new(&self.config, self.gateway.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("service assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        routing_mode = config.agent.routing_mode.as_str(),
        "starting application bootstrap"
    );

    let gateway = build_gateway(&config).await?;
    info!(
        event_name = "system.bootstrap.gateway_ready",
        correlation_id = "bootstrap",
        voice_enabled = gateway.voice_enabled(),
        "chat gateway assembled"
    );

    Ok(Application { config, gateway: Arc::new(gateway) })
}
