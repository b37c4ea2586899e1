use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub store: StoreConfig,
    pub notification: NotificationConfig,
    pub voice: VoiceConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub routing_mode: RoutingMode,
    pub max_tool_rounds: u32,
    /// Trailing turns sent to the model; 0 sends the whole history.
    pub history_window: usize,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub name: String,
    pub currency: String,
    pub seed_sample_orders: bool,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub mode: NotificationMode,
    pub webhook_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub sender: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub transcription_url: Option<String>,
    pub synthesis_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub voice: String,
    pub output_sample_rate: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// One top-level role calls specialists as sub-operations.
    Composition,
    /// Control moves between peer roles and the active role is surfaced.
    Handoff,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    Log,
    Webhook,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub routing_mode: Option<RoutingMode>,
    pub notification_mode: Option<NotificationMode>,
    pub server_port: Option<u16>,
    pub voice_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            agent: AgentConfig {
                routing_mode: RoutingMode::Composition,
                max_tool_rounds: 8,
                history_window: 0,
            },
            store: StoreConfig {
                name: "EOcean Shoe Store".to_string(),
                currency: "USD".to_string(),
                seed_sample_orders: true,
            },
            notification: NotificationConfig {
                mode: NotificationMode::Log,
                webhook_url: None,
                api_key: None,
                sender: "receipts@eocean-shoes.example".to_string(),
                timeout_secs: 10,
            },
            voice: VoiceConfig {
                enabled: false,
                transcription_url: None,
                synthesis_url: None,
                api_key: None,
                voice: "echo".to_string(),
                output_sample_rate: 24_000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composition => "composition",
            Self::Handoff => "handoff",
        }
    }
}

impl NotificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Webhook => "webhook",
            Self::Disabled => "disabled",
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for RoutingMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "composition" => Ok(Self::Composition),
            "handoff" => Ok(Self::Handoff),
            other => Err(ConfigError::Validation(format!(
                "unsupported routing mode `{other}` (expected composition|handoff)"
            ))),
        }
    }
}

impl std::str::FromStr for NotificationMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "webhook" => Ok(Self::Webhook),
            "disabled" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported notification mode `{other}` (expected log|webhook|disabled)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("freddie.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(routing_mode) = agent.routing_mode {
                self.agent.routing_mode = routing_mode;
            }
            if let Some(max_tool_rounds) = agent.max_tool_rounds {
                self.agent.max_tool_rounds = max_tool_rounds;
            }
            if let Some(history_window) = agent.history_window {
                self.agent.history_window = history_window;
            }
        }

        if let Some(store) = patch.store {
            if let Some(name) = store.name {
                self.store.name = name;
            }
            if let Some(currency) = store.currency {
                self.store.currency = currency;
            }
            if let Some(seed_sample_orders) = store.seed_sample_orders {
                self.store.seed_sample_orders = seed_sample_orders;
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(mode) = notification.mode {
                self.notification.mode = mode;
            }
            if let Some(webhook_url) = notification.webhook_url {
                self.notification.webhook_url = Some(webhook_url);
            }
            if let Some(notification_api_key_value) = notification.api_key {
                self.notification.api_key = Some(secret_value(notification_api_key_value));
            }
            if let Some(sender) = notification.sender {
                self.notification.sender = sender;
            }
            if let Some(timeout_secs) = notification.timeout_secs {
                self.notification.timeout_secs = timeout_secs;
            }
        }

        if let Some(voice) = patch.voice {
            if let Some(enabled) = voice.enabled {
                self.voice.enabled = enabled;
            }
            if let Some(transcription_url) = voice.transcription_url {
                self.voice.transcription_url = Some(transcription_url);
            }
            if let Some(synthesis_url) = voice.synthesis_url {
                self.voice.synthesis_url = Some(synthesis_url);
            }
            if let Some(voice_api_key_value) = voice.api_key {
                self.voice.api_key = Some(secret_value(voice_api_key_value));
            }
            if let Some(name) = voice.voice {
                self.voice.voice = name;
            }
            if let Some(output_sample_rate) = voice.output_sample_rate {
                self.voice.output_sample_rate = output_sample_rate;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FREDDIE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let llm_api_key = read_env("FREDDIE_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FREDDIE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        let llm_model = read_env("FREDDIE_LLM_MODEL").or_else(|| read_env("MODEL_CHOICE"));
        if let Some(value) = llm_model {
            self.llm.model = value;
        }
        if let Some(value) = read_env("FREDDIE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FREDDIE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FREDDIE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("FREDDIE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("FREDDIE_AGENT_ROUTING_MODE") {
            self.agent.routing_mode = value.parse()?;
        }
        if let Some(value) = read_env("FREDDIE_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_u32("FREDDIE_AGENT_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("FREDDIE_AGENT_HISTORY_WINDOW") {
            self.agent.history_window = parse_usize("FREDDIE_AGENT_HISTORY_WINDOW", &value)?;
        }

        if let Some(value) = read_env("FREDDIE_STORE_NAME") {
            self.store.name = value;
        }
        if let Some(value) = read_env("FREDDIE_STORE_CURRENCY") {
            self.store.currency = value;
        }
        if let Some(value) = read_env("FREDDIE_STORE_SEED_SAMPLE_ORDERS") {
            self.store.seed_sample_orders =
                parse_bool("FREDDIE_STORE_SEED_SAMPLE_ORDERS", &value)?;
        }

        if let Some(value) = read_env("FREDDIE_NOTIFICATION_MODE") {
            self.notification.mode = value.parse()?;
        }
        if let Some(value) = read_env("FREDDIE_NOTIFICATION_WEBHOOK_URL") {
            self.notification.webhook_url = Some(value);
        }
        if let Some(value) = read_env("FREDDIE_NOTIFICATION_API_KEY") {
            self.notification.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FREDDIE_NOTIFICATION_SENDER") {
            self.notification.sender = value;
        }

        if let Some(value) = read_env("FREDDIE_VOICE_ENABLED") {
            self.voice.enabled = parse_bool("FREDDIE_VOICE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FREDDIE_VOICE_TRANSCRIPTION_URL") {
            self.voice.transcription_url = Some(value);
        }
        if let Some(value) = read_env("FREDDIE_VOICE_SYNTHESIS_URL") {
            self.voice.synthesis_url = Some(value);
        }
        if let Some(value) = read_env("FREDDIE_VOICE_API_KEY") {
            self.voice.api_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("FREDDIE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FREDDIE_SERVER_PORT") {
            self.server.port = parse_u16("FREDDIE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FREDDIE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FREDDIE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("FREDDIE_LOGGING_LEVEL").or_else(|| read_env("FREDDIE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FREDDIE_LOGGING_FORMAT").or_else(|| read_env("FREDDIE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(routing_mode) = overrides.routing_mode {
            self.agent.routing_mode = routing_mode;
        }
        if let Some(notification_mode) = overrides.notification_mode {
            self.notification.mode = notification_mode;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(voice_enabled) = overrides.voice_enabled {
            self.voice.enabled = voice_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_store(&self.store)?;
        validate_notification(&self.notification)?;
        validate_voice(&self.voice)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("freddie.toml"), PathBuf::from("config/freddie.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers (set FREDDIE_LLM_API_KEY or OPENAI_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        validate_http_url("llm.base_url", base_url)?;
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_tool_rounds == 0 || agent.max_tool_rounds > 32 {
        return Err(ConfigError::Validation(
            "agent.max_tool_rounds must be in range 1..=32".to_string(),
        ));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.name.trim().is_empty() {
        return Err(ConfigError::Validation("store.name must not be empty".to_string()));
    }

    let currency = store.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "store.currency must be a three-letter ISO code such as USD".to_string(),
        ));
    }

    Ok(())
}

fn validate_notification(notification: &NotificationConfig) -> Result<(), ConfigError> {
    if notification.mode == NotificationMode::Webhook {
        let Some(webhook_url) = &notification.webhook_url else {
            return Err(ConfigError::Validation(
                "notification.webhook_url is required when notification.mode is webhook"
                    .to_string(),
            ));
        };
        validate_http_url("notification.webhook_url", webhook_url)?;
    }

    if notification.timeout_secs == 0 || notification.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "notification.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_voice(voice: &VoiceConfig) -> Result<(), ConfigError> {
    if !voice.enabled {
        return Ok(());
    }

    let Some(transcription_url) = &voice.transcription_url else {
        return Err(ConfigError::Validation(
            "voice.transcription_url is required when voice.enabled is true".to_string(),
        ));
    };
    validate_http_url("voice.transcription_url", transcription_url)?;

    let Some(synthesis_url) = &voice.synthesis_url else {
        return Err(ConfigError::Validation(
            "voice.synthesis_url is required when voice.enabled is true".to_string(),
        ));
    };
    validate_http_url("voice.synthesis_url", synthesis_url)?;

    if voice.output_sample_rate == 0 {
        return Err(ConfigError::Validation(
            "voice.output_sample_rate must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(());
    }
    Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    store: Option<StorePatch>,
    notification: Option<NotificationPatch>,
    voice: Option<VoicePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    routing_mode: Option<RoutingMode>,
    max_tool_rounds: Option<u32>,
    history_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    name: Option<String>,
    currency: Option<String>,
    seed_sample_orders: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    mode: Option<NotificationMode>,
    webhook_url: Option<String>,
    api_key: Option<String>,
    sender: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VoicePatch {
    enabled: Option<bool>,
    transcription_url: Option<String>,
    synthesis_url: Option<String>,
    api_key: Option<String>,
    voice: Option<String>,
    output_sample_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
