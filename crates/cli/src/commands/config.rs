use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use freddie_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use super::CommandResult;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => CommandResult { exit_code: 0, output: render(&config) },
        Err(error) => CommandResult::failure(
            "config",
            "config_validation",
            format!("config validation failed: {error}"),
            2,
        ),
    }
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "llm.provider",
            value: config.llm.provider.as_str().to_string(),
            env_keys: &["FREDDIE_LLM_PROVIDER"],
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["FREDDIE_LLM_MODEL", "MODEL_CHOICE"],
        },
        Field {
            key: "llm.base_url",
            value: optional(&config.llm.base_url),
            env_keys: &["FREDDIE_LLM_BASE_URL"],
        },
        Field {
            key: "llm.api_key",
            value: redact_secret(config.llm.api_key.as_ref()),
            env_keys: &["FREDDIE_LLM_API_KEY", "OPENAI_API_KEY"],
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["FREDDIE_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.max_retries",
            value: config.llm.max_retries.to_string(),
            env_keys: &["FREDDIE_LLM_MAX_RETRIES"],
        },
        Field {
            key: "agent.routing_mode",
            value: config.agent.routing_mode.as_str().to_string(),
            env_keys: &["FREDDIE_AGENT_ROUTING_MODE"],
        },
        Field {
            key: "agent.max_tool_rounds",
            value: config.agent.max_tool_rounds.to_string(),
            env_keys: &["FREDDIE_AGENT_MAX_TOOL_ROUNDS"],
        },
        Field {
            key: "agent.history_window",
            value: config.agent.history_window.to_string(),
            env_keys: &["FREDDIE_AGENT_HISTORY_WINDOW"],
        },
        Field {
            key: "store.name",
            value: config.store.name.clone(),
            env_keys: &["FREDDIE_STORE_NAME"],
        },
        Field {
            key: "store.currency",
            value: config.store.currency.clone(),
            env_keys: &["FREDDIE_STORE_CURRENCY"],
        },
        Field {
            key: "store.seed_sample_orders",
            value: config.store.seed_sample_orders.to_string(),
            env_keys: &["FREDDIE_STORE_SEED_SAMPLE_ORDERS"],
        },
        Field {
            key: "notification.mode",
            value: config.notification.mode.as_str().to_string(),
            env_keys: &["FREDDIE_NOTIFICATION_MODE"],
        },
        Field {
            key: "notification.webhook_url",
            value: optional(&config.notification.webhook_url),
            env_keys: &["FREDDIE_NOTIFICATION_WEBHOOK_URL"],
        },
        Field {
            key: "notification.api_key",
            value: redact_secret(config.notification.api_key.as_ref()),
            env_keys: &["FREDDIE_NOTIFICATION_API_KEY"],
        },
        Field {
            key: "notification.sender",
            value: config.notification.sender.clone(),
            env_keys: &["FREDDIE_NOTIFICATION_SENDER"],
        },
        Field {
            key: "voice.enabled",
            value: config.voice.enabled.to_string(),
            env_keys: &["FREDDIE_VOICE_ENABLED"],
        },
        Field {
            key: "voice.transcription_url",
            value: optional(&config.voice.transcription_url),
            env_keys: &["FREDDIE_VOICE_TRANSCRIPTION_URL"],
        },
        Field {
            key: "voice.synthesis_url",
            value: optional(&config.voice.synthesis_url),
            env_keys: &["FREDDIE_VOICE_SYNTHESIS_URL"],
        },
        Field {
            key: "voice.api_key",
            value: redact_secret(config.voice.api_key.as_ref()),
            env_keys: &["FREDDIE_VOICE_API_KEY"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["FREDDIE_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["FREDDIE_SERVER_PORT"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["FREDDIE_LOGGING_LEVEL", "FREDDIE_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: config.logging.format.as_str().to_string(),
            env_keys: &["FREDDIE_LOGGING_FORMAT", "FREDDIE_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("freddie.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/freddie.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognizable prefix such as `sk-` and hides the rest.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
