//! Out-of-process receipt delivery. Delivery is attempted once; failures are
//! reported back to the caller, never retried here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use freddie_core::config::{NotificationConfig, NotificationMode};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent { recipient: String },
    /// Nothing was attempted, e.g. the caller gave no contact address.
    Skipped { reason: String },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifications are disabled")]
    Disabled,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("delivery rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("notifier misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes receipts to the log instead of sending them.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            event_name = "notify.delivery.logged",
            recipient = %notification.recipient,
            subject = %notification.subject,
            body = %notification.body,
            "receipt delivery logged"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn channel(&self) -> &'static str {
        "disabled"
    }

    async fn deliver(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Disabled)
    }
}

/// Posts `{from, to, subject, body}` to an email/SMS relay.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
    sender: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let url = config.webhook_url.clone().ok_or_else(|| {
            NotifyError::Configuration("notification.webhook_url is not set".to_string())
        })?;
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, url, api_key: config.api_key.clone(), sender: config.sender.clone() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            from: &self.sender,
            to: &notification.recipient,
            subject: &notification.subject,
            body: &notification.body,
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected { status: status.as_u16(), message })
    }
}

pub fn build_notifier(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.mode {
        NotificationMode::Log => Ok(Arc::new(LogNotifier)),
        NotificationMode::Webhook => Ok(Arc::new(WebhookNotifier::new(config)?)),
        NotificationMode::Disabled => Ok(Arc::new(DisabledNotifier)),
    }
}
