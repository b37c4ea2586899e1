use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

/// Conversational persona currently in control of a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    General,
    OrderSpecialist,
    ProductSpecialist,
    CartSpecialist,
    CheckoutSpecialist,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::General,
        Role::OrderSpecialist,
        Role::ProductSpecialist,
        Role::CartSpecialist,
        Role::CheckoutSpecialist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::OrderSpecialist => "order_specialist",
            Self::ProductSpecialist => "product_specialist",
            Self::CartSpecialist => "cart_specialist",
            Self::CheckoutSpecialist => "checkout_specialist",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one persisted message history: user id plus contact address.
/// Equality is over both parts; the `user:contact` rendering is for display
/// only and is not unique.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub contact: Option<String>,
}

impl ConversationKey {
    pub fn new(user_id: &str, contact: Option<&str>) -> Self {
        let contact = contact.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string);
        Self { user_id: user_id.trim().to_string(), contact }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.contact.as_deref().unwrap_or_default())
    }
}

/// Per-request caller identity. Never persisted beyond the call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub contact: Option<String>,
    pub session_start: DateTime<Utc>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, contact: Option<String>) -> Self {
        let contact = contact.map(|value| value.trim().to_string()).filter(|value| !value.is_empty());
        Self { user_id: user_id.into().trim().to_string(), contact, session_start: Utc::now() }
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(&self.user_id, self.contact.as_deref())
    }
}
