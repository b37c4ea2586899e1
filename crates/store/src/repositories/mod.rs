use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use freddie_core::domain::cart::Cart;
use freddie_core::domain::conversation::{ConversationKey, ConversationTurn, Role};
use freddie_core::domain::order::{Order, OrderId, OrderStatus};
use freddie_core::errors::{ApplicationError, DomainError};

pub mod memory;

pub use memory::{InMemoryCartRepository, InMemoryOrderRepository, InMemorySessionRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(domain) => ApplicationError::Domain(domain),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Looks up by the normalized id; callers pass whatever the user typed.
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Hands out the next order id. Ids are never reused, even when the
    /// reservation is never saved.
    async fn reserve_id(&self) -> Result<OrderId, RepositoryError>;

    /// Inserts a new order. Orders are immutable once stored apart from status.
    async fn save(&self, order: Order) -> Result<(), RepositoryError>;

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError>;

    async fn list(&self) -> Result<Vec<Order>, RepositoryError>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Missing carts load as empty.
    async fn load(&self, user_id: &str) -> Result<Cart, RepositoryError>;
    async fn save(&self, user_id: &str, cart: Cart) -> Result<(), RepositoryError>;
    /// Empties the cart and returns what it held.
    async fn clear(&self, user_id: &str) -> Result<Cart, RepositoryError>;
}

/// Persisted history for one conversation key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub key: ConversationKey,
    pub turns: Vec<ConversationTurn>,
    pub active_role: Role,
    /// Incremented on every append; a fresh session is version 0.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: ConversationKey) -> Self {
        Self { key, turns: Vec::new(), active_role: Role::General, version: 0, updated_at: Utc::now() }
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_or_create(&self, key: &ConversationKey) -> Result<Session, RepositoryError>;

    /// Appends turns and records the role that ends the turn. Fails with
    /// `Conflict` when the stored version moved past `expected_version`.
    async fn append(
        &self,
        key: &ConversationKey,
        expected_version: u64,
        turns: Vec<ConversationTurn>,
        active_role: Role,
    ) -> Result<Session, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;
}
