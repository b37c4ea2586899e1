pub mod fixtures;
pub mod locks;
pub mod repositories;

pub use fixtures::{SampleOrders, SeedResult, VerificationResult};
pub use locks::KeyedLocks;
pub use repositories::{
    CartRepository, InMemoryCartRepository, InMemoryOrderRepository, InMemorySessionRepository,
    OrderRepository, RepositoryError, Session, SessionRepository,
};
