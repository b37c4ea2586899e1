pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use catalog::Catalog;
pub use domain::cart::{Cart, CartLineItem, CartMutation};
pub use domain::conversation::{ConversationKey, ConversationTurn, Role, TurnRole, UserContext};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::product::{Product, ProductId, Size};
pub use errors::{ApplicationError, BusinessFailure, DomainError, InterfaceError};
