//! Agent runtime for the EOcean Shoe Store assistant.
//!
//! This crate turns customer messages into replies:
//! - Exposes the shop operations as model-callable tools (`shop`, `tools`)
//! - Declares role permissions and legal hand-offs (`roles`)
//! - Drives the model through tool calls within a bounded turn (`runtime`)
//! - Accepts text and voice requests and persists history (`gateway`)
//!
//! # Safety Principle
//!
//! The model only chooses. Prices, totals, order ids and cart contents always
//! come from the tool layer, and a role can never run a tool it does not hold.

pub mod gateway;
pub mod llm;
pub mod notify;
pub mod receipt;
pub mod roles;
pub mod runtime;
pub mod shop;
pub mod tools;
pub mod voice;

pub use gateway::{build_gateway, build_gateway_with, ChatGateway, ChatReply, ChatRequest, GatewayError};
pub use runtime::{AgentError, AgentRuntime, TurnEvent, TurnOutcome};
