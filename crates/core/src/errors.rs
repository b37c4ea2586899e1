use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Expected, user-recoverable outcomes of a shop operation. These are reported
/// back in conversation and never escalate to a failed request.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusinessFailure {
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("Your cart is empty. Add something before checking out.")]
    EmptyCart,
}

impl BusinessFailure {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_failure",
            Self::NotFound { .. } => "not_found",
            Self::EmptyCart => "empty_cart",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::InvalidInput(message) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Domain(error) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message)
            | ApplicationError::Configuration(message)
            | ApplicationError::Internal(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, BusinessFailure, DomainError, InterfaceError};

    #[test]
    fn invalid_input_maps_to_bad_request_with_correlation_id() {
        let interface =
            ApplicationError::InvalidInput("message must not be empty".to_owned()).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn integration_error_maps_to_retryable_service_unavailable() {
        let interface =
            ApplicationError::Integration("llm call timed out".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.is_retryable());
        assert_eq!(interface.message(), "llm call timed out");
    }

    #[test]
    fn unexpected_faults_keep_their_underlying_message() {
        let interface = ApplicationError::Domain(DomainError::InvariantViolation(
            "quantity overflow".to_owned(),
        ))
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(interface.message().contains("quantity overflow"));
        assert_eq!(interface.correlation_id(), "req-3");
        assert!(!interface.is_retryable());
    }

    #[test]
    fn business_failures_carry_stable_kinds() {
        assert_eq!(BusinessFailure::validation("bad size").kind(), "validation_failure");
        assert_eq!(BusinessFailure::not_found("no such order").kind(), "not_found");
        assert_eq!(BusinessFailure::EmptyCart.kind(), "empty_cart");
        assert_eq!(BusinessFailure::not_found("no such order").to_string(), "no such order");
    }
}
