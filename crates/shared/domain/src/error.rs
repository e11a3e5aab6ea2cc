//! Domain-level errors.
//!
//! These errors represent entity rule violations.
//! They are independent of infrastructure concerns (store client, transport).

use thiserror::Error;

/// Domain-specific errors for entity rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed for a field or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity type lacks a capability the operation needs
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        DomainError::Unsupported(msg.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
