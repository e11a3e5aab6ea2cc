//! Unified error handling for store operations and units of work.
//!
//! Provides a single error type for:
//! - forward repository operations (not found, conflicts, duplicates)
//! - store transport failures
//! - rollback failures of a unit of work

use std::fmt;

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("{0} already exists")]
    DuplicateKey(String),

    #[error("Table {0} does not exist")]
    TableNotFound(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    // Infrastructure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Unit of work
    #[error("Unit of work is {0}")]
    UnitOfWorkClosed(String),

    #[error(transparent)]
    Compensation(#[from] RollbackFailure),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get stable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::DuplicateKey(_) => "DUPLICATE_KEY",
            AppError::TableNotFound(_) => "TABLE_NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::UnitOfWorkClosed(_) => "UNIT_OF_WORK_CLOSED",
            AppError::Compensation(_) => "COMPENSATION_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// =============================================================================
// Rollback Failure
// =============================================================================

/// One compensating action that failed while a unit of work rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCompensation {
    /// Human-readable description of the action (kind, table, key)
    pub action: String,
    /// Error code of the failure
    pub code: &'static str,
    /// Error message of the failure
    pub message: String,
}

impl FailedCompensation {
    pub fn new(action: impl Into<String>, error: &AppError) -> Self {
        Self {
            action: action.into(),
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Aggregated report of a rollback that could not undo everything.
///
/// The writes behind `failures` are still in the store; the remaining
/// actions were undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackFailure {
    /// Number of compensating actions attempted
    pub attempted: usize,
    pub failures: Vec<FailedCompensation>,
    /// Message of the error that triggered the rollback, if any
    pub trigger: Option<String>,
}

impl RollbackFailure {
    pub fn new(attempted: usize, failures: Vec<FailedCompensation>) -> Self {
        Self {
            attempted,
            failures,
            trigger: None,
        }
    }

    /// Attach the error that caused the rollback
    pub fn triggered_by(mut self, error: &AppError) -> Self {
        self.trigger = Some(error.to_string());
        self
    }
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} compensating actions failed during rollback",
            self.failures.len(),
            self.attempted
        )?;
        if let Some(trigger) = &self.trigger {
            write!(f, " (rollback triggered by: {})", trigger)?;
        }
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.action, failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for RollbackFailure {}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::Unsupported(msg) => AppError::Validation(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::ConcurrencyConflict(msg.into())
    }

    pub fn duplicate(key: impl Into<String>) -> Self {
        AppError::DuplicateKey(key.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        AppError::StoreUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_maps_to_validation() {
        let err: AppError = DomainError::validation("row key must not be empty").into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.to_string(), "row key must not be empty");
    }

    #[test]
    fn test_rollback_failure_lists_every_failure() {
        let failures = vec![
            FailedCompensation::new("undo-insert Book (P1, R1)", &AppError::unavailable("timeout")),
            FailedCompensation::new("undo-replace Book (P1, R2)", &AppError::conflict("etag")),
        ];
        let err = AppError::from(RollbackFailure::new(3, failures).triggered_by(&AppError::NotFound));

        assert_eq!(err.code(), "COMPENSATION_FAILURE");
        let msg = err.to_string();
        assert!(msg.starts_with("2 of 3 compensating actions failed"));
        assert!(msg.contains("Resource not found"));
        assert!(msg.contains("undo-replace Book (P1, R2)"));
    }

    #[test]
    fn test_option_ext() {
        let missing: Option<u8> = None;
        assert!(matches!(missing.ok_or_not_found(), Err(AppError::NotFound)));
        assert_eq!(Some(1).ok_or_not_found().unwrap(), 1);
    }
}
