//! Common utilities shared across the workspace.
//!
//! This crate provides:
//! - Unified error handling, including rollback failure reports
//! - Configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{AppError, AppResult, FailedCompensation, OptionExt, RollbackFailure};
