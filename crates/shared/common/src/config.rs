//! Shared configuration structures.

use serde::{Deserialize, Serialize};

/// Default connection string: the in-process development store
pub const DEFAULT_CONNECTION_STRING: &str = "UseDevelopmentStorage=true;";

/// Default (and maximum) number of rows the store returns per query segment
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Table store connection configuration.
#[derive(Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// Rows per query segment
    pub page_size: usize,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("connection_string", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Load from `LOG_LEVEL`, defaulting to `info`
    pub fn from_env() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Directive to use when `RUST_LOG` does not apply
    pub fn fallback_directive(&self, verbose: bool) -> &str {
        if verbose {
            "debug"
        } else {
            &self.level
        }
    }
}
