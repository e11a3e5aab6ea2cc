//! Table store configuration.

use std::env;

use common::{LogConfig, StorageConfig, DEFAULT_CONNECTION_STRING, DEFAULT_PAGE_SIZE};

/// Table store configuration.
#[derive(Debug, Clone, Default)]
pub struct TableStoreConfig {
    pub storage: StorageConfig,
    /// Name stamped into created-by/modified-by
    pub actor: Option<String>,
    pub log: LogConfig,
}

impl TableStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            storage: StorageConfig {
                connection_string: env::var("STORAGE_CONNECTION_STRING")
                    .unwrap_or_else(|_| DEFAULT_CONNECTION_STRING.to_string()),
                page_size: parse_page_size(env::var("STORAGE_PAGE_SIZE").ok().as_deref()),
            },
            actor: env::var("STORAGE_ACTOR")
                .ok()
                .filter(|actor| !actor.trim().is_empty()),
            log: LogConfig::from_env(),
        }
    }
}

/// Page size within `1..=DEFAULT_PAGE_SIZE`, falling back to the default
fn parse_page_size(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_PAGE_SIZE;
    };

    match raw.trim().parse::<usize>() {
        Ok(size) if (1..=DEFAULT_PAGE_SIZE).contains(&size) => size,
        _ => {
            tracing::warn!(
                value = raw,
                default = DEFAULT_PAGE_SIZE,
                "Invalid STORAGE_PAGE_SIZE, using default"
            );
            DEFAULT_PAGE_SIZE
        }
    }
}
