//! Storage connection strings and client construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{AppError, AppResult, StorageConfig};

use super::client::TableClient;
use super::memory::InMemoryTableClient;

/// Settings whose values never appear in logs
const SECRET_SETTINGS: &[&str] = &["accountkey", "sharedaccesssignature"];

/// Parsed `Key=Value;Key=Value` connection string.
///
/// Keys are case-insensitive; the last occurrence of a key wins.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    settings: BTreeMap<String, String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let mut settings = BTreeMap::new();

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                AppError::validation(format!("Connection string setting '{}' has no value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(AppError::validation("Connection string setting has an empty name"));
            }
            settings.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }

        if settings.is_empty() {
            return Err(AppError::validation("Connection string is empty"));
        }

        Ok(Self { settings })
    }

    /// Look up a setting by (case-insensitive) name
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_development_storage(&self) -> bool {
        self.get("UseDevelopmentStorage")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn account_name(&self) -> Option<&str> {
        self.get("AccountName")
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.settings {
            if SECRET_SETTINGS.contains(&key.as_str()) {
                map.entry(key, &"[REDACTED]");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Build a table client for the configured storage account.
///
/// Development storage maps to the in-process emulator.
pub fn connect(config: &StorageConfig) -> AppResult<Arc<dyn TableClient>> {
    let connection = ConnectionString::parse(&config.connection_string)?;

    if connection.is_development_storage() {
        tracing::info!(
            page_size = config.page_size,
            "Using in-process development table storage"
        );
        return Ok(Arc::new(InMemoryTableClient::with_page_size(config.page_size)));
    }

    let account = connection.account_name().unwrap_or("<unnamed>");
    Err(AppError::unavailable(format!(
        "No table backend available for storage account {}",
        account
    )))
}
