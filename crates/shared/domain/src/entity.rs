//! Table entity model: two-part keys, concurrency tokens and base fields.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::constants::{FORBIDDEN_KEY_CHARS, MAX_KEY_LENGTH};
use crate::error::{DomainError, DomainResult};

/// Two-part record address: partition key plus row key.
///
/// Ordered by partition first, then row, which is also the order the store
/// returns rows in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub partition_key: String,
    pub row_key: String,
}

impl EntityKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    /// Check both key parts against the store's key rules
    pub fn validate(&self) -> DomainResult<()> {
        validate_key_part("partition key", &self.partition_key)?;
        validate_key_part("row key", &self.row_key)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.row_key)
    }
}

fn validate_key_part(name: &str, value: &str) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::validation(format!("{} must not be empty", name)));
    }
    if value.chars().count() > MAX_KEY_LENGTH {
        return Err(DomainError::validation(format!(
            "{} exceeds {} characters",
            name, MAX_KEY_LENGTH
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control())
    {
        return Err(DomainError::validation(format!(
            "{} contains forbidden character {:?}",
            name, c
        )));
    }
    Ok(())
}

/// Soft-delete flag and bookkeeping timestamps.
///
/// Maintained by the repository on every write; callers should treat these
/// fields as read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseFields {
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
}

impl BaseFields {
    /// Stamp a fresh insert
    pub fn mark_created(&mut self, now: DateTime<Utc>, actor: Option<&str>) {
        self.is_deleted = false;
        self.created_date = Some(now);
        self.created_by = actor.map(str::to_string);
        self.modified_date = Some(now);
        self.modified_by = actor.map(str::to_string);
    }

    /// Stamp a replace of a live record
    pub fn mark_modified(&mut self, now: DateTime<Utc>, actor: Option<&str>) {
        self.is_deleted = false;
        self.modified_date = Some(now);
        self.modified_by = actor.map(str::to_string);
    }

    /// Stamp a soft delete
    pub fn mark_deleted(&mut self, now: DateTime<Utc>, actor: Option<&str>) {
        self.is_deleted = true;
        self.modified_date = Some(now);
        self.modified_by = actor.map(str::to_string);
    }
}

/// A record that lives in one table of the partitioned store.
///
/// The entity's serde representation is its property bag. The concurrency
/// token is carried separately and should be skipped by serde.
pub trait TableEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the primary table (the entity type name)
    const TABLE_NAME: &'static str;

    /// Audit capability: every mutation is mirrored into `{TABLE_NAME}Audit`
    const AUDIT_TRACKED: bool = false;

    fn key(&self) -> &EntityKey;

    fn key_mut(&mut self) -> &mut EntityKey;

    /// Concurrency token from the last read or write, if any
    fn etag(&self) -> Option<&str>;

    fn set_etag(&mut self, etag: Option<String>);

    /// Soft-delete and timestamp fields, for entity types that carry them
    fn base(&self) -> Option<&BaseFields> {
        None
    }

    fn base_mut(&mut self) -> Option<&mut BaseFields> {
        None
    }

    /// Check if the entity has been soft deleted
    fn is_deleted(&self) -> bool {
        self.base().map(|b| b.is_deleted).unwrap_or(false)
    }
}
