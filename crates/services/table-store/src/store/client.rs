//! Table store client contract.
//!
//! The repository only talks to the store through [`TableClient`], so any
//! partitioned key-value backend with per-row concurrency tokens fits behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use common::{AppError, AppResult};
use domain::{EntityKey, TableEntity};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// The store's view of one row: key, concurrency token and property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub key: EntityKey,
    /// Concurrency token assigned by the store on the last write
    pub etag: Option<String>,
    /// Server timestamp of the last write
    pub timestamp: Option<DateTime<Utc>>,
    pub properties: Map<String, Value>,
}

impl StoredEntity {
    /// Build the property bag of a typed entity
    pub fn from_entity<T: TableEntity>(entity: &T) -> AppResult<Self> {
        let properties = match serde_json::to_value(entity)? {
            Value::Object(map) => map,
            other => {
                return Err(AppError::internal(format!(
                    "{} must serialize to an object, got {}",
                    T::TABLE_NAME,
                    other
                )))
            }
        };

        Ok(Self {
            key: entity.key().clone(),
            etag: entity.etag().map(str::to_string),
            timestamp: None,
            properties,
        })
    }

    /// Rebuild the typed entity, carrying over key and concurrency token
    pub fn into_entity<T: TableEntity>(self) -> AppResult<T> {
        let mut entity: T = serde_json::from_value(Value::Object(self.properties))?;
        *entity.key_mut() = self.key;
        entity.set_etag(self.etag);
        Ok(entity)
    }
}

/// Optimistic concurrency condition for replace and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfMatch {
    /// Write regardless of the current token
    Any,
    /// Write only if the current token equals this one
    ETag(String),
}

impl IfMatch {
    /// Conditional on the given token, unconditional without one
    pub fn from_etag(etag: Option<&str>) -> Self {
        match etag {
            Some(tag) if !tag.is_empty() => IfMatch::ETag(tag.to_string()),
            _ => IfMatch::Any,
        }
    }

    pub fn matches(&self, current: Option<&str>) -> bool {
        match self {
            IfMatch::Any => true,
            IfMatch::ETag(expected) => current == Some(expected.as_str()),
        }
    }
}

/// Resume point of a segmented query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

impl ContinuationToken {
    pub fn from_key(key: &EntityKey) -> Self {
        Self {
            next_partition_key: key.partition_key.clone(),
            next_row_key: key.row_key.clone(),
        }
    }

    pub fn to_key(&self) -> EntityKey {
        EntityKey::new(self.next_partition_key.clone(), self.next_row_key.clone())
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QuerySegment {
    pub entities: Vec<StoredEntity>,
    /// Present while more rows remain
    pub continuation: Option<ContinuationToken>,
}

/// Partitioned table store client.
///
/// Errors: missing tables are `TableNotFound`, missing rows `NotFound`,
/// insert collisions `DuplicateKey`, token mismatches `ConcurrencyConflict`,
/// transport failures `StoreUnavailable`.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Create a table; returns false if it already existed
    async fn create_table_if_not_exists(&self, table: &str) -> AppResult<bool>;

    /// Point read by key
    async fn get(&self, table: &str, key: &EntityKey) -> AppResult<Option<StoredEntity>>;

    /// Insert a new row; fails if the key is taken
    async fn insert(&self, table: &str, entity: StoredEntity) -> AppResult<StoredEntity>;

    /// Replace an existing row under the given concurrency condition
    async fn replace(
        &self,
        table: &str,
        entity: StoredEntity,
        if_match: IfMatch,
    ) -> AppResult<StoredEntity>;

    /// Physically remove a row under the given concurrency condition
    async fn delete(&self, table: &str, key: &EntityKey, if_match: IfMatch) -> AppResult<()>;

    /// Fetch one page of rows, optionally restricted to a partition
    async fn query_segment(
        &self,
        table: &str,
        partition_key: Option<String>,
        continuation: Option<ContinuationToken>,
    ) -> AppResult<QuerySegment>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Book;
    use uuid::Uuid;

    #[test]
    fn test_if_match_from_etag() {
        assert_eq!(IfMatch::from_etag(None), IfMatch::Any);
        assert_eq!(IfMatch::from_etag(Some("")), IfMatch::Any);
        assert_eq!(IfMatch::from_etag(Some("e1")), IfMatch::ETag("e1".into()));
    }

    #[test]
    fn test_if_match_matches() {
        assert!(IfMatch::Any.matches(None));
        assert!(IfMatch::ETag("e1".into()).matches(Some("e1")));
        assert!(!IfMatch::ETag("e1".into()).matches(Some("e2")));
        assert!(!IfMatch::ETag("e1".into()).matches(None));
    }

    #[test]
    fn test_stored_entity_carries_key_and_etag() {
        let mut book = Book::new(Uuid::new_v4(), "ABPress").with_title("Journey");
        book.etag = Some("e1".to_string());

        let stored = StoredEntity::from_entity(&book).unwrap();
        assert_eq!(stored.key, book.key);
        assert_eq!(stored.etag.as_deref(), Some("e1"));
        assert_eq!(stored.properties["title"], "Journey");

        let back: Book = stored.into_entity().unwrap();
        assert_eq!(back, book);
    }
}
