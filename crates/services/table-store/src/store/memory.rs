//! In-process table store emulator.
//!
//! Behaves like the development storage emulator: tables must be created
//! before use, every write assigns a fresh concurrency token, and queries
//! return rows in key order, one segment at a time.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use common::{AppError, AppResult, DEFAULT_PAGE_SIZE};
use domain::EntityKey;

use super::client::{ContinuationToken, IfMatch, QuerySegment, StoredEntity, TableClient};

type Table = BTreeMap<EntityKey, StoredEntity>;

/// Table store kept in memory.
pub struct InMemoryTableClient {
    tables: RwLock<HashMap<String, Table>>,
    page_size: usize,
}

impl InMemoryTableClient {
    /// Create an empty store with the default segment size
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty store returning at most `page_size` rows per segment
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Names of all tables, sorted
    pub async fn table_names(&self) -> Vec<String> {
        let tables = self.tables.read().await;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn new_etag() -> String {
        format!("W/\"{}\"", Uuid::new_v4())
    }

    fn stamp(mut entity: StoredEntity) -> StoredEntity {
        entity.etag = Some(Self::new_etag());
        entity.timestamp = Some(Utc::now());
        entity
    }
}

impl Default for InMemoryTableClient {
    fn default() -> Self {
        Self::new()
    }
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, Table>,
    table: &str,
) -> AppResult<&'a mut Table> {
    tables
        .get_mut(table)
        .ok_or_else(|| AppError::TableNotFound(table.to_string()))
}

fn check_condition(table: &str, current: &StoredEntity, if_match: &IfMatch) -> AppResult<()> {
    if if_match.matches(current.etag.as_deref()) {
        Ok(())
    } else {
        Err(AppError::conflict(format!(
            "{} {} was modified by another writer",
            table, current.key
        )))
    }
}

#[async_trait]
impl TableClient for InMemoryTableClient {
    async fn create_table_if_not_exists(&self, table: &str) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), Table::new());
        tracing::debug!(table, "Table created");
        Ok(true)
    }

    async fn get(&self, table: &str, key: &EntityKey) -> AppResult<Option<StoredEntity>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| AppError::TableNotFound(table.to_string()))?;
        Ok(rows.get(key).cloned())
    }

    async fn insert(&self, table: &str, entity: StoredEntity) -> AppResult<StoredEntity> {
        let mut tables = self.tables.write().await;
        let rows = table_mut(&mut tables, table)?;
        if rows.contains_key(&entity.key) {
            return Err(AppError::duplicate(format!("{} {}", table, entity.key)));
        }

        let stored = Self::stamp(entity);
        rows.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        table: &str,
        entity: StoredEntity,
        if_match: IfMatch,
    ) -> AppResult<StoredEntity> {
        let mut tables = self.tables.write().await;
        let rows = table_mut(&mut tables, table)?;
        let current = rows.get(&entity.key).ok_or(AppError::NotFound)?;
        check_condition(table, current, &if_match)?;

        let stored = Self::stamp(entity);
        rows.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, table: &str, key: &EntityKey, if_match: IfMatch) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let rows = table_mut(&mut tables, table)?;
        let current = rows.get(key).ok_or(AppError::NotFound)?;
        check_condition(table, current, &if_match)?;

        rows.remove(key);
        Ok(())
    }

    async fn query_segment(
        &self,
        table: &str,
        partition_key: Option<String>,
        continuation: Option<ContinuationToken>,
    ) -> AppResult<QuerySegment> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| AppError::TableNotFound(table.to_string()))?;

        let partition_start = partition_key
            .as_ref()
            .map(|p| EntityKey::new(p.clone(), String::new()));
        let start = match (continuation.map(|c| c.to_key()), partition_start) {
            (Some(resume), Some(first)) => Some(resume.max(first)),
            (resume, first) => resume.or(first),
        };
        let lower = match &start {
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        };

        let mut matching = rows
            .range::<EntityKey, _>((lower, Bound::Unbounded))
            .map(|(_, row)| row)
            .take_while(|row| match &partition_key {
                Some(p) => &row.key.partition_key == p,
                None => true,
            });

        let entities: Vec<StoredEntity> = matching.by_ref().take(self.page_size).cloned().collect();
        let continuation = matching.next().map(|row| ContinuationToken::from_key(&row.key));

        Ok(QuerySegment {
            entities,
            continuation,
        })
    }
}
