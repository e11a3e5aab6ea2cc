//! Generic table repository with compensation recording and audit mirroring.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use common::{AppResult, OptionExt};
use domain::{audit_table_name, DomainError, EntityKey, TableEntity};

use super::audit;
use crate::compensation::{Compensation, CompensationRecorder};
use crate::store::{ContinuationToken, IfMatch, StoredEntity, TableClient};

/// Repository contract for one entity type.
///
/// Every successful write leaves a compensating action in the owning unit
/// of work. Reads return soft-deleted rows as stored.
#[async_trait]
pub trait EntityRepository<T: TableEntity>: Send + Sync {
    /// Insert a new entity; the key must not exist yet
    async fn insert(&self, entity: T) -> AppResult<T>;

    /// Replace an existing entity, checking its concurrency token if it has one
    async fn update(&self, entity: T) -> AppResult<T>;

    /// Soft delete: flag the entity as deleted and replace it
    async fn delete(&self, entity: T) -> AppResult<T>;

    /// Find an entity by key
    async fn find(&self, partition_key: &str, row_key: &str) -> AppResult<Option<T>>;

    /// All entities of one partition, every page
    async fn find_all_in_partition(&self, partition_key: &str) -> AppResult<Vec<T>>;

    /// All entities of the table, every page
    async fn find_all(&self) -> AppResult<Vec<T>>;

    /// Create the table (and audit table, if tracked) when missing
    async fn ensure_table_exists(&self) -> AppResult<bool>;
}

/// Repository over the table store, bound to one unit of work.
pub struct TableRepository<T: TableEntity> {
    client: Arc<dyn TableClient>,
    recorder: CompensationRecorder,
    table: String,
    audit_table: Option<String>,
    actor: Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: TableEntity> TableRepository<T> {
    /// Create a repository that records into the given unit of work journal
    pub fn new(
        client: Arc<dyn TableClient>,
        recorder: CompensationRecorder,
        actor: Option<String>,
    ) -> Self {
        let table = T::TABLE_NAME.to_string();
        let audit_table = T::AUDIT_TRACKED.then(|| audit_table_name(&table));

        Self {
            client,
            recorder,
            table,
            audit_table,
            actor,
            _entity: PhantomData,
        }
    }

    /// Audit table name, for audit-tracked entity types
    pub fn audit_table_name(&self) -> Option<&str> {
        self.audit_table.as_deref()
    }

    /// Audit records of one entity, oldest first.
    ///
    /// Empty for entity types that are not audit-tracked.
    pub async fn history(&self, partition_key: &str, row_key: &str) -> AppResult<Vec<T>> {
        match &self.audit_table {
            Some(audit_table) => {
                let partition = audit::audit_partition(partition_key, row_key);
                self.collect(audit_table, Some(partition)).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Key rules for the primary row and, if tracked, its audit partition
    fn validate_key(&self, key: &EntityKey) -> AppResult<()> {
        key.validate()?;
        if self.audit_table.is_some() {
            audit::check_audit_partition(key)?;
        }
        Ok(())
    }

    /// Drain every query segment of a table
    async fn collect(&self, table: &str, partition_key: Option<String>) -> AppResult<Vec<T>> {
        let mut items = Vec::new();
        let mut continuation: Option<ContinuationToken> = None;
        let mut segments = 0usize;

        loop {
            let segment = self
                .client
                .query_segment(table, partition_key.clone(), continuation.take())
                .await?;
            segments += 1;

            for stored in segment.entities {
                items.push(stored.into_entity()?);
            }

            match segment.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        tracing::debug!(table, segments, rows = items.len(), "Query drained");
        Ok(items)
    }

    /// Fetch the row as the store currently has it, before it is replaced
    async fn current(&self, key: &EntityKey) -> AppResult<StoredEntity> {
        self.client.get(&self.table, key).await?.ok_or_not_found()
    }

    /// Replace and hand back the pre-image alongside the written row.
    ///
    /// Without a caller token the write is conditional on the pre-image's
    /// token, so the recorded pre-image is always the row that was replaced.
    async fn replace(&self, entity: &T) -> AppResult<(StoredEntity, StoredEntity)> {
        let before = self.current(entity.key()).await?;
        let if_match = IfMatch::from_etag(entity.etag().or(before.etag.as_deref()));
        let written = self
            .client
            .replace(&self.table, StoredEntity::from_entity(entity)?, if_match)
            .await?;
        Ok((before, written))
    }

    /// Write an audit copy of `written` and record its compensation
    async fn mirror(&self, written: &T) -> AppResult<()> {
        let Some(audit_table) = &self.audit_table else {
            return Ok(());
        };

        let mut record = written.clone();
        *record.key_mut() = audit::audit_key(written.key());
        record.set_etag(None);

        let stored = self
            .client
            .insert(audit_table, StoredEntity::from_entity(&record)?)
            .await?;
        tracing::debug!(table = %audit_table, key = %stored.key, "Audit record written");

        self.recorder.record(Compensation::UndoInsert {
            table: audit_table.clone(),
            key: stored.key,
            etag: stored.etag,
        });
        Ok(())
    }
}

#[async_trait]
impl<T: TableEntity> EntityRepository<T> for TableRepository<T> {
    async fn insert(&self, mut entity: T) -> AppResult<T> {
        self.recorder.ensure_open()?;
        self.validate_key(entity.key())?;

        if let Some(base) = entity.base_mut() {
            base.mark_created(Utc::now(), self.actor.as_deref());
        }

        let written = self
            .client
            .insert(&self.table, StoredEntity::from_entity(&entity)?)
            .await?;
        tracing::debug!(table = %self.table, key = %written.key, "Entity inserted");

        self.recorder.record(Compensation::UndoInsert {
            table: self.table.clone(),
            key: written.key.clone(),
            etag: written.etag.clone(),
        });

        let written: T = written.into_entity()?;
        self.mirror(&written).await?;
        Ok(written)
    }

    async fn update(&self, mut entity: T) -> AppResult<T> {
        self.recorder.ensure_open()?;
        self.validate_key(entity.key())?;

        if let Some(base) = entity.base_mut() {
            base.mark_modified(Utc::now(), self.actor.as_deref());
        }

        let (before, written) = self.replace(&entity).await?;
        tracing::debug!(table = %self.table, key = %written.key, "Entity replaced");

        self.recorder.record(Compensation::UndoReplace {
            table: self.table.clone(),
            before,
            etag: written.etag.clone(),
        });

        let written: T = written.into_entity()?;
        self.mirror(&written).await?;
        Ok(written)
    }

    async fn delete(&self, mut entity: T) -> AppResult<T> {
        self.recorder.ensure_open()?;
        self.validate_key(entity.key())?;

        let Some(base) = entity.base_mut() else {
            return Err(DomainError::unsupported(format!(
                "{} has no soft-delete flag",
                T::TABLE_NAME
            ))
            .into());
        };
        base.mark_deleted(Utc::now(), self.actor.as_deref());

        let (before, written) = self.replace(&entity).await?;
        tracing::debug!(table = %self.table, key = %written.key, "Entity soft deleted");

        self.recorder.record(Compensation::UndoDelete {
            table: self.table.clone(),
            before,
            etag: written.etag.clone(),
        });

        let written: T = written.into_entity()?;
        self.mirror(&written).await?;
        Ok(written)
    }

    async fn find(&self, partition_key: &str, row_key: &str) -> AppResult<Option<T>> {
        let key = EntityKey::new(partition_key, row_key);
        self.client
            .get(&self.table, &key)
            .await?
            .map(StoredEntity::into_entity::<T>)
            .transpose()
    }

    async fn find_all_in_partition(&self, partition_key: &str) -> AppResult<Vec<T>> {
        self.collect(&self.table, Some(partition_key.to_string()))
            .await
    }

    async fn find_all(&self) -> AppResult<Vec<T>> {
        self.collect(&self.table, None).await
    }

    async fn ensure_table_exists(&self) -> AppResult<bool> {
        let mut created = self.client.create_table_if_not_exists(&self.table).await?;
        if let Some(audit_table) = &self.audit_table {
            created |= self.client.create_table_if_not_exists(audit_table).await?;
        }

        if created {
            tracing::info!(
                table = %self.table,
                audit_table = self.audit_table.as_deref().unwrap_or("-"),
                "Tables provisioned"
            );
        }
        Ok(created)
    }
}
