//! Unit of Work pattern implementation over the table store.
//!
//! The store has no multi-row transactions, so a unit of work emulates one:
//! - Writes happen immediately through the repositories it hands out
//! - Each write leaves a compensating action in the unit of work's journal
//! - Commit discards the journal; rollback replays it newest-first
//!
//! A unit of work must end explicitly (`commit`, `rollback`, `close`) or be
//! driven through [`UnitOfWork::scope`]. Dropping an open one rolls it back
//! in the background as a last resort.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;

use common::{AppError, AppResult};
use domain::TableEntity;

use crate::compensation::{
    lock, replay, CompensationRecorder, Journal, RollbackSummary, SharedJournal, UnitOfWorkState,
};
use crate::config::TableStoreConfig;
use crate::repository::TableRepository;
use crate::store::TableClient;

type RepositoryCache = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Scope of one logical transaction.
///
/// Driven by a single caller; repositories obtained from it share its journal
/// and must not outlive its purpose.
pub struct UnitOfWork {
    client: Arc<dyn TableClient>,
    journal: SharedJournal,
    repositories: Mutex<RepositoryCache>,
    actor: Option<String>,
}

impl UnitOfWork {
    /// Open a new unit of work
    pub fn begin(client: Arc<dyn TableClient>) -> Self {
        tracing::debug!("Unit of work opened");
        Self {
            client,
            journal: Journal::shared(),
            repositories: Mutex::new(HashMap::new()),
            actor: None,
        }
    }

    /// Open a new unit of work with the configured actor
    pub fn from_config(client: Arc<dyn TableClient>, config: &TableStoreConfig) -> Self {
        let uow = Self::begin(client);
        match &config.actor {
            Some(actor) => uow.with_actor(actor.clone()),
            None => uow,
        }
    }

    /// Stamp created-by/modified-by with this name.
    ///
    /// Only affects repositories created afterwards.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn state(&self) -> UnitOfWorkState {
        lock(&self.journal).state
    }

    /// Number of compensating actions waiting in the journal
    pub fn pending(&self) -> usize {
        lock(&self.journal).actions.len()
    }

    /// Get the repository for `T`, creating it on first use.
    ///
    /// The same instance is returned for the lifetime of this unit of work.
    pub fn repository<T: TableEntity>(&self) -> AppResult<Arc<TableRepository<T>>> {
        let cached = {
            let mut repositories = self
                .repositories
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            repositories
                .entry(TypeId::of::<T>())
                .or_insert_with(|| {
                    tracing::debug!(table = T::TABLE_NAME, "Repository created");
                    Arc::new(TableRepository::<T>::new(
                        self.client.clone(),
                        CompensationRecorder::new(self.journal.clone()),
                        self.actor.clone(),
                    ))
                })
                .clone()
        };

        cached.downcast::<TableRepository<T>>().map_err(|_| {
            AppError::internal(format!(
                "Repository cache entry for {} has the wrong type",
                T::TABLE_NAME
            ))
        })
    }

    /// Keep every write made so far. Terminal.
    pub fn commit(&self) -> AppResult<()> {
        let mut journal = lock(&self.journal);
        if journal.state != UnitOfWorkState::Open {
            return Err(AppError::UnitOfWorkClosed(journal.state.to_string()));
        }

        let discarded = journal.finish(UnitOfWorkState::Committed);
        tracing::info!(writes = discarded.len(), "Unit of work committed");
        Ok(())
    }

    /// Undo every write made so far, newest first. Terminal.
    ///
    /// The journal is cleared even when some compensations fail; those
    /// failures come back together as `AppError::Compensation`.
    pub async fn rollback(&self) -> AppResult<RollbackSummary> {
        let actions = {
            let mut journal = lock(&self.journal);
            if journal.state != UnitOfWorkState::Open {
                return Err(AppError::UnitOfWorkClosed(journal.state.to_string()));
            }
            journal.finish(UnitOfWorkState::RolledBack)
        };

        if actions.is_empty() {
            tracing::debug!("Unit of work rolled back with nothing to undo");
            return Ok(RollbackSummary::default());
        }

        tracing::info!(pending = actions.len(), "Rolling back unit of work");
        match replay(self.client.as_ref(), actions).await {
            Ok(summary) => {
                tracing::info!(undone = summary.undone, "Unit of work rolled back");
                Ok(summary)
            }
            Err(failure) => {
                tracing::error!(
                    failed = failure.failures.len(),
                    attempted = failure.attempted,
                    "Unit of work rollback incomplete"
                );
                Err(failure.into())
            }
        }
    }

    /// End the unit of work, rolling back unless it was committed
    pub async fn close(self) -> AppResult<RollbackSummary> {
        if self.state() == UnitOfWorkState::Open {
            self.rollback().await
        } else {
            Ok(RollbackSummary::default())
        }
    }

    /// Run `f` in a fresh unit of work.
    ///
    /// Commits when `f` succeeds and rolls back when it fails. If the
    /// rollback itself fails the result is `AppError::Compensation`, carrying
    /// the original error message as its trigger.
    pub async fn scope<F, R>(client: Arc<dyn TableClient>, f: F) -> AppResult<R>
    where
        F: for<'a> FnOnce(&'a UnitOfWork) -> BoxFuture<'a, AppResult<R>> + Send,
        R: Send,
    {
        Self::begin(client).run(f).await
    }

    /// Run `f` in this unit of work with the same commit/rollback rules as
    /// [`UnitOfWork::scope`]. An `f` that ends the unit of work itself is
    /// left alone.
    pub async fn run<F, R>(self, f: F) -> AppResult<R>
    where
        F: for<'a> FnOnce(&'a UnitOfWork) -> BoxFuture<'a, AppResult<R>> + Send,
        R: Send,
    {
        let outcome = f(&self).await;

        if self.state() != UnitOfWorkState::Open {
            return outcome;
        }

        match outcome {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Unit of work failed, rolling back");
                match self.rollback().await {
                    Ok(_) => Err(err),
                    Err(AppError::Compensation(failure)) => {
                        Err(AppError::Compensation(failure.triggered_by(&err)))
                    }
                    Err(other) => Err(other),
                }
            }
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let journal = lock(&self.journal);
        f.debug_struct("UnitOfWork")
            .field("state", &journal.state)
            .field("pending", &journal.actions.len())
            .field("actor", &self.actor)
            .finish()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        let actions = {
            let mut journal = lock(&self.journal);
            if journal.state != UnitOfWorkState::Open {
                return;
            }
            journal.finish(UnitOfWorkState::RolledBack)
        };
        if actions.is_empty() {
            return;
        }

        tracing::warn!(
            pending = actions.len(),
            "Unit of work dropped without commit or close, rolling back"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                handle.spawn(async move {
                    match replay(client.as_ref(), actions).await {
                        Ok(summary) => tracing::info!(
                            undone = summary.undone,
                            "Abandoned unit of work rolled back"
                        ),
                        Err(failure) => tracing::error!(
                            %failure,
                            "Abandoned unit of work rollback incomplete"
                        ),
                    }
                });
            }
            Err(_) => {
                for action in &actions {
                    tracing::error!(action = %action, "Write left in place, no runtime to undo it");
                }
            }
        }
    }
}

/// Run a block inside a unit of work scope.
///
/// Commits when the block returns `Ok`, rolls back otherwise.
#[macro_export]
macro_rules! with_unit_of_work {
    ($client:expr, |$uow:ident| $body:expr) => {
        $crate::UnitOfWork::scope($client, |$uow| Box::pin(async move { $body })).await
    };
}
