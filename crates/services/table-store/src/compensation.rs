//! Compensating actions and the rollback executor.
//!
//! Every successful write made through a repository leaves one
//! [`Compensation`] in its unit of work's journal. Rolling back replays the
//! journal newest-first through [`replay`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use common::{AppError, AppResult, FailedCompensation, RollbackFailure};
use domain::{EntityKey, SOFT_DELETE_PROPERTY};

use crate::store::{IfMatch, StoredEntity, TableClient};

/// Reversal of exactly one completed write.
///
/// `etag` is the concurrency token the forward write produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Remove a row that was inserted
    UndoInsert {
        table: String,
        key: EntityKey,
        etag: Option<String>,
    },
    /// Put back the row as it was before a replace
    UndoReplace {
        table: String,
        before: StoredEntity,
        etag: Option<String>,
    },
    /// Put back the row as it was before a soft delete, flag cleared
    UndoDelete {
        table: String,
        before: StoredEntity,
        etag: Option<String>,
    },
}

impl Compensation {
    pub fn kind(&self) -> &'static str {
        match self {
            Compensation::UndoInsert { .. } => "undo-insert",
            Compensation::UndoReplace { .. } => "undo-replace",
            Compensation::UndoDelete { .. } => "undo-delete",
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Compensation::UndoInsert { table, .. }
            | Compensation::UndoReplace { table, .. }
            | Compensation::UndoDelete { table, .. } => table,
        }
    }

    pub fn key(&self) -> &EntityKey {
        match self {
            Compensation::UndoInsert { key, .. } => key,
            Compensation::UndoReplace { before, .. } | Compensation::UndoDelete { before, .. } => {
                &before.key
            }
        }
    }

    fn written_etag(&self) -> Option<&str> {
        match self {
            Compensation::UndoInsert { etag, .. }
            | Compensation::UndoReplace { etag, .. }
            | Compensation::UndoDelete { etag, .. } => etag.as_deref(),
        }
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind(), self.table(), self.key())
    }
}

// =============================================================================
// Journal
// =============================================================================

/// Lifecycle of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfWorkState::Open => write!(f, "open"),
            UnitOfWorkState::Committed => write!(f, "committed"),
            UnitOfWorkState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Pending compensations of one unit of work, in enqueue order.
#[derive(Debug)]
pub(crate) struct Journal {
    pub(crate) state: UnitOfWorkState,
    pub(crate) actions: Vec<Compensation>,
}

impl Journal {
    pub(crate) fn shared() -> SharedJournal {
        Arc::new(Mutex::new(Journal {
            state: UnitOfWorkState::Open,
            actions: Vec::new(),
        }))
    }

    /// Move to a terminal state and hand out whatever was pending.
    ///
    /// The journal is empty afterwards whatever the caller does with the
    /// returned actions.
    pub(crate) fn finish(&mut self, state: UnitOfWorkState) -> Vec<Compensation> {
        self.state = state;
        std::mem::take(&mut self.actions)
    }
}

pub(crate) type SharedJournal = Arc<Mutex<Journal>>;

pub(crate) fn lock(journal: &SharedJournal) -> MutexGuard<'_, Journal> {
    journal.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only handle on a unit of work's journal, held by repositories.
#[derive(Clone)]
pub struct CompensationRecorder {
    journal: SharedJournal,
}

impl CompensationRecorder {
    pub(crate) fn new(journal: SharedJournal) -> Self {
        Self { journal }
    }

    /// Fail unless the owning unit of work still accepts writes
    pub fn ensure_open(&self) -> AppResult<()> {
        match lock(&self.journal).state {
            UnitOfWorkState::Open => Ok(()),
            state => Err(AppError::UnitOfWorkClosed(state.to_string())),
        }
    }

    /// Record the reversal of a write that has already succeeded
    pub fn record(&self, action: Compensation) {
        tracing::debug!(action = %action, "Compensation recorded");
        lock(&self.journal).actions.push(action);
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Outcome of a rollback in which every compensation succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    /// Number of compensations executed
    pub undone: usize,
}

/// Replay compensations newest-first, best-effort.
///
/// A failed compensation does not stop the remaining ones; all failures are
/// returned together. Undoing a write changes the row's token, so the tokens
/// produced here are tracked and substituted for the stale ones recorded by
/// older compensations on the same row.
pub async fn replay(
    client: &dyn TableClient,
    actions: Vec<Compensation>,
) -> Result<RollbackSummary, RollbackFailure> {
    let attempted = actions.len();
    let mut failures = Vec::new();
    // forward-write token -> token currently on the row
    let mut current_etags: HashMap<String, String> = HashMap::new();

    for action in actions.into_iter().rev() {
        match execute(client, &action, &current_etags).await {
            Ok(Some((restored_from, now))) => {
                tracing::debug!(action = %action, "Compensation applied");
                current_etags.insert(restored_from, now);
            }
            Ok(None) => tracing::debug!(action = %action, "Compensation applied"),
            Err(err) => {
                tracing::error!(action = %action, error = %err, "Compensation failed");
                failures.push(FailedCompensation::new(action.to_string(), &err));
            }
        }
    }

    if failures.is_empty() {
        Ok(RollbackSummary { undone: attempted })
    } else {
        Err(RollbackFailure::new(attempted, failures))
    }
}

/// Run one compensation.
///
/// Returns `(pre-image token, new token)` when a pre-image was written back.
async fn execute(
    client: &dyn TableClient,
    action: &Compensation,
    current_etags: &HashMap<String, String>,
) -> AppResult<Option<(String, String)>> {
    let if_match = {
        let written = action.written_etag();
        let current = written.map(|tag| current_etags.get(tag).map(String::as_str).unwrap_or(tag));
        IfMatch::from_etag(current)
    };

    match action {
        Compensation::UndoInsert { table, key, .. } => {
            match client.delete(table, key, if_match).await {
                Ok(()) => Ok(None),
                Err(AppError::NotFound) => {
                    tracing::debug!(%table, %key, "Inserted row already gone");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        }
        Compensation::UndoReplace { table, before, .. } => {
            restore(client, table, before.clone(), if_match).await
        }
        Compensation::UndoDelete { table, before, .. } => {
            let mut before = before.clone();
            before
                .properties
                .insert(SOFT_DELETE_PROPERTY.to_string(), Value::Bool(false));
            restore(client, table, before, if_match).await
        }
    }
}

async fn restore(
    client: &dyn TableClient,
    table: &str,
    mut before: StoredEntity,
    if_match: IfMatch,
) -> AppResult<Option<(String, String)>> {
    let restored_from = before.etag.take();
    let written = client.replace(table, before, if_match).await?;
    Ok(restored_from.zip(written.etag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockTableClient;
    use mockall::Sequence;
    use serde_json::Map;

    fn stored(partition: &str, row: &str, etag: &str) -> StoredEntity {
        StoredEntity {
            key: EntityKey::new(partition, row),
            etag: Some(etag.to_string()),
            timestamp: None,
            properties: Map::new(),
        }
    }

    fn undo_insert(row: &str, etag: &str) -> Compensation {
        Compensation::UndoInsert {
            table: "Book".to_string(),
            key: EntityKey::new("P1", row),
            etag: Some(etag.to_string()),
        }
    }

    #[test]
    fn test_display_names_kind_table_and_key() {
        assert_eq!(undo_insert("R1", "e1").to_string(), "undo-insert Book (P1, R1)");
    }

    #[test]
    fn test_recorder_rejects_writes_after_finish() {
        let journal = Journal::shared();
        let recorder = CompensationRecorder::new(journal.clone());
        recorder.ensure_open().unwrap();
        recorder.record(undo_insert("R1", "e1"));

        let drained = lock(&journal).finish(UnitOfWorkState::Committed);
        assert_eq!(drained.len(), 1);
        assert!(lock(&journal).actions.is_empty());

        let err = recorder.ensure_open().unwrap_err();
        assert!(matches!(err, AppError::UnitOfWorkClosed(s) if s == "committed"));
    }

    #[tokio::test]
    async fn test_replay_runs_newest_first() {
        let mut client = MockTableClient::new();
        let mut seq = Sequence::new();
        client
            .expect_delete()
            .withf(|_, key, _| key.row_key == "R2")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        client
            .expect_delete()
            .withf(|_, key, _| key.row_key == "R1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let summary = replay(&client, vec![undo_insert("R1", "e1"), undo_insert("R2", "e2")])
            .await
            .unwrap();
        assert_eq!(summary.undone, 2);
    }

    #[tokio::test]
    async fn test_replay_continues_after_failure_and_reports_all() {
        let mut client = MockTableClient::new();
        client
            .expect_delete()
            .withf(|_, key, _| key.row_key == "R3")
            .returning(|_, _, _| Err(AppError::unavailable("connection reset")));
        client
            .expect_delete()
            .withf(|_, key, _| key.row_key == "R2")
            .returning(|_, _, _| Ok(()));
        client
            .expect_delete()
            .withf(|_, key, _| key.row_key == "R1")
            .returning(|_, _, _| Err(AppError::conflict("stale")));

        let failure = replay(
            &client,
            vec![undo_insert("R1", "e1"), undo_insert("R2", "e2"), undo_insert("R3", "e3")],
        )
        .await
        .unwrap_err();

        assert_eq!(failure.attempted, 3);
        assert_eq!(failure.failures.len(), 2);
        assert_eq!(failure.failures[0].code, "STORE_UNAVAILABLE");
        assert_eq!(failure.failures[1].action, "undo-insert Book (P1, R1)");
    }

    #[tokio::test]
    async fn test_undo_insert_of_missing_row_counts_as_done() {
        let mut client = MockTableClient::new();
        client
            .expect_delete()
            .returning(|_, _, _| Err(AppError::NotFound));

        let summary = replay(&client, vec![undo_insert("R1", "e1")]).await.unwrap();
        assert_eq!(summary.undone, 1);
    }

    #[tokio::test]
    async fn test_older_undo_uses_token_from_newer_undo() {
        // insert (e1) -> update (e1 -> e2) -> update (e2 -> e3), then roll back
        let mut client = MockTableClient::new();
        let mut seq = Sequence::new();
        client
            .expect_replace()
            .withf(|_, entity, if_match| {
                entity.etag.is_none() && *if_match == IfMatch::ETag("e3".into())
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, mut entity, _| {
                entity.etag = Some("u1".into());
                Ok(entity)
            });
        client
            .expect_replace()
            .withf(|_, _, if_match| *if_match == IfMatch::ETag("u1".into()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, mut entity, _| {
                entity.etag = Some("u2".into());
                Ok(entity)
            });
        client
            .expect_delete()
            .withf(|_, _, if_match| *if_match == IfMatch::ETag("u2".into()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let actions = vec![
            undo_insert("R1", "e1"),
            Compensation::UndoReplace {
                table: "Book".into(),
                before: stored("P1", "R1", "e1"),
                etag: Some("e2".into()),
            },
            Compensation::UndoReplace {
                table: "Book".into(),
                before: stored("P1", "R1", "e2"),
                etag: Some("e3".into()),
            },
        ];

        let summary = replay(&client, actions).await.unwrap();
        assert_eq!(summary.undone, 3);
    }

    #[tokio::test]
    async fn test_undo_delete_clears_soft_delete_flag() {
        let mut client = MockTableClient::new();
        client
            .expect_replace()
            .withf(|_, entity, _| entity.properties[SOFT_DELETE_PROPERTY] == Value::Bool(false))
            .times(1)
            .returning(|_, entity, _| Ok(entity));

        let mut before = stored("P1", "R1", "e1");
        before
            .properties
            .insert(SOFT_DELETE_PROPERTY.to_string(), Value::Bool(true));

        let action = Compensation::UndoDelete {
            table: "Book".into(),
            before,
            etag: Some("e2".into()),
        };
        replay(&client, vec![action]).await.unwrap();
    }
}
