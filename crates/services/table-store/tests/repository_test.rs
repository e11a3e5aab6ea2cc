//! Repository integration tests against the in-process store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::AppError;
use domain::{Book, EntityKey, TableEntity};
use table_store::{EntityRepository, InMemoryTableClient, TableClient, UnitOfWork};

/// Plain entity: no base fields, not audit-tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    #[serde(flatten)]
    key: EntityKey,
    #[serde(skip)]
    etag: Option<String>,
    text: String,
}

impl Note {
    fn new(partition: &str, row: &str, text: &str) -> Self {
        Self {
            key: EntityKey::new(partition, row),
            etag: None,
            text: text.to_string(),
        }
    }
}

impl TableEntity for Note {
    const TABLE_NAME: &'static str = "Note";

    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn key_mut(&mut self) -> &mut EntityKey {
        &mut self.key
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }
}

fn create_test_book(publisher: &str) -> Book {
    Book::new(Uuid::new_v4(), publisher)
        .with_title("A Book")
        .with_author("Joe Bloggs")
}

fn client() -> Arc<dyn TableClient> {
    Arc::new(InMemoryTableClient::new())
}

#[tokio::test]
async fn test_insert_assigns_etag_and_base_fields() {
    let uow = UnitOfWork::begin(client()).with_actor("librarian");
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let book = assert_ok!(books.insert(create_test_book("ABPress")).await);
    assert!(book.etag.is_some());
    assert!(!book.base.is_deleted);
    assert_eq!(book.base.created_by.as_deref(), Some("librarian"));
    assert!(book.base.created_date.is_some());

    let found = assert_ok!(books.find("ABPress", &book.key.row_key).await);
    assert_eq!(found, Some(book));
    assert_ok!(uow.commit());
}

#[tokio::test]
async fn test_find_missing_returns_none() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let found = assert_ok!(books.find("ABPress", "missing").await);
    assert!(found.is_none());
}

#[tokio::test]
async fn test_find_without_table_fails() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());

    let err = assert_err!(books.find("ABPress", "R1").await);
    assert!(matches!(err, AppError::TableNotFound(t) if t == "Book"));
}

#[tokio::test]
async fn test_ensure_table_exists_is_idempotent() {
    let store = Arc::new(InMemoryTableClient::new());
    let uow = UnitOfWork::begin(store.clone());
    let books = assert_ok!(uow.repository::<Book>());

    assert!(assert_ok!(books.ensure_table_exists().await));
    assert!(!assert_ok!(books.ensure_table_exists().await));
    assert_eq!(store.table_names().await, vec!["Book", "BookAudit"]);
}

#[tokio::test]
async fn test_duplicate_insert_records_nothing() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let book = assert_ok!(books.insert(create_test_book("ABPress")).await);
    let pending = uow.pending();

    let err = assert_err!(books.insert(book).await);
    assert!(matches!(err, AppError::DuplicateKey(_)));
    assert_eq!(uow.pending(), pending);
}

#[tokio::test]
async fn test_invalid_key_rejected_before_write() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let mut book = create_test_book("ABPress");
    book.key.row_key = "a/b".to_string();

    let err = assert_err!(books.insert(book).await);
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(uow.pending(), 0);
}

#[tokio::test]
async fn test_key_too_long_for_audit_partition_rejected_before_write() {
    let store = Arc::new(InMemoryTableClient::new());
    let uow = UnitOfWork::begin(store.clone());
    let books = assert_ok!(uow.repository::<Book>());
    let notes = assert_ok!(uow.repository::<Note>());
    assert_ok!(books.ensure_table_exists().await);
    assert_ok!(notes.ensure_table_exists().await);

    let partition = "p".repeat(600);
    let row = "r".repeat(600);

    let mut book = create_test_book("ABPress");
    book.key = EntityKey::new(&partition, &row);
    let err = assert_err!(books.insert(book).await);
    assert!(matches!(err, AppError::Validation(msg) if msg.contains("audit partition")));
    assert_eq!(uow.pending(), 0);
    assert!(assert_ok!(books.find_all().await).is_empty());

    // untracked types have no audit partition to overflow
    assert_ok!(notes.insert(Note::new(&partition, &row, "long keys")).await);
    assert_eq!(uow.pending(), 1);
}

#[tokio::test]
async fn test_update_missing_entity_is_not_found() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let err = assert_err!(books.update(create_test_book("ABPress")).await);
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(uow.pending(), 0);
}

#[tokio::test]
async fn test_update_with_stale_etag_conflicts() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let original = assert_ok!(books.insert(create_test_book("ABPress")).await);
    assert_ok!(books.update(original.clone().with_author("Someone Else")).await);
    let pending = uow.pending();

    let err = assert_err!(books.update(original.with_author("Late Writer")).await);
    assert!(matches!(err, AppError::ConcurrencyConflict(_)));
    assert_eq!(uow.pending(), pending);
}

#[tokio::test]
async fn test_update_without_etag_overwrites() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let mut book = assert_ok!(books.insert(create_test_book("ABPress")).await);
    book.etag = None;

    let updated = assert_ok!(books.update(book.with_author("Josephine Bloke")).await);
    assert_eq!(updated.author, "Josephine Bloke");
}

#[tokio::test]
async fn test_soft_deleted_entity_stays_visible() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let book = assert_ok!(books.insert(create_test_book("ABPress")).await);
    let deleted = assert_ok!(books.delete(book.clone()).await);
    assert!(deleted.is_deleted());

    let found = assert_ok!(books.find("ABPress", &book.key.row_key).await);
    assert!(found.map(|b| b.is_deleted()).unwrap_or(false));
    assert_eq!(assert_ok!(books.find_all().await).len(), 1);
}

#[tokio::test]
async fn test_find_all_follows_continuation_tokens() {
    let uow = UnitOfWork::begin(Arc::new(InMemoryTableClient::with_page_size(3)));
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    for _ in 0..10 {
        assert_ok!(books.insert(create_test_book("ABPress")).await);
    }
    for _ in 0..4 {
        assert_ok!(books.insert(create_test_book("Other")).await);
    }

    assert_eq!(assert_ok!(books.find_all().await).len(), 14);

    let partition = assert_ok!(books.find_all_in_partition("ABPress").await);
    assert_eq!(partition.len(), 10);
    assert!(partition.iter().all(|b| b.publisher == "ABPress"));
}

#[tokio::test]
async fn test_every_write_leaves_one_audit_record() {
    let uow = UnitOfWork::begin(client());
    let books = assert_ok!(uow.repository::<Book>());
    assert_ok!(books.ensure_table_exists().await);

    let book = assert_ok!(books.insert(create_test_book("ABPress")).await);
    let book = assert_ok!(books.update(book.with_author("B")).await);
    let book = assert_ok!(books.update(book.with_author("C")).await);
    assert_ok!(books.delete(book.clone()).await);

    let history = assert_ok!(books.history("ABPress", &book.key.row_key).await);
    assert_eq!(history.len(), 4);

    let partition = format!("ABPress-{}", book.key.row_key);
    assert!(history.iter().all(|r| r.key.partition_key == partition));
    for pair in history.windows(2) {
        assert!(pair[0].key.row_key < pair[1].key.row_key);
    }

    let authors: Vec<&str> = history.iter().map(|r| r.author.as_str()).collect();
    assert_eq!(authors, vec!["Joe Bloggs", "B", "C", "C"]);
    assert!(history[3].is_deleted());
}

#[tokio::test]
async fn test_untracked_entity_has_no_audit_table() {
    let store = Arc::new(InMemoryTableClient::new());
    let uow = UnitOfWork::begin(store.clone());
    let notes = assert_ok!(uow.repository::<Note>());
    assert!(notes.audit_table_name().is_none());
    assert_ok!(notes.ensure_table_exists().await);

    let note = assert_ok!(notes.insert(Note::new("N1", "R1", "hello")).await);
    assert_eq!(uow.pending(), 1);
    assert_eq!(store.table_names().await, vec!["Note"]);
    assert!(assert_ok!(notes.history("N1", "R1").await).is_empty());

    let updated = assert_ok!(
        notes
            .update(Note {
                text: "changed".to_string(),
                ..note
            })
            .await
    );
    assert_eq!(updated.text, "changed");
    assert_eq!(uow.pending(), 2);
}

#[tokio::test]
async fn test_delete_requires_soft_delete_flag() {
    let uow = UnitOfWork::begin(client());
    let notes = assert_ok!(uow.repository::<Note>());
    assert_ok!(notes.ensure_table_exists().await);

    let note = assert_ok!(notes.insert(Note::new("N1", "R1", "hello")).await);
    let err = assert_err!(notes.delete(note).await);
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(uow.pending(), 1);
}
