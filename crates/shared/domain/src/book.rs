//! Book entity, the audit-tracked sample record type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{BaseFields, EntityKey, TableEntity};

/// Book stored under its publisher (partition) and id (row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    #[serde(flatten)]
    pub key: EntityKey,
    #[serde(skip)]
    pub etag: Option<String>,
    #[serde(flatten)]
    pub base: BaseFields,
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub publisher: String,
}

impl Book {
    /// Create a new book keyed by publisher and id
    pub fn new(id: Uuid, publisher: impl Into<String>) -> Self {
        let publisher = publisher.into();
        Self {
            key: EntityKey::new(publisher.clone(), id.to_string()),
            etag: None,
            base: BaseFields::default(),
            id,
            title: String::new(),
            author: String::new(),
            publisher,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

impl TableEntity for Book {
    const TABLE_NAME: &'static str = "Book";
    const AUDIT_TRACKED: bool = true;

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

    fn base(&self) -> Option<&BaseFields> {
        Some(&self.base)
    }

    fn base_mut(&mut self) -> Option<&mut BaseFields> {
        Some(&mut self.base)
    }
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} by {} ({}/{}){}",
            self.title,
            self.author,
            self.key.partition_key,
            self.key.row_key,
            if self.base.is_deleted { " [deleted]" } else { "" }
        )
    }
}
