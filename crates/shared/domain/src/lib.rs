//! Domain layer - Table entities and value objects.
//!
//! This crate contains pure entity logic with no store dependencies.
//! The entity model here is shared by the table store and the demo binary.

pub mod book;
pub mod constants;
pub mod entity;
pub mod error;

pub use book::Book;
pub use constants::*;
pub use entity::{BaseFields, EntityKey, TableEntity};
pub use error::{DomainError, DomainResult};
