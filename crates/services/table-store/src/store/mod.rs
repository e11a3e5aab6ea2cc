//! Store layer: client contract, emulator and connection handling.

mod client;
mod connection;
mod memory;

pub use client::{ContinuationToken, IfMatch, QuerySegment, StoredEntity, TableClient};
pub use connection::{connect, ConnectionString};
pub use memory::InMemoryTableClient;

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockTableClient;
