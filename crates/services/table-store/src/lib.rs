//! Table Store Library
//!
//! Unit of Work and Repository over a partitioned key/value table store.
//! The store offers no multi-row transactions; a unit of work records a
//! compensating action for every write and replays them on rollback.
//!
//! Audit-tracked entity types get a history copy of every write in
//! `{Table}Audit`, undone along with the write it mirrors.

pub mod compensation;
pub mod config;
pub mod repository;
pub mod store;
pub mod unit_of_work;

pub use compensation::{Compensation, CompensationRecorder, RollbackSummary, UnitOfWorkState};
pub use config::TableStoreConfig;
pub use repository::{audit_partition, EntityRepository, TableRepository};
pub use store::{
    connect, ConnectionString, ContinuationToken, IfMatch, InMemoryTableClient, QuerySegment,
    StoredEntity, TableClient,
};
pub use unit_of_work::UnitOfWork;

#[cfg(any(test, feature = "test-utils"))]
pub use store::MockTableClient;
