//! Repository layer for table entities.

mod audit;
mod table_repository;

pub use audit::audit_partition;
pub use table_repository::{EntityRepository, TableRepository};
