//! Target database operations.

#[cfg(test)]
pub(crate) mod memory;
mod mssql;

pub use mssql::MssqlTargetPool;

use crate::ddl::Statement;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for target database operations.
///
/// Every call is one unit of work: a connection is checked out for its
/// duration and returned when it completes, whether it succeeded or not.
#[async_trait]
pub trait TargetPool: Send + Sync {
    /// Run a probe. True when it returns at least one row.
    async fn exists(&self, stmt: &Statement) -> Result<bool>;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, stmt: &Statement) -> Result<u64>;

    /// Check that the database is reachable.
    async fn ping(&self) -> Result<()>;

    /// Get the database type name.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}
