//! # xml-mssql-sync
//!
//! Synchronize XML table documents into SQL Server.
//!
//! Each table is described by two documents: a schema document listing its
//! columns and a data document holding its rows. This library provides:
//!
//! - **Schema inference** from the schema document into a column model
//! - **DDL generation** for the table, its key constraints, and bulk objects
//! - **Typed row decoding** with configurable handling of bad values
//! - **Row synchronization** (probe, then UPDATE or INSERT per row)
//! - **Bulk synchronization** through a generated stored procedure
//!
//! ## Example
//!
//! ```rust,no_run
//! use xml_mssql_sync::{Config, Orchestrator, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> xml_mssql_sync::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(&RunOptions::default()).await?;
//!     println!("Inserted {} rows", result.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ddl;
pub mod decode;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod sync;
pub mod target;
pub mod typemap;
pub mod xml;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, SyncConfig, SyncStrategy, TableEntry};
pub use ddl::{CreateTable, Statement};
pub use decode::{CoercionPolicy, Row, SqlValue};
pub use error::{ErrorKind, Result, SyncError};
pub use orchestrator::{plan, HealthCheckResult, Orchestrator, RunOptions, SyncPlan, SyncResult};
pub use schema::{ColumnDescriptor, ColumnModel, SyncTarget, TableNaming};
pub use sync::{SyncPhase, Synchronizer, TableOutcome};
pub use target::{MssqlTargetPool, TargetPool};
pub use typemap::{LogicalType, StorageType};
