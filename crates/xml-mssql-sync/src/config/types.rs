//! Configuration type definitions.

use crate::decode::CoercionPolicy;
use crate::schema::TableNaming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database (SQL Server) configuration.
    pub database: DatabaseConfig,

    /// Synchronization behavior configuration.
    pub sync: SyncConfig,
}

/// Target database (SQL Server) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// ADO.NET connection string. Overrides the discrete fields when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Per round trip timeout in seconds (default: 30).
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Retries for transient failures (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds (default: 200).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_connections", &self.max_connections)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

/// How rows reach the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Probe, then UPDATE or INSERT each row.
    #[default]
    Row,

    /// Hand the full row set to a stored procedure in one call.
    Bulk,
}

impl SyncStrategy {
    /// Physical naming convention used by this strategy.
    pub fn naming(&self) -> TableNaming {
        match self {
            SyncStrategy::Row => TableNaming::Bare,
            SyncStrategy::Bulk => TableNaming::Clone,
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStrategy::Row => write!(f, "row"),
            SyncStrategy::Bulk => write!(f, "bulk"),
        }
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "row" => Ok(SyncStrategy::Row),
            "bulk" => Ok(SyncStrategy::Bulk),
            other => Err(format!("unknown strategy '{}', expected row or bulk", other)),
        }
    }
}

/// Synchronization behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Strategy (default: row).
    #[serde(default)]
    pub strategy: SyncStrategy,

    /// Directory searched for `<table>_tableType.xml` and `<table>_data.xml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Tables in processing order.
    #[serde(default)]
    pub tables: Vec<TableEntry>,

    /// Coercion failure handling (default: abort_table).
    #[serde(default)]
    pub on_coercion_error: CoercionPolicy,

    /// Write `TimestampColumn` on every row-strategy INSERT/UPDATE.
    #[serde(default)]
    pub stamp_rows: bool,
}

/// A configured table: a bare name, or a name with explicit document paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableEntry {
    Name(String),
    Files {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_file: Option<PathBuf>,
    },
}

impl TableEntry {
    pub fn name(&self) -> &str {
        match self {
            TableEntry::Name(name) => name,
            TableEntry::Files { name, .. } => name,
        }
    }

    fn schema_file(&self) -> Option<&PathBuf> {
        match self {
            TableEntry::Name(_) => None,
            TableEntry::Files { schema_file, .. } => schema_file.as_ref(),
        }
    }

    fn data_file(&self) -> Option<&PathBuf> {
        match self {
            TableEntry::Name(_) => None,
            TableEntry::Files { data_file, .. } => data_file.as_ref(),
        }
    }
}

/// Resolved document locations of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDocuments {
    pub table: String,
    pub schema_path: PathBuf,
    pub data_path: PathBuf,
}

impl SyncConfig {
    /// Resolve the schema and data document paths of `entry`.
    ///
    /// Explicit paths win; otherwise `<data_dir>/<table>_tableType.xml` and
    /// `<data_dir>/<table>_data.xml`. `None` when a path cannot be resolved.
    pub fn documents_for(&self, entry: &TableEntry) -> Option<TableDocuments> {
        let name = entry.name();
        let discovered = |suffix: &str| {
            self.data_dir
                .as_ref()
                .map(|dir| dir.join(format!("{}_{}.xml", name, suffix)))
        };

        let schema_path = entry
            .schema_file()
            .cloned()
            .or_else(|| discovered("tableType"))?;
        let data_path = entry.data_file().cloned().or_else(|| discovered("data"))?;

        Some(TableDocuments {
            table: name.to_string(),
            schema_path,
            data_path,
        })
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}
