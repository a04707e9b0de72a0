//! Type mapping from schema-document type names to SQL Server column types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type declared in a schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Integer,
    Text,
    Date,
    Char,
    /// Unrecognized `DATA_TYPE`. Stored as text, rejected when decoding data.
    Unknown,
}

impl LogicalType {
    /// Human-readable name used in coercion errors.
    pub fn describe(&self) -> &'static str {
        match self {
            LogicalType::Integer => "integer",
            LogicalType::Text => "text",
            LogicalType::Date => "date",
            LogicalType::Char => "single character",
            LogicalType::Unknown => "unknown type",
        }
    }
}

/// Concrete SQL Server column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Int,
    VarcharMax,
    Date,
    Char1,
    DateTime,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageType::Int => "INT",
            StorageType::VarcharMax => "VARCHAR(MAX)",
            StorageType::Date => "DATE",
            StorageType::Char1 => "CHAR(1)",
            StorageType::DateTime => "DATETIME",
        };
        f.write_str(s)
    }
}

/// Map a `DATA_TYPE` value to its logical type.
pub fn map_logical_type(name: &str) -> LogicalType {
    match name.trim().to_lowercase().as_str() {
        "int" => LogicalType::Integer,
        "varchar" | "nvarchar" => LogicalType::Text,
        "date" => LogicalType::Date,
        "char" => LogicalType::Char,
        _ => LogicalType::Unknown,
    }
}

/// Map a logical type to the column type emitted in DDL.
///
/// Key columns are always integers in this domain, so an integer key is
/// pinned to `INT` before the general mapping applies.
pub fn map_storage_type(logical: LogicalType, is_key: bool) -> StorageType {
    if is_key && logical == LogicalType::Integer {
        return StorageType::Int;
    }

    match logical {
        LogicalType::Integer => StorageType::Int,
        LogicalType::Text => StorageType::VarcharMax,
        LogicalType::Date => StorageType::Date,
        LogicalType::Char => StorageType::Char1,
        LogicalType::Unknown => StorageType::VarcharMax,
    }
}
