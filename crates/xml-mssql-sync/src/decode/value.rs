//! Typed row values.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Reserved column carrying the modification timestamp.
pub const TIMESTAMP_COLUMN: &str = "TimestampColumn";

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlValue {
    Null(SqlNullType),
    Int(i32),
    String(String),
    Char(char),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Type hint for NULL values so parameters bind with the right TDS type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SqlNullType {
    Int,
    String,
    Char,
    Date,
    DateTime,
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Render as a T-SQL literal.
    ///
    /// Strings are emitted as `N'...'` with single quotes doubled. Dates use
    /// the unambiguous `YYYYMMDD` / ISO 8601 forms.
    pub fn to_mssql_literal(&self) -> String {
        match self {
            SqlValue::Null(_) => "NULL".to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::String(s) => format!("N'{}'", s.replace('\'', "''")),
            SqlValue::Char(c) => {
                if *c == '\'' {
                    "N''''".to_string()
                } else {
                    format!("N'{}'", c)
                }
            }
            SqlValue::Date(d) => format!("'{}'", d.format("%Y%m%d")),
            SqlValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
        }
    }
}

/// One decoded record: column name to value, in column model order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    values: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a value. Later entries with the same name replace earlier ones.
    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        let column = column.into();
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in row order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// (name, value) pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
