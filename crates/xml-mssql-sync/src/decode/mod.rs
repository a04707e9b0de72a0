//! Data document decoding into typed rows.

mod value;

pub use value::*;

use crate::error::{Result, SyncError};
use crate::schema::{ColumnDescriptor, ColumnModel};
use crate::typemap::LogicalType;
use crate::xml::XmlDocument;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do when a value cannot be converted to its column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionPolicy {
    /// Fail the whole table before any row is written.
    #[default]
    AbortTable,
    /// Drop the offending row and keep going.
    SkipRow,
}

/// Options for [`decode_rows`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Table name, used in error messages.
    pub table: String,

    /// Coercion failure handling.
    pub policy: CoercionPolicy,

    /// When set, every row gets a `TimestampColumn` entry with this value.
    pub stamp: Option<NaiveDateTime>,
}

/// Rows decoded from a data document.
#[derive(Debug, Clone, Default)]
pub struct DecodedRows {
    pub rows: Vec<Row>,

    /// Rows dropped under [`CoercionPolicy::SkipRow`].
    pub skipped: usize,
}

/// Decode every record under the document root against `model`.
///
/// Each row holds exactly one entry per model column, in model order; a
/// missing field reads as empty text.
pub fn decode_rows(
    doc: &XmlDocument,
    model: &ColumnModel,
    options: &DecodeOptions,
) -> Result<DecodedRows> {
    let mut decoded = DecodedRows {
        rows: Vec::with_capacity(doc.records().len()),
        skipped: 0,
    };

    for (idx, record) in doc.records().iter().enumerate() {
        let row_number = idx + 1;
        let mut row = Row::with_capacity(model.len() + 1);
        let mut failure = None;

        for column in model.columns() {
            let raw = record.child_text(&column.name);
            match coerce(column, &raw) {
                Some(value) => row.push(column.name.clone(), value),
                None => {
                    failure = Some(SyncError::Coercion {
                        table: options.table.clone(),
                        row: row_number,
                        column: column.name.clone(),
                        value: raw,
                        expected: column.logical_type.describe().to_string(),
                    });
                    break;
                }
            }
        }

        if let Some(err) = failure {
            match options.policy {
                CoercionPolicy::AbortTable => return Err(err),
                CoercionPolicy::SkipRow => {
                    warn!("Skipping row: {}", err);
                    decoded.skipped += 1;
                    continue;
                }
            }
        }

        if let Some(stamp) = options.stamp {
            row.push(TIMESTAMP_COLUMN, SqlValue::DateTime(stamp));
        }

        decoded.rows.push(row);
    }

    debug!(
        "Decoded {} rows from {} ({} skipped)",
        decoded.rows.len(),
        doc.origin(),
        decoded.skipped
    );

    Ok(decoded)
}

/// Convert raw text to the column's type. `None` means the text does not fit.
pub fn coerce(column: &ColumnDescriptor, raw: &str) -> Option<SqlValue> {
    let trimmed = raw.trim();

    if column.logical_type == LogicalType::Text {
        return Some(SqlValue::String(raw.to_string()));
    }

    if trimmed.is_empty() {
        return if column.accepts_null() {
            null_for(column.logical_type)
        } else {
            None
        };
    }

    match column.logical_type {
        LogicalType::Integer => trimmed.parse::<i32>().ok().map(SqlValue::Int),
        LogicalType::Char => {
            let mut chars = trimmed.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(SqlValue::Char(c)),
                _ => None,
            }
        }
        LogicalType::Date => parse_date(trimmed).map(SqlValue::Date),
        LogicalType::Text | LogicalType::Unknown => None,
    }
}

fn null_for(logical: LogicalType) -> Option<SqlValue> {
    let hint = match logical {
        LogicalType::Integer => SqlNullType::Int,
        LogicalType::Text | LogicalType::Unknown => SqlNullType::String,
        LogicalType::Char => SqlNullType::Char,
        LogicalType::Date => SqlNullType::Date,
    };
    Some(SqlValue::Null(hint))
}

/// Accepts `YYYY-MM-DD`, ISO 8601 date-times with or without an offset, and
/// `MM/DD/YYYY`. Only the date part is kept.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%m/%d/%Y").ok()
}
