//! Probe and row statements.

use super::{validate_identifier, BULK_PARAMETER};
use crate::decode::{Row, SqlNullType, SqlValue};
use crate::error::{Result, SyncError};
use crate::schema::SyncTarget;
use std::fmt;

/// Row constructors allowed in a single `INSERT ... VALUES`.
pub const MAX_VALUES_ROWS: usize = 1000;

/// A statement plus its positional parameters (`@P1`, `@P2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Probe for a user table by name.
pub fn table_exists_probe(table: &str) -> Statement {
    Statement::with_params(
        "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @P1",
        vec![SqlValue::String(table.to_string())],
    )
}

/// Probe for a stored procedure by name.
pub fn procedure_exists_probe(procedure: &str) -> Statement {
    Statement::with_params(
        "SELECT 1 FROM INFORMATION_SCHEMA.ROUTINES WHERE ROUTINE_NAME = @P1",
        vec![SqlValue::String(procedure.to_string())],
    )
}

/// Probe for a row by primary key value.
pub fn row_exists_probe(target: &SyncTarget, key_column: &str, key: &SqlValue) -> Result<Statement> {
    validate_identifier(key_column)?;
    Ok(Statement::with_params(
        format!(
            "SELECT 1 FROM {} WHERE {} = @P1",
            target.physical_name(),
            key_column
        ),
        vec![key.clone()],
    ))
}

/// INSERT of every value in `row`.
pub fn insert_row(target: &SyncTarget, row: &Row) -> Result<Statement> {
    let mut columns = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());

    for (idx, (column, value)) in row.iter().enumerate() {
        validate_identifier(column)?;
        columns.push(column);
        placeholders.push(format!("@P{}", idx + 1));
        params.push(value.clone());
    }

    if columns.is_empty() {
        return Err(SyncError::EmptySchema(target.table.clone()));
    }

    Ok(Statement::with_params(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target.physical_name(),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params,
    ))
}

/// UPDATE of every non-key value in `row`, matched on `key_column`.
///
/// Returns `None` when the row has nothing besides the key to update.
pub fn update_row(target: &SyncTarget, row: &Row, key_column: &str) -> Result<Option<Statement>> {
    validate_identifier(key_column)?;

    let key = row
        .get(key_column)
        .cloned()
        .unwrap_or(SqlValue::Null(SqlNullType::String));

    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (column, value) in row.iter().filter(|(c, _)| *c != key_column) {
        validate_identifier(column)?;
        params.push(value.clone());
        assignments.push(format!("{} = @P{}", column, params.len()));
    }

    if assignments.is_empty() {
        return Ok(None);
    }

    params.push(key);
    Ok(Some(Statement::with_params(
        format!(
            "UPDATE {} SET {} WHERE {} = @P{}",
            target.physical_name(),
            assignments.join(", "),
            key_column,
            params.len()
        ),
        params,
    )))
}

/// One batch that loads `rows` into a table variable of the bulk type and
/// hands it to the bulk procedure.
///
/// Only model columns are sent; values are rendered as literals because the
/// table-valued parameter is filled server-side.
pub fn bulk_invocation(target: &SyncTarget, rows: &[Row]) -> Result<Statement> {
    let columns = target.model.column_names();
    if columns.is_empty() {
        return Err(SyncError::EmptySchema(target.table.clone()));
    }
    for column in &columns {
        validate_identifier(column)?;
    }

    let mut sql = format!("DECLARE @rows dbo.{};\n", target.table_type_name());

    for chunk in rows.chunks(MAX_VALUES_ROWS) {
        let tuples: Vec<String> = chunk
            .iter()
            .map(|row| {
                let values: Vec<String> = columns
                    .iter()
                    .map(|c| match row.get(c) {
                        Some(v) => v.to_mssql_literal(),
                        None => "NULL".to_string(),
                    })
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();

        sql.push_str(&format!(
            "INSERT INTO @rows ({}) VALUES\n{};\n",
            columns.join(", "),
            tuples.join(",\n")
        ));
    }

    sql.push_str(&format!(
        "EXEC {} {} = @rows;",
        target.procedure_name(),
        BULK_PARAMETER
    ));

    Ok(Statement::raw(sql))
}
