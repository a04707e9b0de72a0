//! T-SQL generation from a column model.
//!
//! DDL is assembled as an ordered list of typed clauses and rendered to text
//! only when handed to the database. Object names follow fixed conventions
//! (`PK_`, `FK_`, `fullSync_`, `CustomTableType_`, `_clone`) so that a later
//! run recognizes the objects an earlier run created.

mod dml;

pub use dml::*;

use crate::decode::TIMESTAMP_COLUMN;
use crate::error::{Result, SyncError};
use crate::schema::SyncTarget;
use crate::typemap::StorageType;
use std::collections::HashSet;
use std::fmt;

/// SQL Server's identifier length limit.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Name of the table-valued parameter of the bulk procedure.
pub const BULK_PARAMETER: &str = "@tblLog";

/// Validate an identifier that is emitted unquoted.
///
/// Accepts SQL Server regular identifiers: a letter or underscore followed
/// by letters, digits, `_`, `@`, `#` or `$`, at most 128 characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$'));

    if !first_ok || !rest_ok {
        return Err(SyncError::malformed(
            "identifier",
            format!("invalid SQL identifier: {:?}", name),
        ));
    }
    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::malformed(
            "identifier",
            format!(
                "identifier exceeds {} characters: {:?}",
                MAX_IDENTIFIER_LENGTH, name
            ),
        ));
    }
    Ok(())
}

/// Validate every name that ends up in generated SQL for `target`.
///
/// Column names must be unique ignoring case, and none may take the
/// generated `TimestampColumn`.
pub fn validate_target(target: &SyncTarget) -> Result<()> {
    validate_identifier(&target.physical_name())?;
    validate_identifier(&target.procedure_name())?;
    validate_identifier(&target.table_type_name())?;

    let mut seen = HashSet::new();
    for column in target.model.columns() {
        validate_identifier(&column.name)?;
        if column.name.eq_ignore_ascii_case(TIMESTAMP_COLUMN) {
            return Err(SyncError::malformed(
                target.table.as_str(),
                format!("column name {} is reserved", column.name),
            ));
        }
        if !seen.insert(column.name.to_lowercase()) {
            return Err(SyncError::malformed(
                target.table.as_str(),
                format!("duplicate column {}", column.name),
            ));
        }
        if let Some(fk) = &column.foreign_key {
            validate_identifier(&fk.table)?;
            validate_identifier(&fk.column)?;
        }
    }
    Ok(())
}

/// One element of a CREATE TABLE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableClause {
    Column {
        name: String,
        storage: StorageType,
    },
    PrimaryKey {
        constraint: String,
        column: String,
    },
    ForeignKey {
        constraint: String,
        column: String,
        ref_table: String,
        ref_column: String,
    },
}

impl fmt::Display for TableClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableClause::Column { name, storage } => write!(f, "{} {}", name, storage),
            TableClause::PrimaryKey { constraint, column } => {
                write!(f, "CONSTRAINT {} PRIMARY KEY ({})", constraint, column)
            }
            TableClause::ForeignKey {
                constraint,
                column,
                ref_table,
                ref_column,
            } => write!(
                f,
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
                constraint, column, ref_table, ref_column
            ),
        }
    }
}

/// A CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: String,
    pub clauses: Vec<TableClause>,
}

impl CreateTable {
    /// Column definitions, in order.
    pub fn columns(&self) -> impl Iterator<Item = &TableClause> {
        self.clauses
            .iter()
            .filter(|c| matches!(c, TableClause::Column { .. }))
    }

    /// Constraint clauses, in order.
    pub fn constraints(&self) -> impl Iterator<Item = &TableClause> {
        self.clauses
            .iter()
            .filter(|c| !matches!(c, TableClause::Column { .. }))
    }
}

impl fmt::Display for CreateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body: Vec<String> = self
            .columns()
            .chain(self.constraints())
            .map(|c| c.to_string())
            .collect();
        write!(f, "CREATE TABLE {} ({});", self.table, body.join(", "))
    }
}

/// Build the CREATE TABLE for `target`.
///
/// Columns keep model order and are followed by the `TimestampColumn`; the
/// primary key constraint and one constraint per foreign key come after all
/// columns. A column that is both primary and foreign key gets only the
/// primary key constraint. Constraint names use the logical table name.
pub fn generate_create_table(target: &SyncTarget) -> Result<CreateTable> {
    validate_target(target)?;

    let mut columns = Vec::with_capacity(target.model.len() + 1);
    let mut constraints = Vec::new();

    for column in target.model.columns() {
        columns.push(TableClause::Column {
            name: column.name.clone(),
            storage: column.storage_type(),
        });

        if column.primary_key {
            constraints.push(TableClause::PrimaryKey {
                constraint: format!("PK_{}_{}", target.table, column.name),
                column: column.name.clone(),
            });
        } else if let Some(fk) = &column.foreign_key {
            constraints.push(TableClause::ForeignKey {
                constraint: format!("FK_{}_{}", target.table, column.name),
                column: column.name.clone(),
                ref_table: fk.table.clone(),
                ref_column: fk.column.clone(),
            });
        }
    }

    columns.push(TableClause::Column {
        name: TIMESTAMP_COLUMN.to_string(),
        storage: StorageType::DateTime,
    });
    columns.extend(constraints);

    Ok(CreateTable {
        table: target.physical_name(),
        clauses: columns,
    })
}

/// Build the guarded CREATE TYPE for the bulk procedure's parameter.
///
/// The `IF NOT EXISTS` guard against `sys.types` makes the statement safe to
/// issue repeatedly.
pub fn generate_table_type(target: &SyncTarget) -> Result<String> {
    validate_target(target)?;

    let type_name = target.table_type_name();
    let columns: Vec<String> = target
        .model
        .columns()
        .iter()
        .map(|c| format!("{} {}", c.name, c.storage_type()))
        .collect();

    Ok(format!(
        "IF NOT EXISTS (SELECT * FROM sys.types WHERE name = '{type_name}')\n\
         BEGIN\n    CREATE TYPE dbo.{type_name} AS TABLE (\n{}\n);\nEND\n",
        columns.join(", ")
    ))
}

/// Build the bulk procedure that copies a table-valued parameter into the
/// target table.
///
/// The procedure only inserts: rows missing from the input are never
/// deleted, so callers pass the complete row set each time.
pub fn generate_upsert_procedure(target: &SyncTarget) -> Result<String> {
    validate_target(target)?;

    let columns = target.model.column_names().join(", ");
    Ok(format!(
        "CREATE PROCEDURE {procedure}\n    {param} dbo.{type_name} READONLY\nAS\nBEGIN\n    SET NOCOUNT ON;\n\n    INSERT INTO dbo.[{table}] ({columns})\n    SELECT {columns} FROM {param};\nEND",
        procedure = target.procedure_name(),
        param = BULK_PARAMETER,
        type_name = target.table_type_name(),
        table = target.physical_name(),
        columns = columns,
    ))
}
