//! In-memory target for tests.
//!
//! Understands exactly the statements the synchronizer issues and keeps
//! enough state to answer probes: tables, types, procedures, and the rows
//! inserted per table keyed by column name.

use crate::ddl::Statement;
use crate::decode::SqlValue;
use crate::error::{Result, SyncError};
use crate::target::TargetPool;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

type StoredRow = HashMap<String, SqlValue>;

#[derive(Default)]
struct State {
    tables: HashSet<String>,
    types: HashSet<String>,
    procedures: HashSet<String>,
    rows: HashMap<String, Vec<StoredRow>>,
    statements: Vec<Statement>,
    invocations: usize,
    fail_on: Option<String>,
}

#[derive(Default)]
pub struct MemoryTarget {
    state: Mutex<State>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a table already exists.
    pub fn with_table(self, name: &str) -> Self {
        self.lock().tables.insert(name.to_string());
        self
    }

    /// Reject any statement containing `fragment`.
    pub fn fail_on(self, fragment: &str) -> Self {
        self.lock().fail_on = Some(fragment.to_string());
        self
    }

    /// Every statement seen so far, probes included.
    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    /// Executed statements whose SQL starts with `prefix`.
    pub fn executed(&self, prefix: &str) -> Vec<Statement> {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.sql.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains(name)
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.lock().procedures.contains(name)
    }

    /// Value of `column` in every row inserted into `table`.
    pub fn column_values(&self, table: &str, column: &str) -> Vec<SqlValue> {
        self.lock()
            .rows
            .get(table)
            .map(|rows| rows.iter().filter_map(|r| r.get(column).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn invocations(&self) -> usize {
        self.lock().invocations
    }

    pub fn clear_log(&self) {
        self.lock().statements.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

/// The word following `keyword` in `sql`, up to a space or `(`.
fn name_after<'a>(sql: &'a str, keyword: &str) -> &'a str {
    let rest = sql.split_once(keyword).map(|(_, r)| r).unwrap_or_default();
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .unwrap_or(rest.len());
    rest[..end].trim_start_matches("dbo.")
}

/// Column list of `INSERT INTO t (a, b) VALUES ...` paired with the params.
fn inserted_row(stmt: &Statement) -> StoredRow {
    let columns = stmt
        .sql
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(list, _)| list)
        .unwrap_or_default();
    columns
        .split(',')
        .map(|c| c.trim().to_string())
        .zip(stmt.params.iter().cloned())
        .collect()
}

/// Parameter referenced by a `@Pn` placeholder.
fn param<'a>(stmt: &'a Statement, placeholder: &str) -> Option<&'a SqlValue> {
    let idx: usize = placeholder.trim().trim_start_matches("@P").parse().ok()?;
    stmt.params.get(idx.checked_sub(1)?)
}

/// Apply `UPDATE t SET a = @P1, b = @P2 WHERE k = @P3` to the stored rows.
fn apply_update(rows: &mut [StoredRow], stmt: &Statement) -> u64 {
    let Some((head, predicate)) = stmt.sql.split_once(" WHERE ") else {
        return 0;
    };
    let Some((key_column, key_placeholder)) = predicate.split_once('=') else {
        return 0;
    };
    let key_column = key_column.trim();
    let Some(key) = param(stmt, key_placeholder) else {
        return 0;
    };
    let assignments = head.split_once(" SET ").map(|(_, a)| a).unwrap_or_default();

    let mut affected = 0;
    for row in rows.iter_mut().filter(|r| r.get(key_column) == Some(key)) {
        for assignment in assignments.split(',') {
            if let Some((column, placeholder)) = assignment.split_once('=') {
                if let Some(value) = param(stmt, placeholder) {
                    row.insert(column.trim().to_string(), value.clone());
                }
            }
        }
        affected += 1;
    }
    affected
}

#[async_trait]
impl TargetPool for MemoryTarget {
    async fn exists(&self, stmt: &Statement) -> Result<bool> {
        let mut state = self.lock();
        state.statements.push(stmt.clone());

        if let Some(fragment) = &state.fail_on {
            if stmt.sql.contains(fragment.as_str()) {
                return Err(SyncError::StatementRejected {
                    code: 50000,
                    message: format!("injected failure on {}", fragment),
                });
            }
        }

        let name = match stmt.params.first() {
            Some(crate::decode::SqlValue::String(s)) => s.clone(),
            _ => String::new(),
        };

        if stmt.sql.contains("INFORMATION_SCHEMA.TABLES") {
            Ok(state.tables.contains(&name))
        } else if stmt.sql.contains("INFORMATION_SCHEMA.ROUTINES") {
            Ok(state.procedures.contains(&name))
        } else {
            let table = name_after(&stmt.sql, "FROM");
            let key_column = name_after(&stmt.sql, "WHERE");
            let key = stmt.params.first();
            Ok(state
                .rows
                .get(table)
                .map(|rows| rows.iter().any(|r| r.get(key_column) == key))
                .unwrap_or(false))
        }
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64> {
        let mut state = self.lock();
        state.statements.push(stmt.clone());

        if let Some(fragment) = &state.fail_on {
            if stmt.sql.contains(fragment.as_str()) {
                return Err(SyncError::StatementRejected {
                    code: 50000,
                    message: format!("injected failure on {}", fragment),
                });
            }
        }

        let sql = stmt.sql.as_str();
        if sql.starts_with("CREATE TABLE") {
            let table = name_after(sql, "CREATE TABLE").to_string();
            if !state.tables.insert(table.clone()) {
                return Err(SyncError::Consistency {
                    object: table,
                    message: "There is already an object with this name".into(),
                });
            }
            Ok(0)
        } else if sql.starts_with("IF NOT EXISTS (SELECT * FROM sys.types") {
            let type_name = name_after(sql, "CREATE TYPE").to_string();
            state.types.insert(type_name);
            Ok(0)
        } else if sql.starts_with("CREATE PROCEDURE") {
            let procedure = name_after(sql, "CREATE PROCEDURE").to_string();
            let type_name = name_after(sql, "@tblLog").to_string();
            if !state.types.contains(&type_name) {
                return Err(SyncError::StatementRejected {
                    code: 2715,
                    message: format!("Cannot find data type {}", type_name),
                });
            }
            if !state.procedures.insert(procedure.clone()) {
                return Err(SyncError::Consistency {
                    object: procedure,
                    message: "There is already an object with this name".into(),
                });
            }
            Ok(0)
        } else if sql.starts_with("INSERT INTO") {
            let table = name_after(sql, "INSERT INTO").to_string();
            let row = inserted_row(stmt);
            state.rows.entry(table).or_default().push(row);
            Ok(1)
        } else if sql.starts_with("UPDATE") {
            let table = name_after(sql, "UPDATE").to_string();
            let rows = state.rows.entry(table).or_default();
            Ok(apply_update(rows, stmt))
        } else if sql.starts_with("DECLARE @rows") {
            let procedure = name_after(sql, "EXEC").to_string();
            if !state.procedures.contains(&procedure) {
                return Err(SyncError::StatementRejected {
                    code: 2812,
                    message: format!("Could not find stored procedure '{}'", procedure),
                });
            }
            state.invocations += 1;
            Ok(0)
        } else {
            Ok(0)
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
