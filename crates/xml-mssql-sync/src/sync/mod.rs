//! Per-table synchronization.
//!
//! A table moves through `LoadSchema → CheckTable → [CreateTable] →
//! LoadData → {RowPath | BulkPath} → Done`. Any error ends it in `Failed`,
//! remembering the phase it failed in. Every database interaction is awaited
//! before the next one starts.

use crate::config::{SyncStrategy, TableDocuments};
use crate::ddl::{
    bulk_invocation, generate_create_table, generate_table_type, generate_upsert_procedure,
    insert_row, procedure_exists_probe, row_exists_probe, table_exists_probe, update_row,
    validate_target, Statement,
};
use crate::decode::{decode_rows, CoercionPolicy, DecodeOptions, Row, SqlNullType, SqlValue};
use crate::error::{ErrorKind, Result, SyncError};
use crate::schema::{ColumnModel, SyncTarget};
use crate::target::TargetPool;
use crate::xml::XmlDocument;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Synchronizer phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    LoadSchema,
    CheckTable,
    CreateTable,
    LoadData,
    RowPath,
    BulkPath,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::LoadSchema => "load_schema",
            SyncPhase::CheckTable => "check_table",
            SyncPhase::CreateTable => "create_table",
            SyncPhase::LoadData => "load_data",
            SyncPhase::RowPath => "row_path",
            SyncPhase::BulkPath => "bulk_path",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    /// Configured table name.
    pub table: String,

    /// Name of the table in the database.
    pub physical_name: String,

    pub strategy: SyncStrategy,

    /// `Done` or `Failed`.
    pub phase: SyncPhase,

    /// Phase the table was in when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<SyncPhase>,

    pub table_created: bool,
    pub procedure_created: bool,

    pub rows_decoded: usize,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_skipped: usize,

    /// Rows were inserted without matching because the table has no key.
    pub insert_only: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    pub duration_ms: u64,
}

impl TableOutcome {
    fn new(table: &str, strategy: SyncStrategy) -> Self {
        Self {
            table: table.to_string(),
            physical_name: strategy.naming().physical_name(table),
            strategy,
            phase: SyncPhase::LoadSchema,
            failed_in: None,
            table_created: false,
            procedure_created: false,
            rows_decoded: 0,
            rows_inserted: 0,
            rows_updated: 0,
            rows_skipped: 0,
            insert_only: false,
            error: None,
            error_kind: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.phase == SyncPhase::Done
    }

    fn fail(&mut self, err: &SyncError) {
        self.failed_in = Some(self.phase);
        self.phase = SyncPhase::Failed;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}

/// Synchronizer options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub strategy: SyncStrategy,
    pub on_coercion_error: CoercionPolicy,

    /// Stamp `TimestampColumn` on row-strategy writes.
    pub stamp_rows: bool,
}

/// Synchronizes tables into a target database with one strategy.
pub struct Synchronizer<'a> {
    target: &'a dyn TargetPool,
    options: SyncOptions,
}

impl<'a> Synchronizer<'a> {
    pub fn new(target: &'a dyn TargetPool, options: SyncOptions) -> Self {
        Self { target, options }
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.options.strategy
    }

    /// Synchronize one table. Failures are recorded in the outcome.
    pub async fn sync_table(&self, docs: &TableDocuments) -> TableOutcome {
        let start = Instant::now();
        let mut outcome = TableOutcome::new(&docs.table, self.options.strategy);

        match self.run_phases(docs, &mut outcome).await {
            Ok(()) => {
                outcome.phase = SyncPhase::Done;
                info!(
                    "{}: {} decoded, {} inserted, {} updated, {} skipped",
                    outcome.physical_name,
                    outcome.rows_decoded,
                    outcome.rows_inserted,
                    outcome.rows_updated,
                    outcome.rows_skipped
                );
            }
            Err(e) => {
                error!("{}: failed during {}: {}", docs.table, outcome.phase, e);
                outcome.fail(&e);
            }
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    async fn run_phases(&self, docs: &TableDocuments, outcome: &mut TableOutcome) -> Result<()> {
        outcome.phase = SyncPhase::LoadSchema;
        let model = ColumnModel::load(&docs.schema_path)?;
        if model.is_empty() {
            return Err(SyncError::EmptySchema(docs.table.clone()));
        }
        let target = SyncTarget::new(&docs.table, model, self.options.strategy.naming());
        validate_target(&target)?;

        outcome.phase = SyncPhase::CheckTable;
        let physical = target.physical_name();
        if !self.target.exists(&table_exists_probe(&physical)).await? {
            outcome.phase = SyncPhase::CreateTable;
            let ddl = generate_create_table(&target)?;
            debug!("{}", ddl);
            self.target.execute(&Statement::raw(ddl.to_string())).await?;
            outcome.table_created = true;
            info!("Created table {}", physical);
        }

        outcome.phase = SyncPhase::LoadData;
        let data = XmlDocument::load(&docs.data_path)?;
        let stamp = match self.options.strategy {
            SyncStrategy::Row if self.options.stamp_rows => {
                Some(chrono::Local::now().naive_local())
            }
            _ => None,
        };
        let decoded = decode_rows(
            &data,
            &target.model,
            &DecodeOptions {
                table: docs.table.clone(),
                policy: self.options.on_coercion_error,
                stamp,
            },
        )?;
        outcome.rows_decoded = decoded.rows.len();
        outcome.rows_skipped = decoded.skipped;

        match self.options.strategy {
            SyncStrategy::Row => self.row_path(&target, &decoded.rows, outcome).await,
            SyncStrategy::Bulk => self.bulk_path(&target, &decoded.rows, outcome).await,
        }
    }

    /// Per-row probe, then UPDATE or INSERT.
    async fn row_path(
        &self,
        target: &SyncTarget,
        rows: &[Row],
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        outcome.phase = SyncPhase::RowPath;

        let key = target.primary_key();
        if key.is_none() {
            warn!(
                "{}: no primary key column, inserting every row without matching",
                target.table
            );
            outcome.insert_only = true;
        }

        for (idx, row) in rows.iter().enumerate() {
            let Some(key) = key else {
                self.target.execute(&insert_row(target, row)?).await?;
                outcome.rows_inserted += 1;
                continue;
            };

            let value = row
                .get(key)
                .cloned()
                .unwrap_or(SqlValue::Null(SqlNullType::String));
            if value.is_null() {
                return Err(SyncError::Coercion {
                    table: target.table.clone(),
                    row: idx + 1,
                    column: key.to_string(),
                    value: String::new(),
                    expected: "a non-null key".to_string(),
                });
            }

            if self
                .target
                .exists(&row_exists_probe(target, key, &value)?)
                .await?
            {
                if let Some(stmt) = update_row(target, row, key)? {
                    self.target.execute(&stmt).await?;
                }
                outcome.rows_updated += 1;
            } else {
                self.target.execute(&insert_row(target, row)?).await?;
                outcome.rows_inserted += 1;
            }
        }

        Ok(())
    }

    /// Create the bulk type and procedure when missing, then invoke once.
    async fn bulk_path(
        &self,
        target: &SyncTarget,
        rows: &[Row],
        outcome: &mut TableOutcome,
    ) -> Result<()> {
        outcome.phase = SyncPhase::BulkPath;

        let procedure = target.procedure_name();
        if !self
            .target
            .exists(&procedure_exists_probe(&procedure))
            .await?
        {
            let table_type = generate_table_type(target)?;
            debug!("{}", table_type);
            self.target.execute(&Statement::raw(table_type)).await?;

            let create_procedure = generate_upsert_procedure(target)?;
            debug!("{}", create_procedure);
            self.target
                .execute(&Statement::raw(create_procedure))
                .await?;
            outcome.procedure_created = true;
            info!("Created procedure {}", procedure);
        }

        self.target.execute(&bulk_invocation(target, rows)?).await?;
        outcome.rows_inserted = rows.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SqlValue;
    use crate::target::memory::MemoryTarget;
    use std::path::Path;
    use tempfile::TempDir;

    const STUDENTS_SCHEMA: &str = r#"<?xml version="1.0" standalone="yes"?>
<DocumentElement>
  <Students>
    <COLUMN_NAME>StudentID</COLUMN_NAME>
    <DATA_TYPE>int</DATA_TYPE>
    <IS_NULLABLE>NO</IS_NULLABLE>
    <IS_PRIMARY_KEY>true</IS_PRIMARY_KEY>
  </Students>
  <Students>
    <COLUMN_NAME>Name</COLUMN_NAME>
    <DATA_TYPE>varchar</DATA_TYPE>
    <IS_NULLABLE>NO</IS_NULLABLE>
  </Students>
</DocumentElement>"#;

    fn students_data(name: &str) -> String {
        format!(
            "<DocumentElement><Students><StudentID>1</StudentID><Name>{}</Name></Students></DocumentElement>",
            name
        )
    }

    fn write_docs(dir: &Path, table: &str, schema: &str, data: &str) -> TableDocuments {
        let schema_path = dir.join(format!("{}_tableType.xml", table));
        let data_path = dir.join(format!("{}_data.xml", table));
        std::fs::write(&schema_path, schema).unwrap();
        std::fs::write(&data_path, data).unwrap();
        TableDocuments {
            table: table.to_string(),
            schema_path,
            data_path,
        }
    }

    fn options(strategy: SyncStrategy) -> SyncOptions {
        SyncOptions {
            strategy,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_students_row_strategy_end_to_end() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));

        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));
        let first = sync.sync_table(&docs).await;
        assert!(first.is_success(), "{:?}", first.error);
        assert!(first.table_created);
        assert_eq!(first.rows_inserted, 1);

        let creates = target.executed("CREATE TABLE");
        assert_eq!(creates.len(), 1);
        assert_eq!(
            creates[0].sql,
            "CREATE TABLE Students (StudentID INT, Name VARCHAR(MAX), TimestampColumn DATETIME, \
             CONSTRAINT PK_Students_StudentID PRIMARY KEY (StudentID));"
        );
        let inserts = target.executed("INSERT INTO Students");
        assert_eq!(inserts.len(), 1);
        assert_eq!(
            inserts[0].params,
            vec![SqlValue::Int(1), SqlValue::String("Ann".into())]
        );

        target.clear_log();
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Bob"));
        let second = sync.sync_table(&docs).await;
        assert!(second.is_success());
        assert!(!second.table_created);
        assert_eq!(second.rows_updated, 1);
        assert_eq!(second.rows_inserted, 0);

        assert!(target.executed("CREATE").is_empty());
        assert!(target.executed("INSERT").is_empty());
        let updates = target.executed("UPDATE");
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].sql,
            "UPDATE Students SET Name = @P1 WHERE StudentID = @P2"
        );
        assert_eq!(
            updates[0].params,
            vec![SqlValue::String("Bob".into()), SqlValue::Int(1)]
        );
    }

    #[tokio::test]
    async fn test_insert_update_branching() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));

        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));
        sync.sync_table(&docs).await;

        let data = "<r><s><StudentID>1</StudentID><Name>Ann</Name></s>\
                    <s><StudentID>2</StudentID><Name>Cy</Name></s></r>";
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, data);
        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.rows_updated, 1);
        assert_eq!(outcome.rows_inserted, 1);
    }

    #[tokio::test]
    async fn test_key_after_other_columns() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let schema = "<r>\
            <c><COLUMN_NAME>Title</COLUMN_NAME><DATA_TYPE>varchar</DATA_TYPE></c>\
            <c><COLUMN_NAME>CourseID</COLUMN_NAME><DATA_TYPE>int</DATA_TYPE>\
              <IS_PRIMARY_KEY>true</IS_PRIMARY_KEY></c>\
            </r>";

        let data = "<r><c><Title>Math</Title><CourseID>10</CourseID></c>\
                    <c><Title>Math</Title><CourseID>11</CourseID></c></r>";
        let docs = write_docs(dir.path(), "Courses", schema, data);
        let first = sync.sync_table(&docs).await;
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(first.rows_inserted, 2);

        let data = "<r><c><Title>Algebra</Title><CourseID>11</CourseID></c>\
                    <c><Title>Math</Title><CourseID>12</CourseID></c></r>";
        let docs = write_docs(dir.path(), "Courses", schema, data);
        let second = sync.sync_table(&docs).await;
        assert_eq!(second.rows_updated, 1);
        assert_eq!(second.rows_inserted, 1);
        assert_eq!(
            target.column_values("Courses", "Title"),
            vec![
                SqlValue::String("Math".into()),
                SqlValue::String("Algebra".into()),
                SqlValue::String("Math".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_schema_column_fails_before_any_statement() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let schema = "<r>\
            <c><COLUMN_NAME>ID</COLUMN_NAME><DATA_TYPE>int</DATA_TYPE>\
              <IS_PRIMARY_KEY>true</IS_PRIMARY_KEY></c>\
            <c><COLUMN_NAME>Name</COLUMN_NAME><DATA_TYPE>varchar</DATA_TYPE></c>\
            <c><COLUMN_NAME>Name</COLUMN_NAME><DATA_TYPE>int</DATA_TYPE></c>\
            </r>";
        let docs = write_docs(dir.path(), "T", schema, "<r><t><ID>1</ID></t></r>");

        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.failed_in, Some(SyncPhase::LoadSchema));
        assert_eq!(outcome.error_kind, Some(ErrorKind::MalformedInput));
        assert!(target.statements().is_empty());
    }

    #[tokio::test]
    async fn test_stamped_rows_carry_timestamp() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(
            &target,
            SyncOptions {
                stamp_rows: true,
                ..options(SyncStrategy::Row)
            },
        );
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));
        sync.sync_table(&docs).await;

        let inserts = target.executed("INSERT INTO Students");
        assert_eq!(
            inserts[0].sql,
            "INSERT INTO Students (StudentID, Name, TimestampColumn) VALUES (@P1, @P2, @P3)"
        );
    }

    #[tokio::test]
    async fn test_students_bulk_strategy_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Bulk));
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));

        let first = sync.sync_table(&docs).await;
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(first.physical_name, "Students_clone");
        assert!(first.table_created);
        assert!(first.procedure_created);
        assert!(target.has_table("Students_clone"));
        assert!(target.has_procedure("fullSync_Students_clone"));
        assert_eq!(target.invocations(), 1);

        target.clear_log();
        let second = sync.sync_table(&docs).await;
        assert!(second.is_success(), "{:?}", second.error);
        assert!(!second.table_created);
        assert!(!second.procedure_created);
        assert!(target.executed("CREATE").is_empty());
        assert!(target.executed("IF NOT EXISTS").is_empty());
        assert_eq!(target.executed("DECLARE @rows").len(), 1);
        assert_eq!(target.invocations(), 2);
    }

    #[tokio::test]
    async fn test_bulk_strategy_statement_order() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Bulk));
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));
        sync.sync_table(&docs).await;

        let kinds: Vec<String> = target
            .statements()
            .iter()
            .map(|s| s.sql.split_whitespace().take(2).collect::<Vec<_>>().join(" "))
            .collect();
        assert_eq!(
            kinds,
            vec![
                "SELECT 1",
                "CREATE TABLE",
                "SELECT 1",
                "IF NOT",
                "CREATE PROCEDURE",
                "DECLARE @rows",
            ]
        );
    }

    #[tokio::test]
    async fn test_table_without_key_is_insert_only() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let schema = "<r><c><COLUMN_NAME>Note</COLUMN_NAME><DATA_TYPE>varchar</DATA_TYPE></c></r>";
        let data = "<r><n><Note>a</Note></n><n><Note>a</Note></n></r>";
        let docs = write_docs(dir.path(), "Notes", schema, data);

        let outcome = sync.sync_table(&docs).await;
        assert!(outcome.is_success());
        assert!(outcome.insert_only);
        assert_eq!(outcome.rows_inserted, 2);
        assert!(target
            .statements()
            .iter()
            .all(|s| !s.sql.starts_with("SELECT 1 FROM Notes")));
    }

    #[tokio::test]
    async fn test_empty_schema_fails_table() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let docs = write_docs(dir.path(), "Students", "<DocumentElement/>", "<r/>");

        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.phase, SyncPhase::Failed);
        assert_eq!(outcome.failed_in, Some(SyncPhase::LoadSchema));
        assert_eq!(outcome.error_kind, Some(ErrorKind::MalformedInput));
        assert!(target.statements().is_empty());
    }

    #[tokio::test]
    async fn test_coercion_failure_aborts_before_writes() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let data = "<r><s><StudentID>1</StudentID><Name>A</Name></s>\
                    <s><StudentID>x</StudentID><Name>B</Name></s></r>";
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, data);

        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.failed_in, Some(SyncPhase::LoadData));
        assert_eq!(outcome.error_kind, Some(ErrorKind::Coercion));
        assert!(target.executed("INSERT").is_empty());
    }

    #[tokio::test]
    async fn test_skip_row_policy_counts_skipped() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(
            &target,
            SyncOptions {
                on_coercion_error: CoercionPolicy::SkipRow,
                ..options(SyncStrategy::Row)
            },
        );
        let data = "<r><s><StudentID>1</StudentID><Name>A</Name></s>\
                    <s><StudentID>x</StudentID><Name>B</Name></s></r>";
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, data);

        let outcome = sync.sync_table(&docs).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.rows_skipped, 1);
        assert_eq!(outcome.rows_inserted, 1);
    }

    #[tokio::test]
    async fn test_create_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new().fail_on("CREATE TABLE");
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));

        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.failed_in, Some(SyncPhase::CreateTable));
        assert_eq!(outcome.error_kind, Some(ErrorKind::Connectivity));
        assert!(!outcome.table_created);
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_absence() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new().fail_on("INFORMATION_SCHEMA.TABLES");
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));

        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.failed_in, Some(SyncPhase::CheckTable));
        assert!(target.executed("CREATE").is_empty());
    }

    #[tokio::test]
    async fn test_existing_table_is_not_recreated() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new().with_table("Students");
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, &students_data("Ann"));

        let outcome = sync.sync_table(&docs).await;
        assert!(outcome.is_success());
        assert!(!outcome.table_created);
        assert!(target.executed("CREATE TABLE").is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_document() {
        let dir = TempDir::new().unwrap();
        let target = MemoryTarget::new();
        let sync = Synchronizer::new(&target, options(SyncStrategy::Row));
        let mut docs = write_docs(dir.path(), "Students", STUDENTS_SCHEMA, "<r/>");
        docs.data_path = dir.path().join("missing.xml");

        let outcome = sync.sync_table(&docs).await;
        assert_eq!(outcome.failed_in, Some(SyncPhase::LoadData));
        assert_eq!(outcome.error_kind, Some(ErrorKind::MalformedInput));
    }
}
