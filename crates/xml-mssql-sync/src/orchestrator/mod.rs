//! Sync orchestrator - runs the configured tables one after another.

use crate::config::{Config, SyncStrategy, TableDocuments};
use crate::ddl::{generate_create_table, generate_table_type, generate_upsert_procedure};
use crate::decode::{decode_rows, DecodeOptions};
use crate::error::Result;
use crate::schema::{ColumnModel, SyncTarget};
use crate::sync::{SyncOptions, Synchronizer, TableOutcome};
use crate::target::{MssqlTargetPool, TargetPool};
use crate::xml::XmlDocument;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Sync orchestrator.
pub struct Orchestrator {
    config: Config,
    target: Arc<dyn TargetPool>,
}

/// Per-run overrides of the configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Strategy override.
    pub strategy: Option<SyncStrategy>,

    /// Restrict the run to these tables. Empty means all configured tables.
    pub tables: Vec<String>,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed" or "failed".
    pub status: String,

    pub strategy: SyncStrategy,

    /// SHA256 of the configuration used.
    pub config_hash: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,

    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_skipped: usize,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Per-table outcomes in processing order.
    pub tables: Vec<TableOutcome>,
}

impl SyncResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.tables_failed == 0
    }
}

/// Result of a connection health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub db_type: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create a new orchestrator connected to SQL Server.
    pub async fn new(config: Config) -> Result<Self> {
        let target = MssqlTargetPool::new(&config.database).await?;
        Ok(Self::with_target(config, Arc::new(target)))
    }

    /// Create an orchestrator over an existing target.
    pub fn with_target(config: Config, target: Arc<dyn TargetPool>) -> Self {
        Self { config, target }
    }

    /// Run the sync. Table failures are reported in the result; only
    /// errors before the first table is attempted are returned as `Err`.
    pub async fn run(&self, options: &RunOptions) -> Result<SyncResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let strategy = options.strategy.unwrap_or(self.config.sync.strategy);
        let tables = self.config.resolve_tables(&options.tables)?;

        info!(
            "Starting sync run {}: {} tables, strategy {}",
            run_id,
            tables.len(),
            strategy
        );

        let sync = Synchronizer::new(
            self.target.as_ref(),
            SyncOptions {
                strategy,
                on_coercion_error: self.config.sync.on_coercion_error,
                stamp_rows: self.config.sync.stamp_rows,
            },
        );

        let mut outcomes = Vec::with_capacity(tables.len());
        for docs in &tables {
            info!("Synchronizing {}", docs.table);
            outcomes.push(sync.sync_table(docs).await);
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let failed_tables: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.table.clone())
            .collect();

        let result = SyncResult {
            run_id,
            status: if failed_tables.is_empty() {
                "completed".to_string()
            } else {
                "failed".to_string()
            },
            strategy,
            config_hash: self.config.hash(),
            duration_seconds: duration,
            started_at,
            completed_at,
            tables_total: outcomes.len(),
            tables_success: outcomes.len() - failed_tables.len(),
            tables_failed: failed_tables.len(),
            rows_inserted: outcomes.iter().map(|o| o.rows_inserted).sum(),
            rows_updated: outcomes.iter().map(|o| o.rows_updated).sum(),
            rows_skipped: outcomes.iter().map(|o| o.rows_skipped).sum(),
            failed_tables,
            tables: outcomes,
        };

        if result.is_success() {
            info!(
                "Sync run {} completed in {:.2}s: {} inserted, {} updated",
                result.run_id, result.duration_seconds, result.rows_inserted, result.rows_updated
            );
        } else {
            warn!(
                "Sync run {} finished with {} failed tables: {}",
                result.run_id,
                result.tables_failed,
                result.failed_tables.join(", ")
            );
        }

        Ok(result)
    }

    /// Check that the target database answers.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let ping = self.target.ping().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(HealthCheckResult {
            healthy: ping.is_ok(),
            db_type: self.target.db_type().to_string(),
            latency_ms,
            error: ping.err().map(|e| e.to_string()),
        })
    }

    /// Close the target connections.
    pub async fn close(&self) {
        self.target.close().await;
    }
}

/// Statements and row counts a run would produce for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TablePlan {
    pub table: String,
    pub physical_name: String,
    pub create_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_table_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_procedure: Option<String>,
    pub rows: usize,
    pub rows_skipped: usize,
}

/// Offline preview of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub strategy: SyncStrategy,
    pub tables: Vec<TablePlan>,
}

impl SyncPlan {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Load and decode every selected table's documents and render the DDL,
/// without touching a database. Stops at the first failing table.
pub fn plan(config: &Config, options: &RunOptions) -> Result<SyncPlan> {
    let strategy = options.strategy.unwrap_or(config.sync.strategy);
    let tables = config
        .resolve_tables(&options.tables)?
        .iter()
        .map(|docs| plan_table(config, strategy, docs))
        .collect::<Result<Vec<_>>>()?;

    Ok(SyncPlan { strategy, tables })
}

fn plan_table(config: &Config, strategy: SyncStrategy, docs: &TableDocuments) -> Result<TablePlan> {
    let model = ColumnModel::load(&docs.schema_path)?;
    if model.is_empty() {
        return Err(crate::error::SyncError::EmptySchema(docs.table.clone()));
    }
    let target = SyncTarget::new(&docs.table, model, strategy.naming());

    let create_table = generate_create_table(&target)?.to_string();
    let (create_table_type, create_procedure) = match strategy {
        SyncStrategy::Bulk => (
            Some(generate_table_type(&target)?),
            Some(generate_upsert_procedure(&target)?),
        ),
        SyncStrategy::Row => (None, None),
    };

    let data = XmlDocument::load(&docs.data_path)?;
    let decoded = decode_rows(
        &data,
        &target.model,
        &DecodeOptions {
            table: docs.table.clone(),
            policy: config.sync.on_coercion_error,
            stamp: None,
        },
    )?;

    Ok(TablePlan {
        table: docs.table.clone(),
        physical_name: target.physical_name(),
        create_table,
        create_table_type,
        create_procedure,
        rows: decoded.rows.len(),
        rows_skipped: decoded.skipped,
    })
}
