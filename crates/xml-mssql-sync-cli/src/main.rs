//! xml-mssql-sync CLI - synchronize XML table documents into SQL Server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use xml_mssql_sync::error::EXIT_TABLES_FAILED;
use xml_mssql_sync::{plan, Config, Orchestrator, RunOptions, SyncError, SyncStrategy};

#[derive(Parser)]
#[command(name = "xml-mssql-sync")]
#[command(about = "Synchronize XML table documents into SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// ADO connection string, overrides the database section of the config
    #[arg(long, env = "XML_SYNC_CONNECTION_STRING", hide_env_values = true)]
    connection_string: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the configured tables
    Run {
        /// Override the configured strategy (row or bulk)
        #[arg(long)]
        strategy: Option<SyncStrategy>,

        /// Only synchronize this table (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Show the generated DDL and row counts without connecting
    Plan {
        /// Override the configured strategy (row or bulk)
        #[arg(long)]
        strategy: Option<SyncStrategy>,

        /// Only plan this table (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    if let Some(connection_string) = cli.connection_string {
        config = config.with_connection_string(connection_string)?;
    }
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { strategy, tables } => {
            let options = RunOptions { strategy, tables };
            // Reject unknown tables before connecting
            config.resolve_tables(&options.tables)?;

            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run(&options).await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nSync {}!", result.status);
                println!("  Run ID: {}", result.run_id);
                println!("  Strategy: {}", result.strategy);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}/{}", result.tables_success, result.tables_total);
                println!(
                    "  Rows: {} inserted, {} updated, {} skipped",
                    result.rows_inserted, result.rows_updated, result.rows_skipped
                );
                for outcome in result.tables.iter().filter(|o| !o.is_success()) {
                    println!(
                        "  Failed: {} during {}: {}",
                        outcome.table,
                        outcome.failed_in.map(|p| p.to_string()).unwrap_or_default(),
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }

            if !result.is_success() {
                return Ok(ExitCode::from(EXIT_TABLES_FAILED));
            }
        }

        Commands::Plan { strategy, tables } => {
            let preview = plan(&config, &RunOptions { strategy, tables })?;

            if cli.output_json {
                println!("{}", preview.to_json()?);
            } else {
                for table in &preview.tables {
                    println!("-- {} ({} rows)", table.physical_name, table.rows);
                    if table.rows_skipped > 0 {
                        println!("--   {} rows would be skipped", table.rows_skipped);
                    }
                    println!("{}", table.create_table);
                    if let Some(ref sql) = table.create_table_type {
                        println!("{}", sql);
                    }
                    if let Some(ref sql) = table.create_procedure {
                        println!("{}", sql);
                    }
                    println!();
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.db_type,
                    if result.healthy { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if !result.healthy {
                return Err(SyncError::pool(
                    result.error.unwrap_or_default(),
                    "health check",
                ));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
