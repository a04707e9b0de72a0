//! Error types for the synchronization library.

use serde::Serialize;
use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for malformed documents and type coercion failures.
pub const EXIT_INPUT_ERROR: u8 = 2;
/// Exit code for database connectivity failures.
pub const EXIT_CONNECTIVITY_ERROR: u8 = 3;
/// Exit code for catalog consistency conflicts.
pub const EXIT_CONSISTENCY_ERROR: u8 = 4;
/// Exit code when at least one table failed to synchronize.
pub const EXIT_TABLES_FAILED: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema or data document could not be read or parsed.
    #[error("Malformed input in {path}: {message}")]
    MalformedInput { path: String, message: String },

    /// Schema document produced no columns.
    #[error("Schema for table {0} has no columns")]
    EmptySchema(String),

    /// A data value could not be converted to its column's type.
    #[error("Cannot convert '{value}' to {expected} for {table}.{column} (row {row})")]
    Coercion {
        table: String,
        row: usize,
        column: String,
        value: String,
        expected: String,
    },

    /// Database connection or protocol error.
    #[error("Database error: {0}")]
    Connectivity(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A database round trip exceeded its time budget.
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// The server rejected a statement.
    #[error("Statement rejected (error {code}): {message}")]
    StatementRejected { code: u32, message: String },

    /// Generated DDL conflicts with an existing object.
    #[error("Consistency conflict on {object}: {message}")]
    Consistency { object: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error category, used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    MalformedInput,
    Coercion,
    Connectivity,
    Consistency,
    Io,
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a MalformedInput error
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::MalformedInput {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::MalformedInput { .. } | SyncError::EmptySchema(_) => {
                ErrorKind::MalformedInput
            }
            SyncError::Coercion { .. } => ErrorKind::Coercion,
            SyncError::Connectivity(_)
            | SyncError::Pool { .. }
            | SyncError::Timeout { .. }
            | SyncError::StatementRejected { .. } => ErrorKind::Connectivity,
            SyncError::Consistency { .. } => ErrorKind::Consistency,
            SyncError::Io(_) => ErrorKind::Io,
            SyncError::Yaml(_) | SyncError::Json(_) => ErrorKind::Config,
        }
    }

    /// Whether retrying the same round trip may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Timeout { .. } | SyncError::Pool { .. } => true,
            SyncError::Connectivity(e) => is_transient_tiberius(e),
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Config => EXIT_CONFIG_ERROR,
            ErrorKind::MalformedInput | ErrorKind::Coercion => EXIT_INPUT_ERROR,
            ErrorKind::Connectivity => EXIT_CONNECTIVITY_ERROR,
            ErrorKind::Consistency => EXIT_CONSISTENCY_ERROR,
            ErrorKind::Io => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn is_transient_tiberius(e: &tiberius::error::Error) -> bool {
    use tiberius::error::Error;
    match e {
        Error::Io { .. } | Error::Routing { .. } | Error::Tls(_) => true,
        Error::Server(_) => e.is_deadlock(),
        _ => false,
    }
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
