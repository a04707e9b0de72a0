//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{Result, SyncError};
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Replace the connection settings with an ADO connection string.
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Result<Self> {
        self.database.connection_string = Some(connection_string.into());
        self.validate()?;
        Ok(self)
    }

    /// Compute a SHA256 hash of the configuration for the run record.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Document locations of the configured tables, in configured order.
    ///
    /// A non-empty `only` restricts the result to the named tables (matched
    /// case-insensitively); naming a table that is not configured is an error.
    pub fn resolve_tables(&self, only: &[String]) -> Result<Vec<TableDocuments>> {
        for name in only {
            if !self
                .sync
                .tables
                .iter()
                .any(|t| t.name().eq_ignore_ascii_case(name))
            {
                return Err(SyncError::Config(format!(
                    "table '{}' is not listed in sync.tables",
                    name
                )));
            }
        }

        self.sync
            .tables
            .iter()
            .filter(|t| only.is_empty() || only.iter().any(|n| t.name().eq_ignore_ascii_case(n)))
            .map(|t| {
                self.sync.documents_for(t).ok_or_else(|| {
                    SyncError::Config(format!("no documents configured for table '{}'", t.name()))
                })
            })
            .collect()
    }
}

impl DatabaseConfig {
    /// Whether the connection should be encrypted.
    pub fn encrypt_enabled(&self) -> bool {
        !matches!(
            self.encrypt.to_lowercase().as_str(),
            "false" | "no" | "0" | "disable"
        )
    }

    /// Connection target for log lines, without credentials.
    pub fn describe(&self) -> String {
        match &self.connection_string {
            Some(_) => "connection string".to_string(),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}
