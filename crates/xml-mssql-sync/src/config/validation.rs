//! Configuration validation.

use super::Config;
use crate::ddl::validate_identifier;
use crate::error::{Result, SyncError};
use std::collections::HashSet;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;

    // Connection: either an ADO string or the discrete fields
    match &db.connection_string {
        Some(s) if s.trim().is_empty() => {
            return Err(SyncError::Config(
                "database.connection_string must not be empty".into(),
            ));
        }
        Some(_) => {}
        None => {
            if db.host.is_empty() {
                return Err(SyncError::Config("database.host is required".into()));
            }
            if db.database.is_empty() {
                return Err(SyncError::Config("database.database is required".into()));
            }
            if db.user.is_empty() {
                return Err(SyncError::Config("database.user is required".into()));
            }
        }
    }

    if db.max_connections == 0 {
        return Err(SyncError::Config(
            "database.max_connections must be at least 1".into(),
        ));
    }
    if db.query_timeout_secs == 0 {
        return Err(SyncError::Config(
            "database.query_timeout_secs must be at least 1".into(),
        ));
    }

    // Tables
    if config.sync.tables.is_empty() {
        return Err(SyncError::Config(
            "sync.tables must list at least one table".into(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in &config.sync.tables {
        let name = entry.name();
        if validate_identifier(name).is_err() {
            return Err(SyncError::Config(format!(
                "sync.tables: '{}' is not a valid table name",
                name
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(SyncError::Config(format!(
                "sync.tables: '{}' is listed more than once",
                name
            )));
        }
        if config.sync.documents_for(entry).is_none() {
            return Err(SyncError::Config(format!(
                "sync.tables: '{}' needs schema_file and data_file when sync.data_dir is not set",
                name
            )));
        }
    }

    Ok(())
}
