//! Configuration validation.

use super::{Config, DestinationConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.database.trim().is_empty() {
        return Err(MigrateError::Config("database is required".into()));
    }
    if config.containers.is_empty() {
        return Err(MigrateError::Config(
            "containers must list at least one table".into(),
        ));
    }
    if config.batch_size == 0 {
        return Err(MigrateError::Config("batchSize must be at least 1".into()));
    }
    if config.concurrency == 0 {
        return Err(MigrateError::Config(
            "concurrency must be at least 1".into(),
        ));
    }
    if config.tenant_field.trim().is_empty() {
        return Err(MigrateError::Config("tenantField must not be empty".into()));
    }

    for (table, meta) in &config.containers {
        if table.trim().is_empty() {
            return Err(MigrateError::Config("table names must not be empty".into()));
        }
        if meta.id_field.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "containers.{}.idField must not be empty",
                table
            )));
        }
        if config.pk_field(meta).trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "containers.{}.pkField must not be empty",
                table
            )));
        }
    }

    if config.source.path.trim().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }
    if let DestinationConfig::Directory { path } = &config.destination {
        if path.trim().is_empty() {
            return Err(MigrateError::Config(
                "destination.path is required for kind: directory".into(),
            ));
        }
    }
    if config.audit.path.trim().is_empty() {
        return Err(MigrateError::Config("audit.path is required".into()));
    }

    Ok(())
}
