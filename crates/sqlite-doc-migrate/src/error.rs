//! Error types for the migration library.
//!
//! Only setup-level failures surface as [`MigrateError`]. Row-level problems
//! (transform warnings, missing keys, rejected upserts) are recorded as data
//! in the audit log and table metrics and never reach this type.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid document, missing fields, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source snapshot connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Snapshot could not be fetched or opened
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Destination client or container could not be established
    #[error("Destination error: {message}\n  Context: {context}")]
    Destination { message: String, context: String },

    /// Audit log could not be created or written
    #[error("Audit log error: {0}")]
    Audit(String),

    /// Object storage error
    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MigrateError {
    /// Create a Destination error with context about where it occurred
    pub fn destination(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Destination {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Process exit code distinguishing the failing setup stage.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Source(_) | MigrateError::Snapshot(_) => 3,
            MigrateError::Destination { .. } => 4,
            MigrateError::Audit(_) | MigrateError::Csv(_) => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
