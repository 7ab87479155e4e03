//! # sqlite-doc-migrate
//!
//! Streaming migration from a SQLite snapshot into a partitioned document
//! store.
//!
//! Each configured table is read in batches and every row goes through the
//! same pipeline:
//!
//! - **Normalize**: identity as text, tenant injection, boolean coercion,
//!   derived ISO-8601 date fields
//! - **Validate**: items without an identity or partition key are dropped
//! - **Upsert**: idempotent writes keyed by identity + partition key,
//!   fanned out over a bounded pool of blocking workers
//! - **Audit**: exactly one CSV record per item, optionally exported to
//!   object storage after the run
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_doc_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> sqlite_doc_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let summary = orchestrator.run().await?;
//!     println!("Upserted {} items", summary.totals.ok_upserts);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod source;
pub mod storage;
pub mod target;
pub mod transfer;
pub mod transform;
pub mod validate;

// Re-exports for convenient access
pub use audit::{AuditLog, AuditRecord, AuditStatus, AuditSummary};
pub use config::{AuditConfig, Config, DestinationConfig, SourceConfig, TableConfig};
pub use error::{MigrateError, Result};
pub use metrics::{RunSummary, TableMetrics};
pub use orchestrator::{HealthCheckResult, Orchestrator};
pub use source::{Item, Row, RowSource, SqliteSource};
pub use storage::ObjectLocation;
pub use target::{
    ContainerSpec, DirectoryStore, DocumentContainer, DocumentStore, MemoryStore, UpsertError,
    UpsertOutcome,
};
pub use transfer::{BatchResult, UpsertSink};
pub use transform::Normalizer;
pub use validate::Validator;
