//! Migration orchestrator - main workflow coordinator.

use crate::audit::AuditLog;
use crate::config::{redact_url, Config, TableConfig};
use crate::error::{MigrateError, Result};
use crate::metrics::{RunSummary, TableMetrics};
use crate::source::{RowSource, SqliteSource};
use crate::storage::ObjectLocation;
use crate::target::{self, ContainerSpec, DocumentContainer, DocumentStore};
use crate::transfer::UpsertSink;
use crate::transform::Normalizer;
use crate::validate::Validator;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Migration orchestrator.
///
/// Owns the source and destination for one run. The audit log is created
/// when the run starts, so a health check never truncates it.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn RowSource>,
    store: Arc<dyn DocumentStore>,
}

/// A table whose source and container were checked before the first batch.
struct PreparedTable<'a> {
    name: &'a str,
    config: &'a TableConfig,
    container: Arc<dyn DocumentContainer>,
    expected_rows: i64,
}

/// Snapshot view of one configured table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCheck {
    pub table: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Snapshot file that was opened.
    pub source_path: String,

    /// Destination store kind.
    pub destination: String,

    /// Destination database name.
    pub database: String,

    /// One entry per configured table.
    pub tables: Vec<TableCheck>,
}

impl HealthCheckResult {
    /// True when every configured table exists in the snapshot.
    pub fn healthy(&self) -> bool {
        self.tables.iter().all(|t| t.exists)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create a new orchestrator: fetch the snapshot if configured, open it
    /// and connect the destination store.
    pub async fn new(config: Config) -> Result<Self> {
        if let Some(url) = &config.source.snapshot_url {
            fetch_snapshot(url, Path::new(&config.source.path)).await?;
        }

        let source = SqliteSource::open(&config.source.path).await?;
        let store = match target::connect(&config) {
            Ok(store) => store,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::with_parts(config, Arc::new(source), store))
    }

    /// Build an orchestrator over already-connected collaborators.
    pub fn with_parts(
        config: Config,
        source: Arc<dyn RowSource>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Run the migration over every configured table.
    ///
    /// Item-level problems never fail the run. Setup failures (missing
    /// table, container creation, audit log, source query) abort it after
    /// the source is closed. Every table and container is checked before
    /// the first batch is read, so a setup failure leaves no table partly
    /// loaded.
    pub async fn run(self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let prepared = match self.prepare_tables().await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.source.close().await;
                return Err(e);
            }
        };

        let mut audit = match AuditLog::create(&self.config.audit.path) {
            Ok(audit) => audit,
            Err(e) => {
                self.source.close().await;
                return Err(e);
            }
        };

        let sink = UpsertSink::new(self.config.concurrency);
        let mut tables = Vec::with_capacity(prepared.len());
        for table in &prepared {
            match self.migrate_table(&sink, table, &mut audit).await {
                Ok(metrics) => tables.push((table.name.to_string(), metrics)),
                Err(e) => {
                    self.source.close().await;
                    return Err(e);
                }
            }
        }
        self.source.close().await;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let totals = RunSummary::compute_totals(&tables);
        let mut summary = RunSummary {
            run_id,
            started_at,
            completed_at,
            duration_seconds: duration,
            tables,
            totals,
            audit: None,
            audit_exported: false,
        };
        for line in summary.to_string().lines() {
            info!("{}", line);
        }

        let audit_summary = audit.close()?;
        if let Some(url) = &self.config.audit.export_url {
            summary.audit_exported = export_audit(&audit_summary, url).await;
        }
        summary.audit = Some(audit_summary);

        info!(
            "Migration completed: {} tables, {} rows read, {} upserted in {:.1}s",
            summary.tables.len(),
            summary.totals.rows_read,
            summary.totals.ok_upserts,
            summary.duration_seconds
        );
        Ok(summary)
    }

    /// Check every configured table exists and ensure its container, in
    /// config order.
    async fn prepare_tables(&self) -> Result<Vec<PreparedTable<'_>>> {
        let mut prepared = Vec::with_capacity(self.config.containers.len());
        for (table, table_config) in &self.config.containers {
            if !self.source.table_exists(table).await? {
                return Err(MigrateError::Snapshot(format!(
                    "table {} not found in snapshot",
                    table
                )));
            }
            let expected_rows = self.source.row_count(table).await?;

            let spec = ContainerSpec {
                name: table.clone(),
                id_field: table_config.id_field.clone(),
                partition_key: self.config.pk_field(table_config).to_string(),
            };
            let container = self.store.container(&spec)?;
            debug!(
                "{}: container {}/{} ready (partition key {})",
                table,
                self.store.database(),
                container.name(),
                spec.partition_key_path()
            );
            prepared.push(PreparedTable {
                name: table,
                config: table_config,
                container,
                expected_rows,
            });
        }
        Ok(prepared)
    }

    /// Move one table through normalize, validate and upsert, batch by batch.
    async fn migrate_table(
        &self,
        sink: &UpsertSink,
        prepared: &PreparedTable<'_>,
        audit: &mut AuditLog,
    ) -> Result<TableMetrics> {
        let start = Instant::now();
        let table = prepared.name;
        let table_config = prepared.config;
        let expected = prepared.expected_rows;
        let container = &prepared.container;
        let pk_field = self.config.pk_field(table_config);
        info!(
            "{}: migrating {} rows into {}/{}",
            table,
            expected,
            self.store.database(),
            container.name()
        );

        let normalizer = Normalizer::new(
            table,
            table_config,
            &self.config.tenant_field,
            self.config.tenant_default(),
        );
        let validator = Validator::new(table, &table_config.id_field, pk_field);
        let mut metrics = TableMetrics::default();

        let mut batches = self.source.stream(table, self.config.batch_size);
        let mut batch_num = 0usize;
        while let Some(batch) = batches.next().await {
            let rows = batch?;
            batch_num += 1;
            metrics.rows_read += rows.len() as u64;

            let normalized = normalizer.normalize_batch(rows, audit);
            for item in &normalized {
                metrics.add_normalize_stats(&item.stats);
            }
            let valid = validator.split(normalized, &mut metrics, audit);
            metrics.rows_transformed += valid.len() as u64;

            let result = sink
                .upsert(container.clone(), &table_config.id_field, valid)
                .await;
            debug!(
                "{}: batch {} upserted (ok: {}, err: {}), {}/{} rows read",
                table, batch_num, result.ok_count, result.err_count, metrics.rows_read, expected
            );
            metrics.add_batch_result(result);
            audit.commit()?;
        }

        info!(
            "{}: read {} rows, upserted {} ({} errors, {} invalid) in {:?}",
            table,
            metrics.rows_read,
            metrics.ok_upserts,
            metrics.err_upserts,
            metrics.rows_read - metrics.rows_transformed,
            start.elapsed()
        );
        Ok(metrics)
    }

    /// Check that every configured table is present in the snapshot.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let mut tables = Vec::with_capacity(self.config.containers.len());
        for table in self.config.containers.keys() {
            let exists = self.source.table_exists(table).await?;
            let row_count = if exists {
                Some(self.source.row_count(table).await?)
            } else {
                None
            };

            match row_count {
                Some(count) => info!("{}: {} rows", table, count),
                None => warn!("{}: table not found in snapshot", table),
            }
            tables.push(TableCheck {
                table: table.clone(),
                exists,
                row_count,
            });
        }

        Ok(HealthCheckResult {
            source_path: self.config.source.path.clone(),
            destination: self.store.kind().to_string(),
            database: self.store.database().to_string(),
            tables,
        })
    }

    /// Release the source without running.
    pub async fn close(self) {
        self.source.close().await;
    }
}

/// Download the snapshot to its local path. Any failure is a snapshot error.
async fn fetch_snapshot(url: &str, dest: &Path) -> Result<()> {
    let location = ObjectLocation::parse(url)?;
    info!("Fetching snapshot from {}", location);
    location.download_to(dest).await.map_err(|e| {
        MigrateError::Snapshot(format!("download from {} failed: {}", location, e))
    })?;
    Ok(())
}

/// Best-effort upload of the audit artifact. Failure is logged, not raised.
async fn export_audit(summary: &crate::audit::AuditSummary, url: &str) -> bool {
    let location = match ObjectLocation::parse(url) {
        Ok(location) => location,
        Err(e) => {
            warn!("Audit export to {} skipped: {}", redact_url(url), e);
            return false;
        }
    };
    match summary.export(&location).await {
        Ok(bytes) => {
            info!("Audit log exported to {} ({} bytes)", location, bytes);
            true
        }
        Err(e) => {
            warn!("Audit export to {} failed: {}", location, e);
            false
        }
    }
}
