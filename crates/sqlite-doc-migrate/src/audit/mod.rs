//! Per-item audit trail.
//!
//! Every item produces exactly one [`AuditRecord`]. Records are staged while
//! a batch moves through normalization and validation, so the validator can
//! still overwrite a record's status, and are written to the CSV artifact
//! when the orchestrator commits the batch. Counters are updated at commit
//! time from the final status only.

use crate::error::{MigrateError, Result};
use crate::storage::ObjectLocation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Outcome of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Ok,
    Warn,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "ok",
            AuditStatus::Warn => "warn",
            AuditStatus::Error => "error",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-shape outcome entry for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub table: String,
    pub id: String,
    pub status: AuditStatus,
    pub warnings: Vec<String>,
}

/// Handle to a staged record, valid until the next [`AuditLog::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditTicket(usize);

/// Record counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounts {
    pub processed: u64,
    pub ok: u64,
    pub warn: u64,
    pub error: u64,
}

impl AuditCounts {
    fn add(&mut self, status: AuditStatus) {
        self.processed += 1;
        match status {
            AuditStatus::Ok => self.ok += 1,
            AuditStatus::Warn => self.warn += 1,
            AuditStatus::Error => self.error += 1,
        }
    }
}

/// Row layout of the CSV artifact.
#[derive(Serialize)]
struct CsvRecord<'a> {
    table: &'a str,
    id: &'a str,
    status: AuditStatus,
    warnings: String,
}

const CSV_HEADER: [&str; 4] = ["table", "id", "status", "warnings"];

/// CSV-backed audit log, owned by the orchestrator for the length of a run.
pub struct AuditLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    pending: Vec<AuditRecord>,
    tables: BTreeMap<String, AuditCounts>,
    totals: AuditCounts,
}

impl AuditLog {
    /// Create (or truncate) the CSV file and write its header row.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MigrateError::Audit(format!("{}: {}", parent.display(), e)))?;
        }
        let file = File::create(&path)
            .map_err(|e| MigrateError::Audit(format!("{}: {}", path.display(), e)))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(CSV_HEADER)?;

        Ok(Self {
            path,
            writer,
            pending: Vec::new(),
            tables: BTreeMap::new(),
            totals: AuditCounts::default(),
        })
    }

    /// Path of the CSV artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage a record for the current batch.
    pub fn record(
        &mut self,
        table: &str,
        id: &str,
        status: AuditStatus,
        warnings: Vec<String>,
    ) -> AuditTicket {
        self.pending.push(AuditRecord {
            table: table.to_string(),
            id: id.to_string(),
            status,
            warnings,
        });
        AuditTicket(self.pending.len() - 1)
    }

    /// Overwrite a staged record's status with `error`, appending `reason`.
    ///
    /// Returns false if the ticket no longer refers to a staged record.
    pub fn mark_error(&mut self, ticket: AuditTicket, reason: &str) -> bool {
        match self.pending.get_mut(ticket.0) {
            Some(record) => {
                record.status = AuditStatus::Error;
                record.warnings.push(reason.to_string());
                true
            }
            None => false,
        }
    }

    /// Staged records not yet committed.
    pub fn pending(&self) -> &[AuditRecord] {
        &self.pending
    }

    /// Write staged records to the CSV and fold them into the counters.
    pub fn commit(&mut self) -> Result<()> {
        for record in self.pending.drain(..) {
            self.writer.serialize(CsvRecord {
                table: &record.table,
                id: &record.id,
                status: record.status,
                warnings: record.warnings.join("; "),
            })?;
            self.totals.add(record.status);
            self.tables
                .entry(record.table)
                .or_default()
                .add(record.status);
        }
        Ok(())
    }

    /// Counters for records committed so far.
    pub fn summary(&self) -> AuditSummary {
        AuditSummary {
            path: self.path.clone(),
            tables: self.tables.clone(),
            totals: self.totals,
        }
    }

    /// Commit anything staged, flush the file and log the per-table digest.
    pub fn close(mut self) -> Result<AuditSummary> {
        self.commit()?;
        self.writer
            .flush()
            .map_err(|e| MigrateError::Audit(format!("{}: {}", self.path.display(), e)))?;

        let summary = self.summary();
        for line in summary.to_string().lines() {
            info!("{}", line);
        }
        Ok(summary)
    }
}

/// Aggregated audit counts plus the location of the written artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub path: PathBuf,
    pub tables: BTreeMap<String, AuditCounts>,
    pub totals: AuditCounts,
}

impl AuditSummary {
    /// Upload the CSV artifact. Returns the number of bytes written.
    pub async fn export(&self, target: &ObjectLocation) -> Result<usize> {
        target.upload_file(&self.path).await
    }
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "============ AUDIT LOG SUMMARY (by table) ============")?;
        for (table, s) in &self.tables {
            writeln!(
                f,
                "{:24} | processed={:5}  ok={:5}  warn={:4}  error={:4}",
                table, s.processed, s.ok, s.warn, s.error
            )?;
        }
        writeln!(f, "TOTALS")?;
        writeln!(
            f,
            "  processed={}  warnings={}  errors={}",
            self.totals.processed, self.totals.warn, self.totals.error
        )?;
        write!(f, "Detailed audit log written to {}", self.path.display())
    }
}
