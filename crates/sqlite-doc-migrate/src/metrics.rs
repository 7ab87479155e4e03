//! Per-table counters and the run summary.

use crate::audit::AuditSummary;
use crate::error::Result;
use crate::transfer::BatchResult;
use crate::transform::NormalizeStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error strings kept per table. Counters stay exact past this.
pub const MAX_TABLE_ERROR_SAMPLES: usize = 20;

/// Counters for one table. All counts are exact; `errors` is a sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetrics {
    pub rows_read: u64,
    pub rows_transformed: u64,
    pub missing_id: u64,
    pub missing_pk: u64,
    pub ok_upserts: u64,
    pub err_upserts: u64,
    pub bool_normalized: u64,
    pub bool_parse_failed: u64,
    pub dates_iso_added: u64,
    pub errors: Vec<String>,
}

impl TableMetrics {
    /// Append to the error sample if there is room.
    pub fn push_error(&mut self, error: String) {
        if self.errors.len() < MAX_TABLE_ERROR_SAMPLES {
            self.errors.push(error);
        }
    }

    /// Fold one item's transform counts.
    pub fn add_normalize_stats(&mut self, stats: &NormalizeStats) {
        self.bool_normalized += stats.bool_normalized;
        self.bool_parse_failed += stats.bool_parse_failed;
        self.dates_iso_added += stats.dates_iso_added;
    }

    /// Fold the outcome of one load call.
    pub fn add_batch_result(&mut self, result: BatchResult) {
        self.ok_upserts += result.ok_count;
        self.err_upserts += result.err_count;
        for error in result.error_samples {
            if self.errors.len() >= MAX_TABLE_ERROR_SAMPLES {
                break;
            }
            self.errors.push(error);
        }
    }
}

/// Run-wide totals across tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub rows_read: u64,
    pub rows_transformed: u64,
    pub ok_upserts: u64,
    pub err_upserts: u64,
    pub missing_id: u64,
    pub missing_pk: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table metrics, in processing order.
    pub tables: Vec<(String, TableMetrics)>,

    /// Sums across tables.
    pub totals: RunTotals,

    /// Audit counts, once the audit log has been closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditSummary>,

    /// Whether the audit artifact reached object storage.
    #[serde(default)]
    pub audit_exported: bool,
}

impl RunSummary {
    /// Sum table metrics into totals.
    pub fn compute_totals(tables: &[(String, TableMetrics)]) -> RunTotals {
        tables.iter().fold(RunTotals::default(), |mut acc, (_, m)| {
            acc.rows_read += m.rows_read;
            acc.rows_transformed += m.rows_transformed;
            acc.ok_upserts += m.ok_upserts;
            acc.err_upserts += m.err_upserts;
            acc.missing_id += m.missing_id;
            acc.missing_pk += m.missing_pk;
            acc
        })
    }

    /// Metrics for a table by name.
    pub fn table(&self, name: &str) -> Option<&TableMetrics> {
        self.tables.iter().find(|(t, _)| t == name).map(|(_, m)| m)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "================ ETL SUMMARY ================")?;
        for (table, m) in &self.tables {
            writeln!(
                f,
                "{:24} | read={:5}  xform={:5}  ok={:5}  err={:3}  missId={:3}  missPK={:3}  \
                 bool+={:3}  bool?={:3}  date+={:3}",
                table,
                m.rows_read,
                m.rows_transformed,
                m.ok_upserts,
                m.err_upserts,
                m.missing_id,
                m.missing_pk,
                m.bool_normalized,
                m.bool_parse_failed,
                m.dates_iso_added
            )?;
            if !m.errors.is_empty() {
                writeln!(f, "  errors (sample):")?;
                for e in &m.errors {
                    writeln!(f, "     - {}", e)?;
                }
            }
        }
        writeln!(f, "TOTALS")?;
        write!(
            f,
            "  rows_read={}  ok={}  err={}  missing_id={}  missing_pk={}",
            self.totals.rows_read,
            self.totals.ok_upserts,
            self.totals.err_upserts,
            self.totals.missing_id,
            self.totals.missing_pk
        )
    }
}
