//! Item normalization: identity, tenant, boolean and date fields.

mod coerce;

pub use coerce::{epoch_to_iso, parse_bool, MILLIS_THRESHOLD};

use crate::audit::{AuditLog, AuditStatus, AuditTicket};
use crate::config::TableConfig;
use crate::source::{non_blank_field, value_text, Item, Row};
use serde_json::Value;

/// Audit id used when an item has no identity value.
pub const NO_ID: &str = "<none>";

/// Per-item transform counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub bool_normalized: u64,
    pub bool_parse_failed: u64,
    pub dates_iso_added: u64,
}

/// One normalized item with the handle to its staged audit record.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub item: Item,
    pub warnings: Vec<String>,
    pub stats: NormalizeStats,
    pub ticket: AuditTicket,
}

/// Normalizes rows of one table.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    table: &'a str,
    config: &'a TableConfig,
    tenant_field: &'a str,
    tenant_default: &'a str,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        table: &'a str,
        config: &'a TableConfig,
        tenant_field: &'a str,
        tenant_default: &'a str,
    ) -> Self {
        Self {
            table,
            config,
            tenant_field,
            tenant_default,
        }
    }

    /// Normalize one row and stage its audit record (`ok` or `warn`).
    pub fn normalize(&self, row: Row, audit: &mut AuditLog) -> Normalized {
        let (item, warnings, stats) =
            normalize_item(row, self.config, self.tenant_field, self.tenant_default);

        let id = item
            .get(&self.config.id_field)
            .and_then(value_text)
            .unwrap_or_else(|| NO_ID.to_string());
        let status = if warnings.is_empty() {
            AuditStatus::Ok
        } else {
            AuditStatus::Warn
        };
        let ticket = audit.record(self.table, &id, status, warnings.clone());

        Normalized {
            item,
            warnings,
            stats,
            ticket,
        }
    }

    /// Normalize a whole batch in order.
    pub fn normalize_batch(&self, rows: Vec<Row>, audit: &mut AuditLog) -> Vec<Normalized> {
        rows.into_iter().map(|row| self.normalize(row, audit)).collect()
    }
}

/// Normalize one row without touching the audit log.
///
/// Never drops the item: a missing identity only produces a warning here,
/// the validator decides whether the item is loaded.
pub fn normalize_item(
    row: Row,
    config: &TableConfig,
    tenant_field: &str,
    tenant_default: &str,
) -> (Item, Vec<String>, NormalizeStats) {
    let mut item: Item = row;
    let mut warnings = Vec::new();
    let mut stats = NormalizeStats::default();

    // Identity as string, in JSON text form (true, 1.5)
    let id_field = config.id_field.as_str();
    match item.get(id_field) {
        Some(Value::Null) | None => {
            warnings.push(format!("missing id field {}", id_field));
        }
        Some(Value::String(_)) => {}
        Some(other) => {
            let text = other.to_string();
            item.insert(id_field.to_string(), Value::String(text));
        }
    }

    // Tenant
    if non_blank_field(&item, tenant_field).is_none() {
        item.insert(
            tenant_field.to_string(),
            Value::String(tenant_default.to_string()),
        );
        warnings.push(format!("{} injected", tenant_field));
    }

    // Booleans
    for field in &config.bool_fields {
        let Some(value) = item.get(field) else {
            continue;
        };
        match parse_bool(value) {
            Some(b) => {
                item.insert(field.clone(), Value::Bool(b));
                stats.bool_normalized += 1;
            }
            None => {
                warnings.push(format!("bool parse fail {}={}", field, display_value(value)));
                stats.bool_parse_failed += 1;
            }
        }
    }

    // Dates
    for field in &config.date_fields {
        let Some(value) = item.get(field) else {
            continue;
        };
        match epoch_to_iso(value) {
            Some(iso) => {
                item.insert(format!("{}Iso", field), Value::String(iso));
                stats.dates_iso_added += 1;
            }
            None => {
                warnings.push(format!("date parse fail {}={}", field, display_value(value)));
            }
        }
    }

    (item, warnings, stats)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
