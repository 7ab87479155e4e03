//! Post-normalization key validation.

use crate::audit::AuditLog;
use crate::metrics::TableMetrics;
use crate::source::{non_blank_field, value_text, Item};
use crate::transform::Normalized;

/// Audit reason for items dropped by the validator.
pub const INVALID_REASON: &str = "missing-id-or-pk";

/// Which required keys an item lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCheck {
    pub missing_id: bool,
    pub missing_pk: bool,
}

impl KeyCheck {
    pub fn is_valid(&self) -> bool {
        !self.missing_id && !self.missing_pk
    }
}

/// Enforces identity and partition keys for one table.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    table: &'a str,
    id_field: &'a str,
    pk_field: &'a str,
}

impl<'a> Validator<'a> {
    pub fn new(table: &'a str, id_field: &'a str, pk_field: &'a str) -> Self {
        Self {
            table,
            id_field,
            pk_field,
        }
    }

    /// Check both keys resolve to non-blank text.
    pub fn check(&self, item: &Item) -> KeyCheck {
        KeyCheck {
            missing_id: non_blank_field(item, self.id_field).is_none(),
            missing_pk: non_blank_field(item, self.pk_field).is_none(),
        }
    }

    /// Split a normalized batch into loadable items.
    ///
    /// Each missing key bumps its own counter. Failing items are dropped,
    /// their staged audit record is overwritten as `error`, and a short
    /// identifier lands in the table's error sample.
    pub fn split(
        &self,
        batch: Vec<Normalized>,
        metrics: &mut TableMetrics,
        audit: &mut AuditLog,
    ) -> Vec<Item> {
        let mut valid = Vec::with_capacity(batch.len());
        for normalized in batch {
            let check = self.check(&normalized.item);
            if check.missing_id {
                metrics.missing_id += 1;
            }
            if check.missing_pk {
                metrics.missing_pk += 1;
            }
            if check.is_valid() {
                valid.push(normalized.item);
                continue;
            }

            let ident = normalized
                .item
                .get(self.id_field)
                .and_then(value_text)
                .unwrap_or_else(|| "<no-id>".to_string());
            metrics.push_error(format!("{}:{}:invalid:{}", self.table, ident, INVALID_REASON));
            audit.mark_error(normalized.ticket, INVALID_REASON);
        }
        valid
    }
}
