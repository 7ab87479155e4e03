//! Configuration type definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder tenant used when neither the row nor the config carries one.
pub const NIL_TENANT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Destination database name.
    pub database: String,

    /// Per-table settings keyed by source table name, in the order tables
    /// are migrated. The destination container carries the same name as
    /// the table.
    pub containers: IndexMap<String, TableConfig>,

    /// Rows per source batch (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent upsert workers per batch (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Tenant injected into rows that lack one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Name of the tenant field (default: "tenantId").
    #[serde(default = "default_tenant_field")]
    pub tenant_field: String,

    /// Source snapshot location.
    #[serde(default)]
    pub source: SourceConfig,

    /// Destination document store.
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// The tenant injected when a row has none.
    pub fn tenant_default(&self) -> &str {
        self.tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NIL_TENANT_ID)
    }

    /// Partition-key field for a table, falling back to the tenant field.
    pub fn pk_field<'a>(&'a self, table: &'a TableConfig) -> &'a str {
        table.pk_field.as_deref().unwrap_or(&self.tenant_field)
    }
}

/// Per-table settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Identity field (default: "Id").
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Partition-key field. Defaults to the tenant field when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk_field: Option<String>,

    /// Fields coerced through the boolean parser.
    #[serde(default)]
    pub bool_fields: Vec<String>,

    /// Epoch fields that gain an ISO-8601 sibling.
    #[serde(default)]
    pub date_fields: Vec<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            pk_field: None,
            bool_fields: Vec::new(),
            date_fields: Vec::new(),
        }
    }
}

/// Source snapshot configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Local path of the SQLite snapshot (default: "data.db").
    #[serde(default = "default_source_path")]
    pub path: String,

    /// Object-store URL to download the snapshot from before the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            snapshot_url: None,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("path", &self.path)
            .field("snapshot_url", &self.snapshot_url.as_deref().map(redact_url))
            .finish()
    }
}

/// Destination store selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Process-local store; documents vanish at exit.
    Memory,

    /// One JSON file per document under `path/<database>/<container>/`.
    Directory { path: String },
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig::Directory {
            path: "documents".to_string(),
        }
    }
}

/// Audit log configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Local CSV path (default: "etl_log.csv").
    #[serde(default = "default_audit_path")]
    pub path: String,

    /// Object-store URL the CSV is uploaded to after the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_url: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            export_url: None,
        }
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field("path", &self.path)
            .field("export_url", &self.export_url.as_deref().map(redact_url))
            .finish()
    }
}

/// Strip the query string, which may carry a SAS token or signature.
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?[REDACTED]", base),
        None => url.to_string(),
    }
}

// Default value functions for serde
fn default_batch_size() -> usize {
    500
}

fn default_concurrency() -> usize {
    4
}

fn default_tenant_field() -> String {
    "tenantId".to_string()
}

fn default_id_field() -> String {
    "Id".to_string()
}

fn default_source_path() -> String {
    "data.db".to_string()
}

fn default_audit_path() -> String {
    "etl_log.csv".to_string()
}
