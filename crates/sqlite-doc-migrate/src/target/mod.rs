//! Destination document store.
//!
//! The store is reached through two narrow traits. Writes are blocking: the
//! transfer stage runs them on blocking worker threads. Every upsert is keyed
//! by identity plus partition key, so repeating a write replaces the same
//! document instead of creating a second one.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::config::{Config, DestinationConfig};
use crate::error::Result;
use crate::source::{non_blank_field, Item};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Container identity and key layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,

    /// Field holding the document identity.
    pub id_field: String,

    /// Field holding the partition key.
    pub partition_key: String,
}

impl ContainerSpec {
    /// Partition key path in document-store notation (`/tenantId`).
    pub fn partition_key_path(&self) -> String {
        format!("/{}", self.partition_key)
    }
}

/// Trait for destination store operations.
pub trait DocumentStore: Send + Sync {
    /// Database name the containers live in.
    fn database(&self) -> &str;

    /// Get a container, creating it if it does not exist.
    fn container(&self, spec: &ContainerSpec) -> Result<Arc<dyn DocumentContainer>>;

    /// Store kind for logs.
    fn kind(&self) -> &str;
}

/// Trait for a single container.
pub trait DocumentContainer: Send + Sync {
    /// Container name.
    fn name(&self) -> &str;

    /// Create or replace the document with the item's identity and
    /// partition key.
    fn upsert_item(&self, item: &Item) -> std::result::Result<UpsertOutcome, UpsertError>;

    /// Read a document back by key.
    fn read_item(
        &self,
        id: &str,
        partition_key: &str,
    ) -> std::result::Result<Option<Item>, UpsertError>;

    /// Number of documents in the container.
    fn count(&self) -> std::result::Result<usize, UpsertError>;
}

/// What an accepted upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// Why a single write was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpsertError {
    /// Identity or partition key absent or blank.
    #[error("missing key field {0}")]
    MissingKey(String),

    /// The store refused the document.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Storage I/O failed.
    #[error("io: {0}")]
    Io(String),

    /// Document could not be encoded.
    #[error("serialization: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for UpsertError {
    fn from(e: std::io::Error) -> Self {
        UpsertError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for UpsertError {
    fn from(e: serde_json::Error) -> Self {
        UpsertError::Serialization(e.to_string())
    }
}

/// Identity and partition key of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub id: String,
    pub partition_key: String,
}

impl DocumentKey {
    /// Extract the key from an item according to the container layout.
    pub fn from_item(item: &Item, spec: &ContainerSpec) -> std::result::Result<Self, UpsertError> {
        let id = non_blank_field(item, &spec.id_field)
            .ok_or_else(|| UpsertError::MissingKey(spec.id_field.clone()))?;
        let partition_key = non_blank_field(item, &spec.partition_key)
            .ok_or_else(|| UpsertError::MissingKey(spec.partition_key.clone()))?;
        Ok(Self { id, partition_key })
    }
}

/// Build the destination store described by the configuration.
pub fn connect(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match &config.destination {
        DestinationConfig::Memory => Arc::new(MemoryStore::new(&config.database)),
        DestinationConfig::Directory { path } => {
            Arc::new(DirectoryStore::open(path, &config.database)?)
        }
    };
    info!(
        "Destination store ready: {} (database: {})",
        store.kind(),
        store.database()
    );
    Ok(store)
}
