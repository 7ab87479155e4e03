//! In-process document store.

use super::{ContainerSpec, DocumentContainer, DocumentKey, DocumentStore, UpsertError, UpsertOutcome};
use crate::error::{MigrateError, Result};
use crate::source::Item;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Store that keeps every container in memory. Used for dry runs and tests.
pub struct MemoryStore {
    database: String,
    containers: Mutex<HashMap<String, Arc<MemoryContainer>>>,
}

impl MemoryStore {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            containers: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an existing container without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryContainer>> {
        self.containers.lock().get(name).cloned()
    }
}

impl DocumentStore for MemoryStore {
    fn database(&self) -> &str {
        &self.database
    }

    fn container(&self, spec: &ContainerSpec) -> Result<Arc<dyn DocumentContainer>> {
        let mut containers = self.containers.lock();
        if let Some(existing) = containers.get(&spec.name) {
            if existing.spec.partition_key != spec.partition_key {
                return Err(MigrateError::destination(
                    format!(
                        "container exists with partition key {}",
                        existing.spec.partition_key_path()
                    ),
                    spec.name.clone(),
                ));
            }
            return Ok(existing.clone());
        }

        let container = Arc::new(MemoryContainer {
            spec: spec.clone(),
            documents: Mutex::new(HashMap::new()),
        });
        containers.insert(spec.name.clone(), container.clone());
        Ok(container)
    }

    fn kind(&self) -> &str {
        "memory"
    }
}

/// One in-memory container.
pub struct MemoryContainer {
    spec: ContainerSpec,
    documents: Mutex<HashMap<DocumentKey, Item>>,
}

impl DocumentContainer for MemoryContainer {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn upsert_item(&self, item: &Item) -> std::result::Result<UpsertOutcome, UpsertError> {
        let key = DocumentKey::from_item(item, &self.spec)?;
        match self.documents.lock().insert(key, item.clone()) {
            Some(_) => Ok(UpsertOutcome::Replaced),
            None => Ok(UpsertOutcome::Created),
        }
    }

    fn read_item(
        &self,
        id: &str,
        partition_key: &str,
    ) -> std::result::Result<Option<Item>, UpsertError> {
        let key = DocumentKey {
            id: id.to_string(),
            partition_key: partition_key.to_string(),
        };
        Ok(self.documents.lock().get(&key).cloned())
    }

    fn count(&self) -> std::result::Result<usize, UpsertError> {
        Ok(self.documents.lock().len())
    }
}
