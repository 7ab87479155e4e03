//! Filesystem-backed document store.
//!
//! Layout: `<root>/<database>/<container>/<partition>/<id>.json`, with every
//! key component percent-encoded. Each container directory carries a
//! `.container.json` marker recording its key layout.

use super::{ContainerSpec, DocumentContainer, DocumentKey, DocumentStore, UpsertError, UpsertOutcome};
use crate::error::{MigrateError, Result};
use crate::source::Item;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const MARKER_FILE: &str = ".container.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerMarker {
    id_field: String,
    partition_key_path: String,
}

/// Store rooted at a local directory.
pub struct DirectoryStore {
    root: PathBuf,
    database: String,
}

impl DirectoryStore {
    /// Open (creating if needed) the database directory under `root`.
    pub fn open<P: AsRef<Path>>(root: P, database: &str) -> Result<Self> {
        let root = root.as_ref().join(encode_component(database));
        fs::create_dir_all(&root).map_err(|e| {
            MigrateError::destination(e.to_string(), format!("{}", root.display()))
        })?;
        Ok(Self {
            root,
            database: database.to_string(),
        })
    }

    /// Directory holding the database's containers.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentStore for DirectoryStore {
    fn database(&self) -> &str {
        &self.database
    }

    fn container(&self, spec: &ContainerSpec) -> Result<Arc<dyn DocumentContainer>> {
        let dir = self.root.join(encode_component(&spec.name));
        let marker_path = dir.join(MARKER_FILE);
        let context = format!("container {}", spec.name);

        if marker_path.exists() {
            let raw = fs::read(&marker_path)
                .map_err(|e| MigrateError::destination(e.to_string(), context.clone()))?;
            let marker: ContainerMarker = serde_json::from_slice(&raw)
                .map_err(|e| MigrateError::destination(e.to_string(), context.clone()))?;
            if marker.partition_key_path != spec.partition_key_path() {
                return Err(MigrateError::destination(
                    format!(
                        "container exists with partition key {}",
                        marker.partition_key_path
                    ),
                    context,
                ));
            }
            debug!("Using existing container {}", dir.display());
        } else {
            fs::create_dir_all(&dir)
                .map_err(|e| MigrateError::destination(e.to_string(), context.clone()))?;
            let marker = ContainerMarker {
                id_field: spec.id_field.clone(),
                partition_key_path: spec.partition_key_path(),
            };
            let body = serde_json::to_vec_pretty(&marker)?;
            write_atomic(&marker_path, &body)
                .map_err(|e| MigrateError::destination(e.to_string(), context))?;
            debug!("Created container {}", dir.display());
        }

        Ok(Arc::new(DirectoryContainer {
            spec: spec.clone(),
            dir,
        }))
    }

    fn kind(&self) -> &str {
        "directory"
    }
}

/// One container directory.
pub struct DirectoryContainer {
    spec: ContainerSpec,
    dir: PathBuf,
}

impl DirectoryContainer {
    fn document_path(&self, key: &DocumentKey) -> PathBuf {
        self.dir
            .join(encode_component(&key.partition_key))
            .join(format!("{}.json", encode_component(&key.id)))
    }
}

impl DocumentContainer for DirectoryContainer {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn upsert_item(&self, item: &Item) -> std::result::Result<UpsertOutcome, UpsertError> {
        let key = DocumentKey::from_item(item, &self.spec)?;
        let body = serde_json::to_vec(item)?;
        let path = self.document_path(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let outcome = if path.exists() {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Created
        };
        write_atomic(&path, &body)?;
        Ok(outcome)
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
        match fs::read(self.document_path(&key)) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn count(&self) -> std::result::Result<usize, UpsertError> {
        let mut total = 0;
        for partition in fs::read_dir(&self.dir)? {
            let partition = partition?;
            if !partition.file_type()?.is_dir() {
                continue;
            }
            for doc in fs::read_dir(partition.path())? {
                let doc = doc?;
                if doc.path().extension().is_some_and(|ext| ext == "json") {
                    total += 1;
                }
            }
        }
        Ok(total)
    }
}

/// Write to a sibling temp file then rename over the target.
fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(body)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        e
    })
}

/// Percent-encode a key so it is a single safe path component.
fn encode_component(raw: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(raw.as_bytes()).collect();
    if encoded.chars().all(|c| c == '.') {
        encoded.replace('.', "%2E")
    } else {
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "Fish".to_string(),
            id_field: "Id".to_string(),
            partition_key: "tenantId".to_string(),
        }
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("a1"), "a1");
        assert_eq!(encode_component("a/b"), "a%2Fb");
        assert_eq!(encode_component(".."), "%2E%2E");
        assert_eq!(encode_component("x.y"), "x.y");
    }

    #[test]
    fn test_upsert_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path(), "tankmates").unwrap();
        let container = store.container(&spec()).unwrap();

        let item = json!({"Id": "a/1", "tenantId": "t1", "IsReefSafe": true});
        let item = item.as_object().unwrap();
        assert_eq!(container.upsert_item(item), Ok(UpsertOutcome::Created));

        let back = container.read_item("a/1", "t1").unwrap().unwrap();
        assert_eq!(&back, item);
        assert_eq!(container.read_item("a/1", "t2").unwrap(), None);
        assert!(dir.path().join("tankmates").join("Fish").join(MARKER_FILE).exists());
    }

    #[test]
    fn test_repeated_upsert_keeps_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path(), "tankmates").unwrap();
        let container = store.container(&spec()).unwrap();

        let first = json!({"Id": "a1", "tenantId": "t1", "Name": "Tetra"});
        let second = json!({"Id": "a1", "tenantId": "t1", "Name": "Neon Tetra"});
        container.upsert_item(first.as_object().unwrap()).unwrap();
        assert_eq!(
            container.upsert_item(second.as_object().unwrap()),
            Ok(UpsertOutcome::Replaced)
        );
        assert_eq!(container.count(), Ok(1));
        assert_eq!(
            container.read_item("a1", "t1").unwrap().unwrap()["Name"],
            json!("Neon Tetra")
        );
    }

    #[test]
    fn test_reopen_existing_container() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DirectoryStore::open(dir.path(), "tankmates").unwrap();
            let container = store.container(&spec()).unwrap();
            container
                .upsert_item(json!({"Id": "a1", "tenantId": "t1"}).as_object().unwrap())
                .unwrap();
        }
        let store = DirectoryStore::open(dir.path(), "tankmates").unwrap();
        let container = store.container(&spec()).unwrap();
        assert_eq!(container.count(), Ok(1));
    }

    #[test]
    fn test_partition_key_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path(), "tankmates").unwrap();
        store.container(&spec()).unwrap();

        let other = ContainerSpec {
            partition_key: "region".to_string(),
            ..spec()
        };
        let err = store.container(&other).err().unwrap();
        assert_eq!(err.exit_code(), 4);
    }
}
