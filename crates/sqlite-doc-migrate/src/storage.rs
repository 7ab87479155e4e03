//! Object storage access for the snapshot download and the audit upload.
//!
//! Backends come from the `object_store` crate. Credentials are read from
//! `AZURE_*`, `AWS_*` and `GOOGLE_*` environment variables by the backend
//! builders; nothing here acquires tokens itself.

use crate::config::redact_url;
use crate::error::{MigrateError, Result};
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const CREDENTIAL_PREFIXES: [&str; 3] = ["azure_", "aws_", "google_"];

/// A single object in some store.
#[derive(Clone)]
pub struct ObjectLocation {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    display: String,
}

impl ObjectLocation {
    /// Wrap an existing store and path.
    pub fn new(store: Arc<dyn ObjectStore>, path: ObjectPath) -> Self {
        let display = format!("{}/{}", store, path);
        Self {
            store,
            path,
            display,
        }
    }

    /// Resolve a URL such as `az://ingest/tankmates.db` or
    /// `file:///tmp/etl_log.csv` to a store and object path.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| MigrateError::Config(format!("invalid object URL {}: {}", redact_url(url), e)))?;

        let options = std::env::vars()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .filter(|(k, _)| CREDENTIAL_PREFIXES.iter().any(|p| k.starts_with(p)));
        let (store, path) = object_store::parse_url_opts(&parsed, options)?;

        Ok(Self {
            store: Arc::from(store),
            path,
            display: redact_url(url),
        })
    }

    /// Object path within the store.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Download the object to a local file, creating parent directories.
    /// Returns the number of bytes written.
    pub async fn download_to(&self, dest: &Path) -> Result<usize> {
        debug!("Downloading {} to {}", self, dest.display());
        let bytes: Bytes = self.store.get(&self.path).await?.bytes().await?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;

        info!("Downloaded {} bytes from {}", bytes.len(), self);
        Ok(bytes.len())
    }

    /// Upload a local file, overwriting the object. Returns the number of
    /// bytes written.
    pub async fn upload_file(&self, src: &Path) -> Result<usize> {
        let data = Bytes::from(tokio::fs::read(src).await?);
        let len = data.len();
        self.store.put(&self.path, PutPayload::from_bytes(data)).await?;

        info!("Uploaded {} bytes to {}", len, self);
        Ok(len)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl fmt::Debug for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectLocation")
            .field("location", &self.display)
            .finish()
    }
}
