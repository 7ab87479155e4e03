//! SQLite snapshot source.
//!
//! Each call to [`RowSource::stream`] starts a fresh scan of one table. A
//! reader task walks a single cursor and hands batches to the consumer over
//! a bounded channel, so at most one batch is read ahead of the pipeline.

mod types;

pub use types::*;

use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde_json::{Number, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Lazy sequence of row batches for one table.
pub type BatchStream = BoxStream<'static, Result<Vec<Row>>>;

/// Trait for source snapshot operations.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Stream a table's rows in batches of at most `batch_size`.
    ///
    /// Batches are non-overlapping and follow the scan order of a single
    /// cursor. A query failure is yielded as the stream's last element.
    fn stream(&self, table: &str, batch_size: usize) -> BatchStream;

    /// Check whether a table (or view) exists in the snapshot.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Close all connections.
    async fn close(&self);
}

/// Read-only SQLite snapshot with a small connection pool.
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    /// Open a snapshot file read-only.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MigrateError::Snapshot(format!(
                "snapshot file not found: {}",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").execute(&pool).await?;

        info!("Opened SQLite snapshot {}", path.display());
        Ok(Self { pool })
    }
}

#[async_trait]
impl RowSource for SqliteSource {
    fn stream(&self, table: &str, batch_size: usize) -> BatchStream {
        let (tx, rx) = mpsc::channel::<Result<Vec<Row>>>(1);
        let pool = self.pool.clone();
        let table = table.to_string();
        let batch_size = batch_size.max(1);

        tokio::spawn(async move {
            if let Err(e) = read_batches(&pool, &table, batch_size, &tx).await {
                // Receiver may already be gone; nothing left to report to.
                let _ = tx.send(Err(e)).await;
            }
        });

        ReceiverStream::new(rx).boxed()
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", quote_sqlite_ident(table));
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Walk one cursor over `table`, sending full batches as they fill.
async fn read_batches(
    pool: &SqlitePool,
    table: &str,
    batch_size: usize,
    tx: &mpsc::Sender<Result<Vec<Row>>>,
) -> Result<()> {
    let query = format!("SELECT * FROM {}", quote_sqlite_ident(table));
    let mut rows = sqlx::query(&query).fetch(pool);
    let mut batch = Vec::with_capacity(batch_size);
    let mut batch_num = 0usize;

    while let Some(row) = rows.try_next().await? {
        batch.push(decode_row(&row)?);
        if batch.len() == batch_size {
            batch_num += 1;
            debug!("{}: read batch {} ({} rows)", table, batch_num, batch.len());
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.send(Ok(full)).await.is_err() {
                // Consumer stopped listening
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        batch_num += 1;
        debug!("{}: read batch {} ({} rows)", table, batch_num, batch.len());
        let _ = tx.send(Ok(batch)).await;
    }
    Ok(())
}

/// Convert a SQLite row into a JSON object keyed by column name.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => Value::from(row.try_get::<i64, _>(idx)?),
            Some("REAL") => Number::from_f64(row.try_get::<f64, _>(idx)?)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Some("BLOB") => Value::String(hex::encode(row.try_get::<Vec<u8>, _>(idx)?)),
            Some(_) => Value::String(row.try_get::<String, _>(idx)?),
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Quote a SQLite identifier, escaping embedded double quotes.
///
/// Identifiers cannot be bound as statement parameters, so table names from
/// the configuration are quoted instead.
fn quote_sqlite_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
