//! Parallel upsert of validated items into a destination container.
//!
//! A batch is cut into contiguous chunks, one per worker. Each worker writes
//! its chunk on a blocking thread and collects its own counts; the call
//! returns only after every worker has been joined. Per-item failures are
//! data, never errors: the batch always completes. A panic inside one
//! item's write is caught and counted against that item alone.

use crate::source::{value_text, Item};
use crate::target::DocumentContainer;
use futures::future::join_all;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Error strings kept per batch. Counters stay exact past this.
pub const MAX_BATCH_ERROR_SAMPLES: usize = 200;

/// Longest store reason carried into an error sample, in characters.
pub const MAX_REASON_CHARS: usize = 140;

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Items the store accepted.
    pub ok_count: u64,

    /// Items the store refused, or that were lost with a failed worker.
    pub err_count: u64,

    /// Bounded sample of `container:id:upsert:reason` strings.
    pub error_samples: Vec<String>,
}

impl BatchResult {
    /// Total items attempted.
    pub fn attempted(&self) -> u64 {
        self.ok_count + self.err_count
    }

    fn merge(&mut self, other: BatchResult) {
        self.ok_count += other.ok_count;
        self.err_count += other.err_count;
        let room = MAX_BATCH_ERROR_SAMPLES.saturating_sub(self.error_samples.len());
        self.error_samples
            .extend(other.error_samples.into_iter().take(room));
    }

    fn push_error(&mut self, sample: String) {
        self.err_count += 1;
        if self.error_samples.len() < MAX_BATCH_ERROR_SAMPLES {
            self.error_samples.push(sample);
        }
    }
}

/// Writes item batches with a fixed worker count.
pub struct UpsertSink {
    concurrency: usize,
}

impl UpsertSink {
    /// Create a sink. A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Worker count per batch.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Upsert every item, returning exact counts and a bounded error sample.
    pub async fn upsert(
        &self,
        container: Arc<dyn DocumentContainer>,
        id_field: &str,
        items: Vec<Item>,
    ) -> BatchResult {
        if items.is_empty() {
            return BatchResult::default();
        }

        let start = Instant::now();
        let total = items.len();
        let chunk_size = total.div_ceil(self.concurrency);
        let chunks = split_chunks(items, chunk_size);
        let num_workers = chunks.len();

        let mut sizes = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);
        for chunk in chunks {
            sizes.push(chunk.len() as u64);
            let container = container.clone();
            let id_field = id_field.to_string();
            handles.push(tokio::task::spawn_blocking(move || {
                upsert_chunk(container.as_ref(), &id_field, &chunk)
            }));
        }

        let mut result = BatchResult::default();
        for (worker_id, (joined, size)) in join_all(handles).await.into_iter().zip(sizes).enumerate()
        {
            match joined {
                Ok(chunk_result) => result.merge(chunk_result),
                Err(e) => {
                    warn!(
                        "{}: upsert worker {} failed, counting {} items as errors: {}",
                        container.name(),
                        worker_id,
                        size,
                        e
                    );
                    result.err_count += size;
                    if result.error_samples.len() < MAX_BATCH_ERROR_SAMPLES {
                        result.error_samples.push(format!(
                            "{}:<worker-{}>:upsert:{}",
                            container.name(),
                            worker_id,
                            truncate_reason(&e.to_string())
                        ));
                    }
                }
            }
        }

        debug!(
            "{}: upserted {} items with {} workers in {:?} (ok: {}, err: {})",
            container.name(),
            total,
            num_workers,
            start.elapsed(),
            result.ok_count,
            result.err_count
        );
        result
    }
}

/// Cut `items` into contiguous chunks of at most `chunk_size`, preserving order.
fn split_chunks(items: Vec<Item>, chunk_size: usize) -> Vec<Vec<Item>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut current = Vec::with_capacity(chunk_size);
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(chunk_size),
            ));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn upsert_chunk(container: &dyn DocumentContainer, id_field: &str, chunk: &[Item]) -> BatchResult {
    let mut result = BatchResult::default();
    for item in chunk {
        let reason = match catch_unwind(AssertUnwindSafe(|| container.upsert_item(item))) {
            Ok(Ok(_)) => {
                result.ok_count += 1;
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
        };
        let id = item
            .get(id_field)
            .and_then(value_text)
            .unwrap_or_default();
        result.push_error(format!(
            "{}:{}:upsert:{}",
            container.name(),
            id,
            truncate_reason(&reason)
        ));
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{ContainerSpec, DocumentStore, MemoryStore, UpsertError, UpsertOutcome};
    use serde_json::json;

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| {
                json!({"Id": i.to_string(), "tenantId": "t1"})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    fn memory_container() -> Arc<dyn DocumentContainer> {
        MemoryStore::new("tankmates")
            .container(&ContainerSpec {
                name: "Fish".to_string(),
                id_field: "Id".to_string(),
                partition_key: "tenantId".to_string(),
            })
            .unwrap()
    }

    /// Rejects every item whose Id is an odd number.
    struct OddRejecting;

    impl DocumentContainer for OddRejecting {
        fn name(&self) -> &str {
            "Odd"
        }

        fn upsert_item(&self, item: &Item) -> std::result::Result<UpsertOutcome, UpsertError> {
            let id: u64 = item["Id"].as_str().unwrap().parse().unwrap();
            if id % 2 == 1 {
                Err(UpsertError::Rejected("x".repeat(500)))
            } else {
                Ok(UpsertOutcome::Created)
            }
        }

        fn read_item(
            &self,
            _id: &str,
            _partition_key: &str,
        ) -> std::result::Result<Option<Item>, UpsertError> {
            Ok(None)
        }

        fn count(&self) -> std::result::Result<usize, UpsertError> {
            Ok(0)
        }
    }

    /// Panics on Id "0", records every other Id it accepts.
    #[derive(Default)]
    struct Exploding {
        written: parking_lot::Mutex<Vec<String>>,
    }

    impl DocumentContainer for Exploding {
        fn name(&self) -> &str {
            "Boom"
        }

        fn upsert_item(&self, item: &Item) -> std::result::Result<UpsertOutcome, UpsertError> {
            let id = item["Id"].as_str().unwrap().to_string();
            if id == "0" {
                panic!("store client crashed");
            }
            self.written.lock().push(id);
            Ok(UpsertOutcome::Created)
        }

        fn read_item(
            &self,
            _id: &str,
            _partition_key: &str,
        ) -> std::result::Result<Option<Item>, UpsertError> {
            Ok(None)
        }

        fn count(&self) -> std::result::Result<usize, UpsertError> {
            Ok(0)
        }
    }

    #[test]
    fn test_split_chunks_contiguous() {
        let chunks = split_chunks(items(10), 10usize.div_ceil(4));
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(chunks[1][0]["Id"], json!("3"));
    }

    #[test]
    fn test_split_chunks_fewer_items_than_workers() {
        let chunks = split_chunks(items(2), 2usize.div_ceil(8));
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let sink = UpsertSink::new(4);
        let result = sink.upsert(memory_container(), "Id", Vec::new()).await;
        assert_eq!(result, BatchResult::default());
    }

    #[tokio::test]
    async fn test_all_items_written() {
        let sink = UpsertSink::new(4);
        let container = memory_container();
        let result = sink.upsert(container.clone(), "Id", items(101)).await;
        assert_eq!(result.ok_count, 101);
        assert_eq!(result.err_count, 0);
        assert_eq!(container.count(), Ok(101));
    }

    #[tokio::test]
    async fn test_rejections_continue_and_are_sampled() {
        let sink = UpsertSink::new(3);
        let result = sink.upsert(Arc::new(OddRejecting), "Id", items(1000)).await;
        assert_eq!(result.attempted(), 1000);
        assert_eq!(result.ok_count, 500);
        assert_eq!(result.err_count, 500);
        assert_eq!(result.error_samples.len(), MAX_BATCH_ERROR_SAMPLES);

        let sample = &result.error_samples[0];
        assert!(sample.starts_with("Odd:1:upsert:rejected: "), "{}", sample);
        let reason = sample.splitn(4, ':').nth(3).unwrap();
        assert_eq!(reason.chars().count(), MAX_REASON_CHARS);
    }

    #[tokio::test]
    async fn test_panic_fails_only_its_item() {
        let sink = UpsertSink::new(1);
        let container = Arc::new(Exploding::default());
        let result = sink.upsert(container.clone(), "Id", items(5)).await;
        assert_eq!(result.attempted(), 5);
        assert_eq!(result.ok_count, 4);
        assert_eq!(result.err_count, 1);
        assert_eq!(
            result.error_samples,
            vec!["Boom:0:upsert:panic: store client crashed"]
        );
        assert_eq!(*container.written.lock(), vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_panic_does_not_affect_other_workers() {
        let sink = UpsertSink::new(2);
        let container = Arc::new(Exploding::default());
        let result = sink.upsert(container.clone(), "Id", items(10)).await;
        assert_eq!(result.ok_count, 9);
        assert_eq!(result.err_count, 1);
        assert_eq!(container.written.lock().len(), 9);
    }
}
