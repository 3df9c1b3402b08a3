//! Test storage implementation with operation tracing.
//!
//! Provides an in-memory backend that records every operation and can inject
//! failures, transient outages and competing writers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use roster_core::error::{Error, Result};
use roster_core::storage::{
    ObjectData, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone)]
pub enum StorageOp {
    /// Get operation.
    Get {
        /// Path that was read.
        path: String,
    },
    /// Head operation (metadata only).
    Head {
        /// Path that was checked.
        path: String,
    },
    /// Put operation.
    Put {
        /// Path that was written.
        path: String,
        /// Size of data written.
        size: usize,
        /// Content type sent with the write.
        content_type: String,
        /// Precondition used.
        precondition: WritePrecondition,
    },
    /// Delete operation.
    Delete {
        /// Path that was deleted.
        path: String,
    },
}

/// In-memory storage backend with operation tracing.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    data: Arc<Mutex<HashMap<String, StoredObject>>>,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    fail_reads: Arc<Mutex<Vec<String>>>,
    fail_writes: Arc<Mutex<Vec<String>>>,
    transient_failures: Arc<Mutex<u32>>,
    competing_writes: Arc<Mutex<HashMap<String, Bytes>>>,
    lost_put_replies: Arc<Mutex<u32>>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage with simulated latency on every operation.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Seeds an object directly, bypassing operation recording.
    pub fn seed(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        let mut store = self.data.lock().expect("lock");
        let path = path.into();
        let version = store.get(&path).map_or(1, |o| o.version + 1);
        store.insert(
            path,
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
                version,
                last_modified: Utc::now(),
            },
        );
    }

    /// Returns the stored bytes for `path`, bypassing operation recording.
    #[must_use]
    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.data.lock().expect("lock").get(path).map(|o| o.data.clone())
    }

    /// Returns the content type recorded for `path`.
    #[must_use]
    pub fn content_type(&self, path: &str) -> Option<String> {
        self.data
            .lock()
            .expect("lock")
            .get(path)
            .map(|o| o.content_type.clone())
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StorageOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns the number of put operations that reached the backend.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StorageOp::Put { .. }))
            .count()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Fails every read whose path starts with `prefix`.
    pub fn inject_read_failure(&self, prefix: impl Into<String>) {
        self.fail_reads.lock().expect("lock").push(prefix.into());
    }

    /// Fails every write whose path starts with `prefix`.
    pub fn inject_write_failure(&self, prefix: impl Into<String>) {
        self.fail_writes.lock().expect("lock").push(prefix.into());
    }

    /// Makes the next `count` operations fail with a transient storage error.
    pub fn fail_next(&self, count: u32) {
        *self.transient_failures.lock().expect("lock") = count;
    }

    /// Applies `data` to `path` immediately before the next put to `path`,
    /// as if another process had won the race.
    pub fn interleave_write_before_next_put(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.competing_writes
            .lock()
            .expect("lock")
            .insert(path.into(), data.into());
    }

    /// Applies the next `count` successful puts but reports each as a
    /// transient failure, as if the reply had been lost in transit.
    pub fn lose_next_put_replies(&self, count: u32) {
        *self.lost_put_replies.lock().expect("lock") = count;
    }

    /// Returns the current version for a path (for CAS testing).
    #[must_use]
    pub fn version(&self, path: &str) -> Option<String> {
        self.data
            .lock()
            .expect("lock")
            .get(path)
            .map(|o| o.version.to_string())
    }

    fn record(&self, op: StorageOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_transient(&self) -> Result<()> {
        let mut remaining = self.transient_failures.lock().expect("lock");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(Error::storage("injected transient failure"));
        }
        Ok(())
    }

    fn check_failure(list: &Mutex<Vec<String>>, path: &str) -> Result<()> {
        if list.lock().expect("lock").iter().any(|p| path.starts_with(p)) {
            return Err(Error::storage(format!("injected failure for path: {path}")));
        }
        Ok(())
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn get(&self, path: &str) -> Result<ObjectData> {
        self.maybe_delay().await;
        self.check_transient()?;
        Self::check_failure(&self.fail_reads, path)?;
        self.record(StorageOp::Get {
            path: path.to_string(),
        });

        let data = self.data.lock().expect("lock");
        data.get(path)
            .map(|o| ObjectData {
                data: o.data.clone(),
                version: o.version.to_string(),
            })
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.maybe_delay().await;
        self.check_transient()?;
        Self::check_failure(&self.fail_reads, path)?;
        self.record(StorageOp::Head {
            path: path.to_string(),
        });

        let data = self.data.lock().expect("lock");
        Ok(data.get(path).map(|o| ObjectMeta {
            path: path.to_string(),
            size: o.data.len() as u64,
            version: o.version.to_string(),
            content_type: Some(o.content_type.clone()),
            last_modified: Some(o.last_modified),
        }))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        self.maybe_delay().await;
        self.check_transient()?;
        Self::check_failure(&self.fail_writes, path)?;
        self.record(StorageOp::Put {
            path: path.to_string(),
            size: data.len(),
            content_type: content_type.to_string(),
            precondition: precondition.clone(),
        });

        if let Some(competing) = self.competing_writes.lock().expect("lock").remove(path) {
            self.seed(path, competing);
        }

        let mut store = self.data.lock().expect("lock");
        let existing = store.get(path);

        match &precondition {
            WritePrecondition::None => {}
            WritePrecondition::DoesNotExist => {
                if let Some(obj) = existing {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: obj.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => {
                let expected_num: i64 = expected.parse().unwrap_or(-1);
                match existing {
                    Some(obj) if obj.version != expected_num => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: obj.version.to_string(),
                        });
                    }
                    None => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: "0".to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }

        let new_version = existing.map_or(1, |o| o.version + 1);

        store.insert(
            path.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                version: new_version,
                last_modified: Utc::now(),
            },
        );
        drop(store);

        let mut lost = self.lost_put_replies.lock().expect("lock");
        if *lost > 0 {
            *lost -= 1;
            return Err(Error::storage("injected lost reply after applied write"));
        }

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.maybe_delay().await;
        self.check_transient()?;
        Self::check_failure(&self.fail_writes, path)?;
        self.record(StorageOp::Delete {
            path: path.to_string(),
        });

        self.data.lock().expect("lock").remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::bucket::{BucketClient, RetryPolicy};

    const CT: &str = "application/parquet";

    #[tokio::test]
    async fn tracing_storage_records_operations() {
        let storage = TracingMemoryBackend::new();

        storage
            .put("test.txt", Bytes::from("hello"), CT, WritePrecondition::None)
            .await
            .expect("put");
        let _ = storage.get("test.txt").await;
        let _ = storage.head("test.txt").await;

        let ops = storage.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], StorageOp::Put { .. }));
        assert!(matches!(ops[1], StorageOp::Get { .. }));
        assert!(matches!(ops[2], StorageOp::Head { .. }));
        assert_eq!(storage.put_count(), 1);
        assert_eq!(storage.content_type("test.txt").as_deref(), Some(CT));
    }

    #[tokio::test]
    async fn tracing_storage_failure_injection() {
        let storage = TracingMemoryBackend::new();
        storage.inject_read_failure("fail/");

        assert!(storage.get("fail/test.txt").await.is_err());

        storage
            .put("ok/test.txt", Bytes::from("data"), CT, WritePrecondition::None)
            .await
            .expect("put");
        assert!(storage.get("ok/test.txt").await.is_ok());

        storage.inject_write_failure("ok/");
        assert!(
            storage
                .put("ok/test.txt", Bytes::from("x"), CT, WritePrecondition::None)
                .await
                .is_err()
        );
        assert_eq!(storage.put_count(), 1);
    }

    #[tokio::test]
    async fn competing_write_breaks_version_precondition() {
        let storage = TracingMemoryBackend::new();
        storage.seed("obj", Bytes::from("v1"));
        storage.interleave_write_before_next_put("obj", Bytes::from("theirs"));

        let result = storage
            .put(
                "obj",
                Bytes::from("ours"),
                CT,
                WritePrecondition::MatchesVersion("1".into()),
            )
            .await
            .expect("put");
        assert!(matches!(result, WriteResult::PreconditionFailed { ref current_version } if current_version == "2"));
        assert_eq!(storage.object("obj"), Some(Bytes::from("theirs")));
    }

    #[tokio::test]
    async fn bucket_client_retries_transient_failures() {
        let storage = TracingMemoryBackend::new();
        storage.seed("obj", Bytes::from("v1"));
        storage.fail_next(2);

        let client = BucketClient::new(Arc::new(storage.clone()), "test")
            .with_retry_policy(RetryPolicy::default().with_base_backoff(Duration::ZERO));
        let data = client.read("obj").await.expect("third attempt succeeds");
        assert_eq!(data, Bytes::from("v1"));
    }

    #[tokio::test]
    async fn bucket_client_gives_up_after_max_attempts() {
        let storage = TracingMemoryBackend::new();
        storage.seed("obj", Bytes::from("v1"));
        storage.fail_next(5);

        let client = BucketClient::new(Arc::new(storage.clone()), "test")
            .with_retry_policy(RetryPolicy::default().with_base_backoff(Duration::ZERO));
        let err = client.read("obj").await.expect_err("budget exhausted");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn lost_reply_still_applies_the_write() {
        let storage = TracingMemoryBackend::new();
        storage.lose_next_put_replies(1);

        let err = storage
            .put("obj", Bytes::from("mine"), CT, WritePrecondition::DoesNotExist)
            .await
            .expect_err("reply lost");
        assert!(err.is_transient());
        assert_eq!(storage.object("obj"), Some(Bytes::from("mine")));

        let client = BucketClient::new(Arc::new(storage.clone()), "test")
            .with_retry_policy(RetryPolicy::default().with_base_backoff(Duration::ZERO));
        storage.lose_next_put_replies(1);
        let version = storage.version("obj").expect("version");
        let result = client
            .write_if("again", "obj", CT, WritePrecondition::MatchesVersion(version))
            .await
            .expect("write");
        assert!(matches!(result, WriteResult::Success { .. }));
        assert_eq!(storage.object("obj"), Some(Bytes::from("again")));
    }

    #[tokio::test]
    async fn bucket_client_does_not_retry_not_found() {
        let storage = TracingMemoryBackend::new();
        let client = BucketClient::new(Arc::new(storage.clone()), "test")
            .with_retry_policy(RetryPolicy::default().with_base_backoff(Duration::ZERO));

        let err = client.read("absent").await.expect_err("missing");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(storage.operations().len(), 1);
    }
}
