//! Bucket client: whole-object reads and writes against one named bucket.
//!
//! `BucketClient` is the only component that talks to a [`StorageBackend`].
//! It adds:
//! - payload normalization (raw bytes, UTF-8 text, or JSON values)
//! - `gs://bucket/path` location identifiers
//! - bounded retry with exponential backoff for transient transport failures
//!
//! Writes are always full overwrites. Missing objects, failed preconditions
//! and credential problems are returned immediately, never retried.
//!
//! A conditional write whose reply was lost may already be applied when it is
//! retried. If the retry then fails its precondition, the object is re-read
//! and a byte-identical object counts as our own write.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;

use crate::error::{Error, Result};
use crate::storage::{ObjectData, StorageBackend, WritePrecondition, WriteResult};

/// Content type used for Parquet objects.
pub const PARQUET_CONTENT_TYPE: &str = "application/parquet";

/// Transport retry counter.
pub const TRANSPORT_RETRY: &str = "roster_transport_retry_total";

/// Data accepted by [`BucketClient::write`].
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw bytes, stored as-is.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Structured value, serialized to JSON text before writing.
    Json(serde_json::Value),
}

impl Payload {
    fn into_bytes(self) -> Result<Bytes> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::Text(s) => Ok(Bytes::from(s)),
            Self::Json(v) => serde_json::to_vec(&v)
                .map(Bytes::from)
                .map_err(|e| Error::Serialization {
                    message: format!("failed to serialize payload: {e}"),
                }),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Retry policy for transient transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after each attempt.
    pub base_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Default number of attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Sets the number of attempts (at least one).
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    /// Sets the base backoff.
    #[must_use]
    pub const fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Client for whole objects in one bucket.
#[derive(Clone)]
pub struct BucketClient {
    backend: Arc<dyn StorageBackend>,
    bucket: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for BucketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketClient")
            .field("bucket", &self.bucket)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BucketClient {
    /// Creates a client for `bucket` over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, bucket: impl Into<String>) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the transport retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the location identifier for `path`.
    #[must_use]
    pub fn location(&self, path: &str) -> String {
        format!("gs://{}/{path}", self.bucket)
    }

    /// Returns whether an object exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be reached.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let meta = self
            .with_retry("head", path, || self.backend.head(path))
            .await?;
        Ok(meta.is_some())
    }

    /// Reads the object at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the object does not exist.
    pub async fn read(&self, path: &str) -> Result<Bytes> {
        Ok(self.read_versioned(path).await?.data)
    }

    /// Reads the object at `path` together with its version token.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the object does not exist.
    pub async fn read_versioned(&self, path: &str) -> Result<ObjectData> {
        let object = self
            .with_retry("get", path, || self.backend.get(path))
            .await?;
        tracing::debug!(
            path,
            size = object.data.len(),
            version = %object.version,
            "read object"
        );
        Ok(object)
    }

    /// Overwrites the object at `path` and returns its location identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the upload fails.
    pub async fn write(
        &self,
        payload: impl Into<Payload>,
        path: &str,
        content_type: &str,
    ) -> Result<String> {
        match self
            .write_if(payload, path, content_type, WritePrecondition::None)
            .await?
        {
            WriteResult::Success { .. } => Ok(self.location(path)),
            WriteResult::PreconditionFailed { current_version } => Err(Error::Internal {
                message: format!(
                    "unconditional write to {path} reported a precondition failure (version {current_version})"
                ),
            }),
        }
    }

    /// Overwrites the object at `path` if `precondition` holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the upload fails.
    /// A failed precondition is reported through the returned [`WriteResult`],
    /// unless an earlier attempt of this call was applied after all.
    pub async fn write_if(
        &self,
        payload: impl Into<Payload>,
        path: &str,
        content_type: &str,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let data = payload.into().into_bytes()?;
        let size = data.len();
        let attempts = AtomicU32::new(0);
        let mut result = self
            .with_retry("put", path, || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.backend
                    .put(path, data.clone(), content_type, precondition.clone())
            })
            .await?;
        if let WriteResult::PreconditionFailed { .. } = &result {
            let retried = attempts.load(Ordering::Relaxed) > 1;
            if retried && precondition != WritePrecondition::None {
                if let Some(version) = self.applied_version(path, &data).await? {
                    tracing::info!(
                        path,
                        version = %version,
                        "retried write was already applied"
                    );
                    result = WriteResult::Success { version };
                }
            }
        }
        match &result {
            WriteResult::Success { version } => {
                tracing::info!(
                    location = %self.location(path),
                    size,
                    version = %version,
                    "stored object"
                );
            }
            WriteResult::PreconditionFailed { current_version } => {
                tracing::debug!(
                    path,
                    current_version = %current_version,
                    "write precondition failed"
                );
            }
        }
        Ok(result)
    }

    /// Deletes the object at `path`.
    ///
    /// Returns `false` (not an error) when there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be reached.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        if !self.exists(path).await? {
            tracing::warn!(path, "delete skipped, object not found");
            return Ok(false);
        }
        self.with_retry("delete", path, || self.backend.delete(path))
            .await?;
        tracing::info!(path, "deleted object");
        Ok(true)
    }

    /// Returns the object's version if it holds exactly `data`.
    async fn applied_version(&self, path: &str, data: &Bytes) -> Result<Option<String>> {
        match self.with_retry("get", path, || self.backend.get(path)).await {
            Ok(object) if object.data == *data => Ok(Some(object.version)),
            Ok(_) | Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, path: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        let mut backoff = self.retry.base_backoff;
        loop {
            match f().await {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        op,
                        path,
                        attempt,
                        error = %e,
                        "transient storage failure, retrying"
                    );
                    counter!(TRANSPORT_RETRY, "operation" => op).increment(1);
                    tokio::time::sleep(backoff.min(self.retry.max_backoff)).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
