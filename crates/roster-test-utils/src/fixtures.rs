//! Pre-built test environment.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use roster_core::bucket::{BucketClient, RetryPolicy};

use crate::storage::TracingMemoryBackend;

/// Bucket name used by test contexts.
pub const TEST_BUCKET: &str = "roster-test";

/// Object path used by test contexts.
pub const TEST_PROFILE_PATH: &str = "profiles/contributors.parquet";

/// Test context with traced storage and an isolated scratch directory.
pub struct TestContext {
    /// Shared storage backend.
    pub storage: Arc<TracingMemoryBackend>,
    /// Bucket client over `storage`, retrying without backoff.
    pub bucket: BucketClient,
    scratch: tempfile::TempDir,
}

impl TestContext {
    /// Creates a new test context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(TracingMemoryBackend::new())
    }

    /// Creates a context over an existing backend.
    #[must_use]
    pub fn with_storage(storage: TracingMemoryBackend) -> Self {
        let storage = Arc::new(storage);
        let bucket = BucketClient::new(storage.clone(), TEST_BUCKET)
            .with_retry_policy(RetryPolicy::default().with_base_backoff(Duration::ZERO));
        Self {
            storage,
            bucket,
            scratch: tempfile::tempdir().expect("scratch dir"),
        }
    }

    /// Returns the scratch directory for temporary copies.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Returns the names of files left in the scratch directory.
    #[must_use]
    pub fn scratch_files(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch.path())
            .expect("read scratch dir")
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    /// Asserts that no temporary copies were left behind.
    pub fn assert_scratch_empty(&self) {
        let files = self.scratch_files();
        assert!(files.is_empty(), "scratch dir not empty: {files:?}");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
