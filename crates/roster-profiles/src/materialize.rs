//! Temporary local copies of the remote roster.
//!
//! The query engine reads local files, so each operation downloads the
//! object into the scratch directory under a unique name. A
//! [`MaterializedFile`] removes its file when released or dropped, whichever
//! comes first, so early returns and cancellation never leave copies behind.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use roster_core::BucketClient;
use ulid::Ulid;

use crate::error::{ProfileError, Result};
use crate::metrics::record_cleanup_failure;

/// Why a copy is being made; part of the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Read-only query.
    Read,
    /// Read-modify-write cycle.
    ReadWrite,
}

impl Purpose {
    /// Returns the label used in file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ReadWrite => "read-write",
        }
    }
}

/// Downloads remote objects into a scratch directory.
#[derive(Debug, Clone)]
pub struct Materializer {
    bucket: BucketClient,
    scratch_dir: PathBuf,
}

impl Materializer {
    /// Creates a materializer writing into `scratch_dir`.
    #[must_use]
    pub fn new(bucket: BucketClient, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            bucket,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Downloads `remote_path` into a new local file.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::ObjectNotFound` when the object is absent,
    /// `ProfileError::Transport`/`Credential` when the download fails, and
    /// `ProfileError::Scratch` when the local write fails.
    pub async fn materialize(&self, remote_path: &str, purpose: Purpose) -> Result<MaterializedFile> {
        let object = self
            .bucket
            .read_versioned(remote_path)
            .await
            .map_err(|err| match err {
                roster_core::Error::NotFound(_) => ProfileError::ObjectNotFound {
                    path: remote_path.to_string(),
                },
                other => other.into(),
            })?;
        self.write_local(object.data, object.version, purpose).await
    }

    async fn write_local(
        &self,
        data: Bytes,
        version: String,
        purpose: Purpose,
    ) -> Result<MaterializedFile> {
        let path = self
            .scratch_dir
            .join(format!("profiles-{}-{}.parquet", purpose.as_str(), Ulid::new()));
        let file = MaterializedFile {
            path,
            version,
            len: data.len() as u64,
            released: false,
        };

        tokio::fs::write(&file.path, &data)
            .await
            .map_err(|e| ProfileError::Scratch {
                path: file.path.clone(),
                message: format!("failed to write temporary copy: {e}"),
            })?;
        tracing::debug!(path = %file.path.display(), size = file.len, "materialized object");
        Ok(file)
    }
}

/// A temporary local copy, deleted on release or drop.
#[derive(Debug)]
pub struct MaterializedFile {
    path: PathBuf,
    version: String,
    len: u64,
    released: bool,
}

impl MaterializedFile {
    /// Returns the local path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the version token of the downloaded object.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns whether the copy is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Deletes the local copy.
    ///
    /// Failures are logged and counted, never returned.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            cleanup_failed(&self.path, &e);
        }
    }
}

impl Drop for MaterializedFile {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                cleanup_failed(&self.path, &e);
            }
        }
    }
}

fn cleanup_failed(path: &Path, err: &std::io::Error) {
    if err.kind() == std::io::ErrorKind::NotFound {
        return;
    }
    record_cleanup_failure();
    tracing::warn!(path = %path.display(), error = %err, "failed to delete temporary copy");
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{MemoryBackend, PARQUET_CONTENT_TYPE};
    use std::sync::Arc;

    async fn bucket_with(path: &str, data: &'static [u8]) -> BucketClient {
        let bucket = BucketClient::new(Arc::new(MemoryBackend::new()), "test");
        bucket
            .write(Bytes::from_static(data), path, PARQUET_CONTENT_TYPE)
            .await
            .expect("seed");
        bucket
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).expect("read dir").count()
    }

    #[tokio::test]
    async fn materialize_writes_named_copy_and_release_deletes_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = bucket_with("profiles/a.parquet", b"PAR1").await;
        let materializer = Materializer::new(bucket, dir.path());

        let file = materializer
            .materialize("profiles/a.parquet", Purpose::ReadWrite)
            .await
            .expect("materialize");
        let name = file.path().file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.starts_with("profiles-read-write-"));
        assert!(name.ends_with(".parquet"));
        assert_eq!(file.len(), 4);
        assert_eq!(file.version(), "1");
        assert_eq!(std::fs::read(file.path()).expect("read"), b"PAR1");

        file.release().await;
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn drop_deletes_unreleased_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = bucket_with("profiles/a.parquet", b"PAR1").await;
        let materializer = Materializer::new(bucket, dir.path());

        {
            let file = materializer
                .materialize("profiles/a.parquet", Purpose::Read)
                .await
                .expect("materialize");
            assert!(file.path().exists());
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn concurrent_copies_get_distinct_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = bucket_with("profiles/a.parquet", b"PAR1").await;
        let materializer = Materializer::new(bucket, dir.path());

        let (a, b) = tokio::join!(
            materializer.materialize("profiles/a.parquet", Purpose::Read),
            materializer.materialize("profiles/a.parquet", Purpose::Read),
        );
        let (a, b) = (a.expect("a"), b.expect("b"));
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn missing_object_creates_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = BucketClient::new(Arc::new(MemoryBackend::new()), "test");
        let materializer = Materializer::new(bucket, dir.path());

        let err = materializer
            .materialize("profiles/missing.parquet", Purpose::Read)
            .await
            .expect_err("missing");
        assert!(matches!(err, ProfileError::ObjectNotFound { ref path } if path == "profiles/missing.parquet"));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn unwritable_scratch_dir_is_scratch_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = bucket_with("profiles/a.parquet", b"PAR1").await;
        let materializer = Materializer::new(bucket, dir.path().join("does-not-exist"));

        let err = materializer
            .materialize("profiles/a.parquet", Purpose::Read)
            .await
            .expect_err("no dir");
        assert!(matches!(err, ProfileError::Scratch { .. }));
    }
}
