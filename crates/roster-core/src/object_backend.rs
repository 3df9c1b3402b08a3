//! [`StorageBackend`] implementation over the `object_store` crate.
//!
//! Production runs talk to Google Cloud Storage; the same adapter wraps
//! `object_store`'s in-memory store for local experiments.
//!
//! Version tokens are the object generation when the store reports one and
//! the entity tag otherwise. Conditional writes pass the token as both, which
//! is what GCS (generation match) and the in-memory store (etag match) each
//! consult.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion,
};

use crate::error::{Error, Result};
use crate::storage::{ObjectData, ObjectMeta, StorageBackend, WritePrecondition, WriteResult};

/// Object storage backend backed by an `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    /// Wraps an existing object store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Creates a GCS backend for `bucket` authenticated with a service-account
    /// key (the JSON document, not a path).
    ///
    /// # Errors
    ///
    /// Returns `Error::Credential` if the key is rejected by the client builder.
    pub fn gcs(bucket: &str, service_account_key: &str) -> Result<Self> {
        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_service_account_key(service_account_key)
            .build()
            .map_err(|e| Error::credential(format!("failed to build GCS client: {e}")))?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Creates a backend over `object_store`'s in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    async fn current_version(&self, location: &Path) -> String {
        match self.store.head(location).await {
            Ok(meta) => version_token(meta.version, meta.e_tag),
            Err(_) => "0".to_string(),
        }
    }
}

fn version_token(version: Option<String>, e_tag: Option<String>) -> String {
    version.or(e_tag).unwrap_or_else(|| "0".to_string())
}

fn map_store_error(path: &str, err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { .. } => {
            Error::NotFound(format!("object not found: {path}"))
        }
        other => Error::storage_with_source(format!("object store request failed: {path}"), other),
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<ObjectData> {
        let location = Path::from(path);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_store_error(path, e))?;
        let version = version_token(result.meta.version.clone(), result.meta.e_tag.clone());
        let data = result.bytes().await.map_err(|e| map_store_error(path, e))?;
        Ok(ObjectData { data, version })
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let location = Path::from(path);
        let mode = match precondition {
            WritePrecondition::None => PutMode::Overwrite,
            WritePrecondition::DoesNotExist => PutMode::Create,
            WritePrecondition::MatchesVersion(token) => PutMode::Update(UpdateVersion {
                e_tag: Some(token.clone()),
                version: Some(token),
            }),
        };
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            mode,
            attributes,
            ..PutOptions::default()
        };

        match self
            .store
            .put_opts(&location, PutPayload::from(data), options)
            .await
        {
            Ok(put) => Ok(WriteResult::Success {
                version: version_token(put.version, put.e_tag),
            }),
            Err(
                object_store::Error::Precondition { .. }
                | object_store::Error::AlreadyExists { .. }
                | object_store::Error::NotFound { .. },
            ) => Ok(WriteResult::PreconditionFailed {
                current_version: self.current_version(&location).await,
            }),
            Err(e) => Err(map_store_error(path, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.store.delete(&Path::from(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_store_error(path, e)),
        }
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        match self.store.head(&Path::from(path)).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                path: path.to_string(),
                size: meta.size as u64,
                version: version_token(meta.version, meta.e_tag),
                content_type: None,
                last_modified: Some(meta.last_modified),
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_store_error(path, e)),
        }
    }
}
