//! CLI command implementations.

pub mod serve;
pub mod tools;

use std::sync::Arc;

use anyhow::{Context, Result};
use roster_core::{
    BucketClient, Config, ObjectStoreBackend, RetryPolicy, ServiceAccountKey, StorageBackend,
    VaultSecretSource,
};
use roster_profiles::{ProfileStore, SessionCache, StoreOptions};

/// Builds the profile store described by `config`.
///
/// With `in_memory` the store runs over a process-local object store and no
/// credentials are fetched.
///
/// # Errors
///
/// Returns an error if Vault is not configured, the credential cannot be
/// fetched or decoded, or the GCS client rejects it.
pub async fn open_store(config: &Config, in_memory: bool) -> Result<ProfileStore> {
    let backend: Arc<dyn StorageBackend> = if in_memory {
        tracing::info!("using in-memory object store");
        Arc::new(ObjectStoreBackend::in_memory())
    } else {
        let vault = config.vault.as_ref().context(
            "Vault is not configured. Set VAULT_ADDR, VAULT_TOKEN and VAULT_PATH or use --in-memory",
        )?;
        let source = VaultSecretSource::new(&vault.addr, &vault.token, &vault.path);
        let key = ServiceAccountKey::fetch(&source, &config.credential_key)
            .await
            .context("failed to fetch service account credential")?;
        tracing::info!(
            bucket = %config.bucket,
            client_email = key.client_email(),
            "connecting to GCS"
        );
        Arc::new(ObjectStoreBackend::gcs(&config.bucket, key.as_json())?)
    };

    let bucket = BucketClient::new(backend, &config.bucket).with_retry_policy(
        RetryPolicy::default().with_max_attempts(config.transport_max_attempts),
    );
    Ok(ProfileStore::new(
        bucket,
        Arc::new(SessionCache::new()),
        StoreOptions::from_config(config),
    ))
}
