//! # roster-core
//!
//! Shared primitives for the contributor roster tools:
//!
//! - **Storage**: whole-object storage backends with conditional writes
//! - **Bucket client**: reads, overwrites, existence checks and deletes with
//!   transient-failure retry
//! - **Credentials**: secret retrieval and service-account decoding
//! - **Configuration** and **observability** helpers
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use roster_core::prelude::*;
//!
//! let bucket = BucketClient::new(Arc::new(MemoryBackend::new()), "df-landing-zone-dev");
//! assert_eq!(bucket.location("a/b.parquet"), "gs://df-landing-zone-dev/a/b.parquet");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod config;
pub mod credentials;
pub mod error;
pub mod object_backend;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bucket::{BucketClient, PARQUET_CONTENT_TYPE, Payload, RetryPolicy};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::object_backend::ObjectStoreBackend;
    pub use crate::storage::{
        MemoryBackend, ObjectData, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}

pub use bucket::{BucketClient, PARQUET_CONTENT_TYPE, Payload, RetryPolicy};
pub use config::Config;
pub use credentials::{SecretSource, ServiceAccountKey, StaticSecretSource, VaultSecretSource};
pub use error::{Error, Result};
pub use object_backend::ObjectStoreBackend;
pub use observability::{LogFormat, init_logging};
pub use storage::{
    MemoryBackend, ObjectData, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
};
