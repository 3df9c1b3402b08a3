//! # roster-profiles
//!
//! The contributor profile roster: a single Parquet object holding every
//! profile, read through cached DataFusion sessions and rewritten whole on
//! every change.
//!
//! ## Components
//!
//! - [`codec`]: Parquet encoding/decoding of [`ProfileRecord`]s
//! - [`session`]: process-wide query session cache
//! - [`materialize`]: temporary local copies with guaranteed cleanup
//! - [`store`]: read-only queries and read-modify-write cycles with
//!   optimistic concurrency
//! - [`mutations`]: the in-memory edits behind each business operation
//! - [`tools`]: JSON tool requests and their text results
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roster_core::{BucketClient, MemoryBackend};
//! use roster_profiles::{ProfileStore, SessionCache, StoreOptions};
//!
//! # async fn example() -> roster_profiles::Result<()> {
//! let bucket = BucketClient::new(Arc::new(MemoryBackend::new()), "df-landing-zone-dev");
//! let store = ProfileStore::new(bucket, Arc::new(SessionCache::new()), StoreOptions::default());
//! let usernames = store.list_usernames().await?;
//! println!("{}", usernames.join(", "));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod error;
pub mod lock;
pub mod materialize;
pub mod metrics;
pub mod mutations;
pub mod record;
pub mod session;
pub mod store;
pub mod tools;

pub use codec::{ProfileEncoder, decode, decode_batches, encode, profile_schema};
pub use error::{ProfileError, Result};
pub use materialize::{MaterializedFile, Materializer, Purpose};
pub use mutations::{
    AddOutcome, CleanOutcome, NewProfile, ProfileUpdate, ReclassifyOutcome, UpdateOutcome,
};
pub use record::{MemberType, Platform, ProfileField, ProfileRecord, RawMetadata};
pub use session::{QuerySession, Row, SessionCache};
pub use store::{Mutation, PROFILES_VIEW, ProfileStore, StoreOptions};
pub use tools::{ToolRequest, dispatch};
