//! The profile store.
//!
//! Reads go through a temporary local copy and a cached query session.
//! Mutations are whole-collection read-modify-write cycles:
//!
//! 1. take the in-process lock for the object path
//! 2. download the object and its version (absent means empty)
//! 3. decode every row through the session (`SELECT * FROM Profiles`)
//! 4. apply the mutation in memory
//! 5. encode and upload only if the object still has the version read
//!
//! A lost version race restarts the cycle from step 2, up to the configured
//! number of attempts. The temporary copy is deleted on every path.

use std::path::PathBuf;
use std::sync::Arc;

use datafusion::sql::parser::{DFParser, Statement as DFStatement};
use datafusion::sql::sqlparser::ast::Statement as SqlStatement;
use roster_core::config::{Config, DEFAULT_CAS_MAX_ATTEMPTS, DEFAULT_PROFILE_PATH};
use roster_core::observability::store_span;
use roster_core::{BucketClient, PARQUET_CONTENT_TYPE, WritePrecondition, WriteResult};
use tracing::Instrument as _;

use crate::codec;
use crate::error::{ProfileError, Result};
use crate::lock::PathLocks;
use crate::materialize::{Materializer, Purpose};
use crate::metrics::{record_cas_retry, record_write};
use crate::mutations::{
    self, AddOutcome, CleanOutcome, NewProfile, ProfileUpdate, ReclassifyOutcome, UpdateOutcome,
};
use crate::record::{MemberType, Platform, ProfileRecord};
use crate::session::{Row, SessionCache};

/// Name of the view queries run against. Unquoted identifiers are
/// case-insensitive, so `FROM Profiles` resolves to it.
pub const PROFILES_VIEW: &str = "profiles";

const SELECT_ALL: &str = "SELECT * FROM Profiles";
const SELECT_USERNAMES: &str = "SELECT username FROM Profiles";

/// Store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Object path of the roster inside the bucket.
    pub object_path: String,
    /// Directory for temporary local copies.
    pub scratch_dir: PathBuf,
    /// Attempts for a read-modify-write cycle that loses a version race.
    pub max_cas_attempts: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            object_path: DEFAULT_PROFILE_PATH.to_string(),
            scratch_dir: std::env::temp_dir(),
            max_cas_attempts: DEFAULT_CAS_MAX_ATTEMPTS,
        }
    }
}

impl StoreOptions {
    /// Creates options for `object_path` with copies under `scratch_dir`.
    #[must_use]
    pub fn new(object_path: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            object_path: object_path.into(),
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the CAS attempt limit (at least one).
    #[must_use]
    pub fn with_max_cas_attempts(mut self, attempts: u32) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    /// Builds options from runtime configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.profile_path.clone(), config.scratch_dir.clone())
            .with_max_cas_attempts(config.cas_max_attempts)
    }
}

/// Decision returned by a mutation closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<T> {
    /// Write the modified collection, then return the value.
    Commit(T),
    /// Discard any changes and return the value without writing.
    Skip(T),
}

/// Contributor profile store backed by one Parquet object.
#[derive(Debug)]
pub struct ProfileStore {
    bucket: BucketClient,
    materializer: Materializer,
    sessions: Arc<SessionCache>,
    locks: PathLocks,
    options: StoreOptions,
}

impl ProfileStore {
    /// Creates a store.
    #[must_use]
    pub fn new(bucket: BucketClient, sessions: Arc<SessionCache>, options: StoreOptions) -> Self {
        Self {
            materializer: Materializer::new(bucket.clone(), options.scratch_dir.clone()),
            bucket,
            sessions,
            locks: PathLocks::new(),
            options,
        }
    }

    /// Returns the roster object path.
    #[must_use]
    pub fn object_path(&self) -> &str {
        &self.options.object_path
    }

    /// Returns the session cache.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// Runs a read-only SQL statement against the `Profiles` view.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Query` for anything but a single SELECT, or if
    /// the engine fails; `ObjectNotFound` if the roster does not exist.
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        validate_query(sql)?;
        self.query_copy(sql)
            .instrument(store_span("query", self.object_path()))
            .await
    }

    /// Returns every non-null username, in file order.
    ///
    /// # Errors
    ///
    /// See [`ProfileStore::query`].
    pub async fn list_usernames(&self) -> Result<Vec<String>> {
        let rows = self.query(SELECT_USERNAMES).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove("username") {
                Some(serde_json::Value::String(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// Decodes the whole roster.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the roster does not exist, or a query or
    /// decode error.
    pub async fn profiles(&self) -> Result<Vec<ProfileRecord>> {
        self.read_copy()
            .instrument(store_span("profiles", self.object_path()))
            .await
    }

    /// Runs one read-modify-write cycle.
    ///
    /// `mutate` may run more than once if another writer replaces the object
    /// in between; it always sees the freshly read collection.
    ///
    /// # Errors
    ///
    /// Returns the first error of `mutate`, a transport, query, decode or
    /// encode error, or `ProfileError::VersionConflict` when every attempt
    /// lost the race.
    pub async fn modify<T, F>(&self, operation: &'static str, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut Vec<ProfileRecord>) -> Result<Mutation<T>>,
    {
        self.modify_inner(operation, &mut mutate)
            .instrument(store_span(operation, self.object_path()))
            .await
    }

    /// Appends a profile unless an identity URL is already present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when no identity URL is given, or any error of
    /// [`ProfileStore::modify`].
    pub async fn add_profile(&self, new: NewProfile) -> Result<AddOutcome> {
        self.modify("add_profile", |profiles| {
            Ok(match mutations::add_profile(profiles, new.clone())? {
                outcome @ AddOutcome::Added(_) => Mutation::Commit(outcome),
                outcome @ AddOutcome::Conflict { .. } => Mutation::Skip(outcome),
            })
        })
        .await
    }

    /// Sets the member type of every profile in `usernames`.
    ///
    /// # Errors
    ///
    /// See [`ProfileStore::modify`].
    pub async fn reclassify(
        &self,
        usernames: &[String],
        member_type: MemberType,
    ) -> Result<ReclassifyOutcome> {
        self.modify("reclassify", |profiles| {
            let outcome = mutations::reclassify(profiles, usernames, member_type);
            Ok(if outcome.matched == 0 {
                Mutation::Skip(outcome)
            } else {
                Mutation::Commit(outcome)
            })
        })
        .await
    }

    /// Applies field assignments to the profile with `username`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty update, or any error of
    /// [`ProfileStore::modify`].
    pub async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<UpdateOutcome> {
        if update.is_empty() {
            return Err(ProfileError::invalid_input("update assigns no fields"));
        }
        self.modify("update_profile", |profiles| {
            Ok(match mutations::update_profile(profiles, username, update) {
                outcome @ UpdateOutcome::Updated(_) => Mutation::Commit(outcome),
                UpdateOutcome::NotFound => Mutation::Skip(UpdateOutcome::NotFound),
            })
        })
        .await
    }

    /// Clears crawl state of `platforms` (all when empty) for `usernames`.
    ///
    /// # Errors
    ///
    /// See [`ProfileStore::modify`].
    pub async fn clean_platform_metadata(
        &self,
        usernames: &[String],
        platforms: &[Platform],
    ) -> Result<CleanOutcome> {
        self.modify("clean_platform_metadata", |profiles| {
            let outcome = mutations::clean_platform_metadata(profiles, usernames, platforms);
            Ok(if outcome.matched == 0 {
                Mutation::Skip(outcome)
            } else {
                Mutation::Commit(outcome)
            })
        })
        .await
    }

    async fn query_copy(&self, sql: &str) -> Result<Vec<Row>> {
        let path = self.object_path();
        let file = self.materializer.materialize(path, Purpose::Read).await?;
        let session = self.sessions.get_or_create(path).await;
        let rows = session.run_query(sql, PROFILES_VIEW, file.path()).await;
        file.release().await;
        let rows = rows?;
        tracing::debug!(rows = rows.len(), "query complete");
        Ok(rows)
    }

    async fn read_copy(&self) -> Result<Vec<ProfileRecord>> {
        let file = self
            .materializer
            .materialize(self.object_path(), Purpose::Read)
            .await?;
        let profiles = self.decode_copy(file.path()).await;
        file.release().await;
        profiles
    }

    async fn modify_inner<T, F>(&self, operation: &'static str, mutate: &mut F) -> Result<T>
    where
        F: FnMut(&mut Vec<ProfileRecord>) -> Result<Mutation<T>>,
    {
        let path = self.object_path();
        let _guard = self.locks.lock(path).await;
        let max_attempts = self.options.max_cas_attempts.max(1);

        for attempt in 1..=max_attempts {
            let (mut profiles, precondition) = self.load_for_update().await?;

            let value = match mutate(&mut profiles)? {
                Mutation::Skip(value) => {
                    tracing::info!(operation, "nothing to write");
                    return Ok(value);
                }
                Mutation::Commit(value) => value,
            };

            let bytes = codec::encode(&profiles)?;
            match self
                .bucket
                .write_if(bytes, path, PARQUET_CONTENT_TYPE, precondition)
                .await?
            {
                WriteResult::Success { version } => {
                    record_write(operation);
                    tracing::info!(
                        operation,
                        records = profiles.len(),
                        version = %version,
                        attempt,
                        "roster updated"
                    );
                    return Ok(value);
                }
                WriteResult::PreconditionFailed { current_version } => {
                    if attempt == max_attempts {
                        break;
                    }
                    record_cas_retry(operation);
                    tracing::warn!(
                        operation,
                        attempt,
                        current_version = %current_version,
                        "roster changed during update, retrying"
                    );
                }
            }
        }

        Err(ProfileError::VersionConflict {
            path: path.to_string(),
            attempts: max_attempts,
        })
    }

    async fn load_for_update(&self) -> Result<(Vec<ProfileRecord>, WritePrecondition)> {
        let path = self.object_path();
        let file = match self.materializer.materialize(path, Purpose::ReadWrite).await {
            Ok(file) => file,
            Err(ProfileError::ObjectNotFound { .. }) => {
                tracing::info!(object = path, "roster absent, starting from an empty collection");
                return Ok((Vec::new(), WritePrecondition::DoesNotExist));
            }
            Err(e) => return Err(e),
        };

        let version = file.version().to_string();
        let profiles = self.decode_copy(file.path()).await;
        file.release().await;
        Ok((profiles?, WritePrecondition::MatchesVersion(version)))
    }

    async fn decode_copy(&self, local_path: &std::path::Path) -> Result<Vec<ProfileRecord>> {
        let session = self.sessions.get_or_create(self.object_path()).await;
        let batches = session
            .collect(SELECT_ALL, PROFILES_VIEW, local_path)
            .await?;
        codec::decode_batches(&batches)
    }
}

fn validate_query(sql: &str) -> Result<()> {
    let statements = DFParser::parse_sql(sql)
        .map_err(|err| ProfileError::query(format!("failed to parse SQL: {err}")))?;
    let mut iter = statements.iter();
    let Some(statement) = iter.next() else {
        return Err(ProfileError::query("sql must contain a statement"));
    };
    if iter.next().is_some() {
        return Err(ProfileError::query(
            "only single-statement queries are supported",
        ));
    }
    match statement {
        DFStatement::Statement(statement) => match statement.as_ref() {
            SqlStatement::Query(_) => Ok(()),
            _ => Err(ProfileError::query("only SELECT/CTE queries are supported")),
        },
        _ => Err(ProfileError::query("only SELECT/CTE queries are supported")),
    }
}
