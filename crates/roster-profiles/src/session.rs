//! Cached query engine sessions.
//!
//! One DataFusion [`SessionContext`] is kept per logical key (the remote
//! object path) for the life of the process. Each call registers a view over
//! a freshly materialized local file, replacing the previous registration
//! when the view points elsewhere, then runs one statement.
//!
//! A session is never evicted because a statement failed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow_json::WriterBuilder;
use arrow_json::writer::JsonArray;
use datafusion::error::DataFusionError;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use tokio::sync::Mutex;

use crate::error::{ProfileError, Result};
use crate::metrics::record_session_lookup;

/// One result row: column name to JSON value, nulls explicit.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Process-wide cache of query sessions.
#[derive(Default)]
pub struct SessionCache {
    sessions: Mutex<HashMap<String, Arc<QuerySession>>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

impl SessionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `key`, creating it on first use.
    pub async fn get_or_create(&self, key: &str) -> Arc<QuerySession> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(key) {
            record_session_lookup(true);
            return Arc::clone(session);
        }

        record_session_lookup(false);
        tracing::debug!(key, "creating query session");
        let session = Arc::new(QuerySession::new());
        sessions.insert(key.to_string(), Arc::clone(&session));
        session
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns whether no session is cached.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Drops every cached session.
    pub async fn close(&self) {
        let mut sessions = self.sessions.lock().await;
        let closed = sessions.len();
        sessions.clear();
        tracing::info!(closed, "closed query sessions");
    }
}

/// A long-lived query engine session.
pub struct QuerySession {
    ctx: SessionContext,
    views: Mutex<HashMap<String, PathBuf>>,
}

impl QuerySession {
    fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `sql` with `view` bound to the Parquet file at `local_path` and
    /// returns the rows as JSON objects.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Query` if registration or execution fails.
    pub async fn run_query(&self, sql: &str, view: &str, local_path: &Path) -> Result<Vec<Row>> {
        let batches = self.collect(sql, view, local_path).await?;
        batches_to_rows(&batches)
    }

    /// Runs `sql` with `view` bound to the Parquet file at `local_path` and
    /// returns the raw record batches.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Query` if registration or execution fails.
    pub async fn collect(
        &self,
        sql: &str,
        view: &str,
        local_path: &Path,
    ) -> Result<Vec<RecordBatch>> {
        let mut views = self.views.lock().await;
        self.bind_view(&mut views, view, local_path).await?;

        let df = self
            .ctx
            .sql(sql)
            .await
            .map_err(|err| map_datafusion_error(&err))?;
        df.collect().await.map_err(|err| map_datafusion_error(&err))
    }

    async fn bind_view(
        &self,
        views: &mut HashMap<String, PathBuf>,
        view: &str,
        local_path: &Path,
    ) -> Result<()> {
        let view = view.to_ascii_lowercase();
        match views.get(&view) {
            Some(current) if current == local_path => return Ok(()),
            Some(stale) => {
                tracing::debug!(view = %view, stale = %stale.display(), "re-registering view");
                self.ctx
                    .deregister_table(view.as_str())
                    .map_err(|err| map_datafusion_error(&err))?;
                views.remove(&view);
            }
            None => {}
        }

        let location = local_path.to_str().ok_or_else(|| ProfileError::Scratch {
            path: local_path.to_path_buf(),
            message: "path is not valid UTF-8".to_string(),
        })?;
        self.ctx
            .register_parquet(view.as_str(), location, ParquetReadOptions::default())
            .await
            .map_err(|err| map_datafusion_error(&err))?;
        views.insert(view, local_path.to_path_buf());
        Ok(())
    }

    /// Returns the file `view` currently points at.
    pub async fn view_location(&self, view: &str) -> Option<PathBuf> {
        self.views
            .lock()
            .await
            .get(&view.to_ascii_lowercase())
            .cloned()
    }
}

fn map_datafusion_error(err: &DataFusionError) -> ProfileError {
    ProfileError::query(err.to_string())
}

fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>> {
    if batches.iter().all(|b| b.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let normalized = batches
        .iter()
        .map(normalize_string_views)
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&RecordBatch> = normalized.iter().collect();

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    writer
        .write_batches(&refs)
        .map_err(|e| ProfileError::decode(format!("failed to write JSON rows: {e}")))?;
    writer
        .finish()
        .map_err(|e| ProfileError::decode(format!("failed to finalize JSON rows: {e}")))?;

    serde_json::from_slice(&writer.into_inner())
        .map_err(|e| ProfileError::decode(format!("failed to parse JSON rows: {e}")))
}

fn normalize_string_views(batch: &RecordBatch) -> Result<RecordBatch> {
    if !batch
        .schema()
        .fields()
        .iter()
        .any(|f| f.data_type() == &DataType::Utf8View)
    {
        return Ok(batch.clone());
    }

    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        if field.data_type() == &DataType::Utf8View {
            let utf8 = cast(column, &DataType::Utf8)
                .map_err(|e| ProfileError::decode(format!("column '{}': {e}", field.name())))?;
            fields.push(Field::new(field.name(), DataType::Utf8, field.is_nullable()));
            columns.push(utf8);
        } else {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(column));
        }
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| ProfileError::decode(format!("record batch rebuild failed: {e}")))
}
