//! Serve command - JSON-lines tool transport.
//!
//! Each stdin line is one request object: the tool request plus an optional
//! `id`. Requests run as independent tasks and each produces exactly one
//! stdout line `{"id": ..., "tool": ..., "result": ...}`, in completion
//! order. Logs go to stderr.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use roster_core::observability::tool_span;
use roster_profiles::{ProfileStore, ToolRequest, dispatch};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tracing::Instrument;
use ulid::Ulid;

/// One response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResponse {
    /// Request id, echoed back (`null` when absent).
    pub id: Value,
    /// Canonical tool name, `null` when the request did not parse.
    pub tool: Option<&'static str>,
    /// Human-readable result text.
    pub result: String,
}

/// Execute the serve command on stdin/stdout until EOF or Ctrl-C.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn execute(store: Arc<ProfileStore>) -> Result<()> {
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    run(store, input, tokio::io::stdout(), shutdown_signal()).await?;
    Ok(())
}

/// Serves requests from `input` to `output` until EOF or `shutdown`.
///
/// In-flight requests finish before this returns and `output` is handed
/// back after the last response line.
///
/// # Errors
///
/// Returns an error if `input` cannot be read or `output` cannot be written.
pub async fn run<R, W>(
    store: Arc<ProfileStore>,
    input: R,
    output: W,
    shutdown: impl Future<Output = ()>,
) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(rx, output));

    let mut lines = input.lines();
    let mut inflight = InFlight::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Err(rejected) => send(&tx, &rejected),
                    Ok((id, request)) => {
                        let store = Arc::clone(&store);
                        let tx = tx.clone();
                        let tool = request.name();
                        let request_id = id.clone();
                        inflight.spawn(id, tool, async move {
                            let response = respond(&store, request_id, request).await;
                            send(&tx, &response);
                        });
                    }
                }
            }
            Some(failed) = inflight.join_next(), if !inflight.is_empty() => {
                if let Some(response) = failed {
                    send(&tx, &response);
                }
            }
            () = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    while let Some(failed) = inflight.join_next().await {
        if let Some(response) = failed {
            send(&tx, &response);
        }
    }
    drop(tx);
    Ok(writer.await??)
}

/// Handles one request line.
pub async fn handle_line(store: &ProfileStore, line: &str) -> ToolResponse {
    match parse_line(line) {
        Ok((id, request)) => respond(store, id, request).await,
        Err(rejected) => rejected,
    }
}

/// Splits a request line into its id and tool request.
///
/// # Errors
///
/// Returns the response for a line that is not a valid request.
pub fn parse_line(line: &str) -> std::result::Result<(Value, ToolRequest), ToolResponse> {
    let mut value =
        serde_json::from_str::<Value>(line).map_err(|e| parse_failure(Value::Null, &e))?;
    let id = match &mut value {
        Value::Object(map) => map.remove("id").unwrap_or(Value::Null),
        _ => Value::Null,
    };
    match serde_json::from_value::<ToolRequest>(value) {
        Ok(request) => Ok((id, request)),
        Err(e) => Err(parse_failure(id, &e)),
    }
}

async fn respond(store: &ProfileStore, id: Value, request: ToolRequest) -> ToolResponse {
    let tool = request.name();
    let request_id = match &id {
        Value::Null => Ulid::new().to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let result = dispatch(store, request)
        .instrument(tool_span(tool, &request_id))
        .await;
    ToolResponse {
        id,
        tool: Some(tool),
        result,
    }
}

/// Request tasks in flight, keyed by task id so a task that dies can still
/// be answered.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<()>,
    requests: HashMap<task::Id, (Value, &'static str)>,
}

impl InFlight {
    fn spawn<F>(&mut self, id: Value, tool: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        self.requests.insert(handle.id(), (id, tool));
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the next task. Yields the response owed for a task that
    /// panicked or was cancelled, `None` for one that answered itself.
    async fn join_next(&mut self) -> Option<Option<ToolResponse>> {
        let joined = self.tasks.join_next_with_id().await?;
        Some(match joined {
            Ok((task, ())) => {
                self.requests.remove(&task);
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "request task failed");
                self.requests
                    .remove(&e.id())
                    .map(|(id, tool)| ToolResponse {
                        id,
                        tool: Some(tool),
                        result: format!("Failed to run {tool}: {e}"),
                    })
            }
        })
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &ToolResponse) {
    match serde_json::to_string(response) {
        Ok(encoded) => {
            if tx.send(encoded).is_err() {
                tracing::warn!("response dropped: writer closed");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode response"),
    }
}

fn parse_failure(id: Value, err: &serde_json::Error) -> ToolResponse {
    tracing::warn!(error = %err, "rejected request line");
    ToolResponse {
        id,
        tool: None,
        result: format!("Failed to parse request: {err}"),
    }
}

async fn write_lines<W>(mut rx: mpsc::UnboundedReceiver<String>, mut output: W) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(output)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
