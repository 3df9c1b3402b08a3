//! Prometheus export of the roster counters.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the global Prometheus recorder with a scrape endpoint on `addr`
/// and registers the roster metric descriptions.
///
/// Must run inside the tokio runtime; the HTTP listener is spawned onto it.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be started.
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install prometheus exporter")?;
    roster_profiles::metrics::register_metrics();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
