//! Prometheus metrics for a checker run
//!
//! The pipeline counters (`pipeline_*`) are recorded by the library; this
//! module installs the recorder, adds the per-status account gauge
//! `checker_accounts{status}`, and writes the exposition text to a file for
//! node_exporter's textfile collector.

use std::path::Path;

use account::AccountStatus;
use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record how many accounts ended up in each status.
pub fn record_account_counts(counts: &[(AccountStatus, usize)]) {
    for (status, count) in counts {
        metrics::gauge!("checker_accounts", "status" => status.label()).set(*count as f64);
    }
}

/// Write the rendered metrics to `path`.
pub async fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    tokio::fs::write(path, handle.render())
        .await
        .with_context(|| format!("failed to write metrics to {}", path.display()))
}
