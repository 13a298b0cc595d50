//! Account checker
//!
//! Batch job that:
//! 1. Loads accounts from a status-sorted directory and optional proxies
//! 2. Checks every `Unknown` account through the request pipeline, with
//!    bounded concurrency and round-robin proxies
//! 3. Writes accounts back into the file matching their new status
//!
//! Ctrl-C cancels in-flight checks; whatever was learned so far is still
//! written back.

mod checker;
mod config;
mod metrics;

use std::sync::Arc;

use account::store;
use anyhow::{Context, Result};
use pipeline::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{HttpTransport, HttpTransportConfig, Proxy, Transport};

use crate::checker::{Checker, TransportFactory, status_counts};
use crate::config::Config;

fn log_counts(stage: &str, records: &[store::AccountRecord]) {
    for (status, count) in status_counts(records) {
        info!(stage, status = %status, count, "accounts");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting account-checker");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let proxies = match &config.checker.proxies_file {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read proxies from {}", path.display()))?;
            transport::proxy::parse_proxy_list(&contents)
                .with_context(|| format!("invalid proxy in {}", path.display()))?
        }
        None => Vec::new(),
    };

    let records = store::load_status_dir(&config.checker.accounts_dir)
        .await
        .with_context(|| {
            format!(
                "failed to load accounts from {}",
                config.checker.accounts_dir.display()
            )
        })?;

    info!(
        accounts = records.len(),
        proxies = proxies.len(),
        max_tasks = config.checker.max_tasks,
        wait_on_rate_limit = config.pipeline.wait_on_rate_limit,
        "configuration loaded"
    );
    log_counts("before", &records);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("received SIGINT, cancelling checks");
                cancel.cancel();
            }
        }
    });

    let factory: TransportFactory = {
        let timeout = config.timeout();
        let headers = config.transport_headers();
        Arc::new(
            move |proxy: Option<&Proxy>| -> transport::Result<Box<dyn Transport>> {
                let transport = HttpTransport::new(HttpTransportConfig {
                    proxy: proxy.cloned(),
                    timeout,
                    headers: headers.clone(),
                })?;
                Ok(Box::new(transport))
            },
        )
    };

    let checker = Arc::new(Checker::new(
        config.pipeline_config(),
        proxies,
        config.checker.max_tasks,
        cancel.clone(),
        factory,
    ));
    let records = checker.check(records).await;

    store::save_status_dir(&config.checker.accounts_dir, &records)
        .await
        .context("failed to save accounts")?;

    let counts = status_counts(&records);
    log_counts("after", &records);
    metrics::record_account_counts(&counts);

    if let Some(path) = &config.checker.metrics_path {
        metrics::write_textfile(&prometheus_handle, path).await?;
        info!(path = %path.display(), "metrics written");
    }

    if cancel.is_cancelled() {
        warn!("run was cancelled; unchecked accounts remain UNKNOWN");
    }
    info!("account-checker finished");
    Ok(())
}
