//! Concurrent account checking
//!
//! Every `Unknown` account gets one task. Tasks are bounded by a semaphore of
//! `max_tasks` permits, proxies are handed out round-robin at spawn time, and
//! each task builds its own transport so no session state is shared between
//! accounts. The check itself is a username lookup: its outcome is irrelevant,
//! the status side effect of the pipeline call is what gets persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use account::store::AccountRecord;
use account::{Account, AccountStatus};
use pipeline::{CancellationToken, Pipeline, PipelineConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use transport::{Proxy, Transport};

/// Builds one transport per account, bound to the given proxy.
pub type TransportFactory =
    Arc<dyn Fn(Option<&Proxy>) -> transport::Result<Box<dyn Transport>> + Send + Sync>;

pub struct Checker {
    pipeline_config: PipelineConfig,
    proxies: Vec<Proxy>,
    next_proxy: AtomicUsize,
    max_tasks: usize,
    cancel: CancellationToken,
    factory: TransportFactory,
}

impl Checker {
    pub fn new(
        pipeline_config: PipelineConfig,
        proxies: Vec<Proxy>,
        max_tasks: usize,
        cancel: CancellationToken,
        factory: TransportFactory,
    ) -> Self {
        Self {
            pipeline_config,
            proxies,
            next_proxy: AtomicUsize::new(0),
            max_tasks,
            cancel,
            factory,
        }
    }

    /// Next proxy in round-robin order, `None` when no proxies are configured.
    pub fn next_proxy(&self) -> Option<Proxy> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = self.next_proxy.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[idx].clone())
    }

    /// Check every `Unknown` account and return the records with updated state.
    ///
    /// Records in any other status pass through untouched. A task that panics
    /// leaves its record as it was.
    pub async fn check(self: Arc<Self>, mut records: Vec<AccountRecord>) -> Vec<AccountRecord> {
        let semaphore = Arc::new(Semaphore::new(self.max_tasks));
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            if record.account.status() != AccountStatus::Unknown {
                continue;
            }
            let checker = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let proxy = self.next_proxy();
            let mut account = record.account.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, account);
                };
                if !checker.cancel.is_cancelled() {
                    checker.check_one(&mut account, proxy).await;
                }
                (index, account)
            });
        }

        info!(tasks = tasks.len(), max_tasks = self.max_tasks, "checking accounts");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, account)) => records[index].account = account,
                Err(e) => warn!(error = %e, "check task failed"),
            }
        }

        records
    }

    async fn check_one(&self, account: &mut Account, proxy: Option<Proxy>) {
        let transport = match (self.factory)(proxy.as_ref()) {
            Ok(t) => t,
            Err(e) => {
                warn!(account = %account, error = %e, "failed to build transport");
                return;
            }
        };
        let pipeline = Pipeline::new(transport, self.pipeline_config.clone())
            .with_cancellation(self.cancel.clone());

        let proxy = proxy.map(|p| p.to_string()).unwrap_or_default();
        match pipeline.request_username(account).await {
            Ok(username) => info!(
                account = %account,
                username = %username,
                status = %account.status(),
                proxy = %proxy,
                "account checked"
            ),
            Err(pipeline::Error::Cancelled) => debug!(account = %account, "check cancelled"),
            Err(e) => warn!(
                account = %account,
                status = %account.status(),
                proxy = %proxy,
                error = %e,
                "account check failed"
            ),
        }
    }
}

/// Number of records per status, in `AccountStatus::ALL` order.
pub fn status_counts(records: &[AccountRecord]) -> Vec<(AccountStatus, usize)> {
    AccountStatus::ALL
        .iter()
        .map(|status| {
            let count = records
                .iter()
                .filter(|r| r.account.status() == *status)
                .count();
            (*status, count)
        })
        .collect()
}
