//! Pipeline counters
//!
//! Recorded through the `metrics` facade; no-ops unless the binary installs a
//! recorder.
//!
//! - `pipeline_requests_total` (counter): label `status`
//! - `pipeline_csrf_bootstrap_total` (counter): label `outcome`
//! - `pipeline_csrf_refresh_total` (counter)
//! - `pipeline_rate_limit_waits_total` (counter)
//! - `pipeline_status_transitions_total` (counter): label `to`

use account::AccountStatus;

pub fn record_request(status: u16) {
    metrics::counter!("pipeline_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_bootstrap(outcome: &'static str) {
    metrics::counter!("pipeline_csrf_bootstrap_total", "outcome" => outcome).increment(1);
}

pub fn record_csrf_refresh() {
    metrics::counter!("pipeline_csrf_refresh_total").increment(1);
}

pub fn record_rate_limit_wait() {
    metrics::counter!("pipeline_rate_limit_waits_total").increment(1);
}

pub fn record_status_transition(to: AccountStatus) {
    metrics::counter!("pipeline_status_transitions_total", "to" => to.label()).increment(1);
}
