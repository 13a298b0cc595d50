//! The authenticated request pipeline
//!
//! Every API call goes through `Pipeline::execute`, which:
//!
//! 1. Bootstraps a CSRF token once per empty-token window (a GET to the
//!    authorize endpoint whose only useful output is the `ct0` cookie).
//! 2. Attaches `auth_token` / `ct0` cookies and the `x-csrf-token` header,
//!    letting caller-supplied values win on collision.
//! 3. Dispatches through the `Transport`, racing a `CancellationToken` if one
//!    is attached.
//! 4. Classifies the response and reacts:
//!    - 403 + stale-CSRF code + fresh `ct0` cookie: store the token, replay
//!      once
//!    - 429 in wait mode: sleep until the advertised reset, replay
//!      (unbounded, cancellable)
//!    - 401 + bad-token code: `BadToken`
//!    - 403 or 2xx-with-errors + locked/suspended code: `Locked`/`Suspended`
//!    - clean 2xx: `Good`
//!
//! Status transitions (`next_status`):
//!
//! ```text
//! Unknown --(clean 2xx)--------------------> Good
//! Unknown|Good --(401, bad token)----------> BadToken
//! Unknown|Good --(403/2xx-err, suspended)--> Suspended
//! Unknown|Good --(403/2xx-err, locked)-----> Locked
//! BadToken, Suspended, Locked: sinks, left only via Account::reset
//! ```
//!
//! Status is mutated before the error is returned, so a caller that sees the
//! error always sees the matching status.
//!
//! Calls for one account must be serialized by the caller; `execute` takes
//! `&mut Account` to make that explicit.

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use account::{Account, AccountStatus, AUTH_TOKEN_COOKIE, CSRF_COOKIE};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use transport::{Transport, TransportRequest, TransportResponse};

use crate::cancel::CancellationToken;
use crate::classify::{classify, parse_body};
use crate::codes::StatusCodes;
use crate::constants::{BOOTSTRAP_URL, CSRF_HEADER, RATE_LIMIT_RESET_HEADER};
use crate::error::{ApiError, ApiErrorKind, Error, Result};
use crate::metrics;
use crate::request::{ApiRequest, ApiResponse};

/// Pipeline behavior knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sleep and retry on 429 instead of returning `RateLimited`.
    pub wait_on_rate_limit: bool,
    pub bootstrap_url: String,
    pub rate_limit_reset_header: String,
    pub auth_cookie: String,
    pub csrf_cookie: String,
    pub csrf_header: String,
    pub codes: StatusCodes,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wait_on_rate_limit: true,
            bootstrap_url: BOOTSTRAP_URL.to_string(),
            rate_limit_reset_header: RATE_LIMIT_RESET_HEADER.to_string(),
            auth_cookie: AUTH_TOKEN_COOKIE.to_string(),
            csrf_cookie: CSRF_COOKIE.to_string(),
            csrf_header: CSRF_HEADER.to_string(),
            codes: StatusCodes::default(),
        }
    }
}

/// Apply an observed status to the current one.
///
/// Sink states never change. `Unknown` as an observation means "no signal".
pub fn next_status(current: AccountStatus, observed: AccountStatus) -> AccountStatus {
    if current.is_terminal() {
        return current;
    }
    match observed {
        AccountStatus::Unknown => current,
        other => other,
    }
}

/// Time to wait before retrying a 429: `reset - now + 1`, floored at zero.
pub fn rate_limit_delay(reset_epoch: i64, now_epoch: i64) -> Duration {
    let secs = reset_epoch.saturating_sub(now_epoch).saturating_add(1);
    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let name = match HeaderName::from_str(name) {
        Ok(n) => n,
        Err(e) => {
            warn!(header = %name, error = %e, "skipping invalid header name");
            return;
        }
    };
    let value = match HeaderValue::from_str(value) {
        Ok(v) => v,
        Err(e) => {
            warn!(header = %name, error = %e, "skipping invalid header value");
            return;
        }
    };
    headers.insert(name, value);
}

pub struct Pipeline<T> {
    transport: T,
    config: PipelineConfig,
    cancel: Option<CancellationToken>,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(transport: T, config: PipelineConfig) -> Self {
        Self {
            transport,
            config,
            cancel: None,
        }
    }

    /// Abort in-flight transport calls and rate-limit waits when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one API call for `account`.
    pub async fn execute(&self, account: &mut Account, request: ApiRequest) -> Result<ApiResponse> {
        if request.requires_csrf && account.csrf_token().is_none() {
            self.bootstrap_csrf(account).await?;
        }

        let mut csrf_refreshed = false;
        loop {
            let outgoing = self.assemble(account, &request);
            let response = self.dispatch(outgoing).await?;
            let body = parse_body(&response.body);

            let Some(error) = classify(response.status, body.as_ref()) else {
                self.transition(account, AccountStatus::Good);
                return Ok(ApiResponse {
                    status: response.status,
                    headers: response.headers,
                    body,
                });
            };

            match error.kind {
                ApiErrorKind::Forbidden
                    if !csrf_refreshed && self.config.codes.is_stale_csrf(&error) =>
                {
                    if let Some(fresh) = self.fresh_csrf(&response) {
                        info!(account = %account, "csrf token stale, replaying with refreshed token");
                        account.set_csrf_token(fresh);
                        metrics::record_csrf_refresh();
                        csrf_refreshed = true;
                        continue;
                    }
                    debug!(account = %account, "stale csrf code without a fresh cookie");
                }
                ApiErrorKind::RateLimited => {
                    if self.wait_for_reset(account, &response).await? {
                        continue;
                    }
                }
                _ => {}
            }

            self.observe(account, &error);
            return Err(error.into());
        }
    }

    /// Obtain a `ct0` cookie from the bootstrap endpoint.
    ///
    /// A 2xx or 403 carrying the cookie succeeds. A 2xx or 403 without it fails
    /// with `CsrfTokenUnavailable`. A 429 waits for the reset in wait mode.
    /// Anything else is classified like a normal response, status side
    /// effects included.
    async fn bootstrap_csrf(&self, account: &mut Account) -> Result<()> {
        debug!(account = %account, url = %self.config.bootstrap_url, "bootstrapping csrf token");

        let response = loop {
            let mut request =
                TransportRequest::new(Method::GET, self.config.bootstrap_url.clone());
            request.cookies.push((
                self.config.auth_cookie.clone(),
                account.auth_token().to_string(),
            ));

            let response = self.dispatch(request).await?;
            if response.status == 429 && self.wait_for_reset(account, &response).await? {
                continue;
            }
            break response;
        };
        let status = response.status;
        let body = parse_body(&response.body);
        let error = classify(status, body.as_ref());

        if (200..300).contains(&status) || status == 403 {
            if let Some(token) = self.fresh_csrf(&response) {
                account.set_csrf_token(token);
                metrics::record_bootstrap("obtained");
                info!(account = %account, status, "csrf token obtained");
                return Ok(());
            }
            if let Some(error) = &error {
                self.observe(account, error);
            }
            metrics::record_bootstrap("missing_cookie");
            warn!(account = %account, status, "bootstrap response carried no csrf cookie");
            return Err(Error::CsrfTokenUnavailable { status });
        }

        metrics::record_bootstrap("failed");
        match error {
            Some(error) => {
                self.observe(account, &error);
                Err(error.into())
            }
            None => Err(Error::CsrfTokenUnavailable { status }),
        }
    }

    /// Sleep until the advertised rate-limit reset.
    ///
    /// Returns `false` when the 429 should surface instead: wait mode is off
    /// or the reset header is missing or unparsable.
    async fn wait_for_reset(&self, account: &Account, response: &TransportResponse) -> Result<bool> {
        if !self.config.wait_on_rate_limit {
            return Ok(false);
        }
        let reset = response
            .header(&self.config.rate_limit_reset_header)
            .and_then(|v| v.trim().parse::<i64>().ok());
        let Some(reset) = reset else {
            warn!(
                account = %account,
                header = %self.config.rate_limit_reset_header,
                "rate limited without a usable reset header"
            );
            return Ok(false);
        };

        let delay = rate_limit_delay(reset, unix_now());
        warn!(
            account = %account,
            delay_secs = delay.as_secs(),
            "rate limited, waiting for reset"
        );
        metrics::record_rate_limit_wait();
        self.pause(delay).await?;
        Ok(true)
    }

    fn fresh_csrf<'r>(&self, response: &'r TransportResponse) -> Option<&'r str> {
        response
            .cookie(&self.config.csrf_cookie)
            .filter(|token| !token.is_empty())
    }

    /// Build the outgoing request: credentials first, caller values on top.
    fn assemble(&self, account: &Account, request: &ApiRequest) -> TransportRequest {
        let mut outgoing = TransportRequest::new(request.method.clone(), request.url.clone());
        outgoing.query = request.query.clone();
        outgoing.body = request.body.clone();

        outgoing.cookies.push((
            self.config.auth_cookie.clone(),
            account.auth_token().to_string(),
        ));
        if let Some(csrf) = account.csrf_token() {
            outgoing
                .cookies
                .push((self.config.csrf_cookie.clone(), csrf.to_string()));
            insert_header(&mut outgoing.headers, &self.config.csrf_header, csrf);
        }

        for (name, value) in &request.cookies {
            outgoing.cookies.retain(|(n, _)| n != name);
            outgoing.cookies.push((name.clone(), value.clone()));
        }
        for (name, value) in &request.headers {
            insert_header(&mut outgoing.headers, name, value);
        }

        outgoing
    }

    async fn dispatch(&self, request: TransportRequest) -> Result<TransportResponse> {
        debug!(method = %request.method, url = %request.url, "dispatching request");

        let response = match &self.cancel {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    result = self.transport.send(request) => result?,
                }
            }
            None => self.transport.send(request).await?,
        };

        metrics::record_request(response.status);
        Ok(response)
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        let sleep = tokio::time::sleep(delay);
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                _ = sleep => Ok(()),
            },
            None => {
                sleep.await;
                Ok(())
            }
        }
    }

    /// Apply the status side effects of a terminal error.
    fn observe(&self, account: &mut Account, error: &ApiError) {
        debug!(
            account = %account,
            kind = %error.kind,
            status = error.status,
            codes = ?error.codes,
            "api error"
        );
        let codes = &self.config.codes;
        let observed = match error.kind {
            ApiErrorKind::Unauthorized if codes.is_bad_token(error) => {
                Some(AccountStatus::BadToken)
            }
            ApiErrorKind::Forbidden | ApiErrorKind::Application => codes.health_signal(error),
            _ => None,
        };
        if let Some(observed) = observed {
            self.transition(account, observed);
        }
    }

    fn transition(&self, account: &mut Account, observed: AccountStatus) {
        let current = account.status();
        let next = next_status(current, observed);
        if next != current {
            info!(account = %account, from = %current, to = %next, "account status changed");
            account.mark_status(next);
            metrics::record_status_transition(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedTransport, TOKEN, header};
    use serde_json::json;
    use std::sync::Arc;
    use transport::TransportError;

    const API_URL: &str = "https://twitter.com/i/api/1.1/example.json";

    fn pipeline(
        replies: Vec<transport::Result<TransportResponse>>,
        wait_on_rate_limit: bool,
    ) -> (Pipeline<Arc<ScriptedTransport>>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let config = PipelineConfig {
            wait_on_rate_limit,
            ..PipelineConfig::default()
        };
        (Pipeline::new(Arc::clone(&transport), config), transport)
    }

    fn account_with_csrf() -> Account {
        Account::new(TOKEN).unwrap().with_csrf_token("CT0")
    }

    // --- pure helpers ---

    #[test]
    fn next_status_follows_state_diagram() {
        use AccountStatus::*;
        assert_eq!(next_status(Unknown, Good), Good);
        assert_eq!(next_status(Good, Good), Good);
        assert_eq!(next_status(Unknown, BadToken), BadToken);
        assert_eq!(next_status(Good, Suspended), Suspended);
        assert_eq!(next_status(Good, Locked), Locked);
        assert_eq!(next_status(Good, Unknown), Good);
        for sink in [BadToken, Suspended, Locked] {
            for observed in AccountStatus::ALL {
                assert_eq!(next_status(sink, observed), sink);
            }
        }
    }

    #[test]
    fn rate_limit_delay_adds_one_second_and_floors_at_zero() {
        assert_eq!(rate_limit_delay(1_000, 990), Duration::from_secs(11));
        assert_eq!(rate_limit_delay(1_000, 1_000), Duration::from_secs(1));
        assert_eq!(rate_limit_delay(1_000, 1_001), Duration::ZERO);
        assert_eq!(rate_limit_delay(1_000, 5_000), Duration::ZERO);
    }

    // --- credential attachment ---

    #[tokio::test]
    async fn attaches_credentials() {
        let (pipeline, transport) = pipeline(vec![Reply::json(200, json!({})).ok()], false);
        let mut account = account_with_csrf();

        pipeline
            .execute(&mut account, ApiRequest::get(API_URL).query("a", "1"))
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.cookie("auth_token"), Some(TOKEN));
        assert_eq!(sent.cookie("ct0"), Some("CT0"));
        assert_eq!(header(sent, "x-csrf-token"), Some("CT0"));
        assert_eq!(sent.query, vec![("a".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn caller_values_win_on_collision() {
        let (pipeline, transport) = pipeline(vec![Reply::json(200, json!({})).ok()], false);
        let mut account = account_with_csrf();

        let request = ApiRequest::post(API_URL)
            .header("X-Csrf-Token", "CALLER")
            .cookie("ct0", "CALLER_COOKIE");
        pipeline.execute(&mut account, request).await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(header(sent, "x-csrf-token"), Some("CALLER"));
        assert_eq!(sent.cookie("ct0"), Some("CALLER_COOKIE"));
        assert_eq!(
            sent.cookies.iter().filter(|(n, _)| n == "ct0").count(),
            1,
            "overridden cookie must not be sent twice"
        );
    }

    // --- bootstrap ---

    #[tokio::test]
    async fn bootstraps_exactly_once() {
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(200).cookie("ct0", "BOOT").ok(),
                Reply::json(200, json!({"n": 1})).ok(),
                Reply::json(200, json!({"n": 2})).ok(),
            ],
            false,
        );
        let mut account = Account::new(TOKEN).unwrap();

        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, BOOTSTRAP_URL);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].cookie("ct0"), None);
        assert_eq!(header(&requests[1], "x-csrf-token"), Some("BOOT"));
        assert_eq!(header(&requests[2], "x-csrf-token"), Some("BOOT"));
        assert_eq!(account.csrf_token(), Some("BOOT"));
    }

    #[tokio::test]
    async fn bootstrap_accepts_cookie_on_forbidden() {
        let (pipeline, _transport) = pipeline(
            vec![
                Reply::json(403, json!({"errors": [{"code": 353, "message": "x"}]}))
                    .cookie("ct0", "FROM403")
                    .ok(),
                Reply::json(200, json!({})).ok(),
            ],
            false,
        );
        let mut account = Account::new(TOKEN).unwrap();

        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        assert_eq!(account.csrf_token(), Some("FROM403"));
    }

    #[tokio::test]
    async fn bootstrap_without_cookie_fails_fast() {
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(200).ok(),
                Reply::json(200, json!({})).ok(),
            ],
            false,
        );
        let mut account = Account::new(TOKEN).unwrap();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CsrfTokenUnavailable { status: 200 }));
        assert_eq!(transport.request_count(), 1, "no call after a failed bootstrap");
        assert_eq!(account.csrf_token(), None);
        assert_eq!(account.status(), AccountStatus::Unknown);
    }

    #[tokio::test]
    async fn bootstrap_unauthorized_marks_bad_token() {
        let (pipeline, transport) = pipeline(
            vec![Reply::json(401, json!({"errors": [{"code": 32, "message": "bad"}]})).ok()],
            false,
        );
        let mut account = Account::new(TOKEN).unwrap();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::Unauthorized));
        assert_eq!(account.status(), AccountStatus::BadToken);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn requests_without_csrf_skip_bootstrap() {
        let (pipeline, transport) = pipeline(vec![Reply::json(200, json!({})).ok()], false);
        let mut account = Account::new(TOKEN).unwrap();

        pipeline
            .execute(&mut account, ApiRequest::get(API_URL).without_csrf())
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, API_URL);
        assert_eq!(header(&requests[0], "x-csrf-token"), None);
    }

    // --- csrf self-heal ---

    #[tokio::test]
    async fn stale_csrf_is_refreshed_and_replayed_once() {
        let (pipeline, transport) = pipeline(
            vec![
                Reply::json(403, json!({"errors": [{"code": 353, "message": "stale token"}]}))
                    .cookie("ct0", "NEWTOKEN")
                    .ok(),
                Reply::json(200, json!({"ok": true})).ok(),
            ],
            false,
        );
        let mut account = account_with_csrf();

        let request = ApiRequest::post(API_URL).json(json!({"k": "v"}));
        let response = pipeline.execute(&mut account, request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(account.csrf_token(), Some("NEWTOKEN"));
        assert_eq!(account.status(), AccountStatus::Good);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(header(&requests[0], "x-csrf-token"), Some("CT0"));
        assert_eq!(header(&requests[1], "x-csrf-token"), Some("NEWTOKEN"));
        assert_eq!(requests[1].cookie("ct0"), Some("NEWTOKEN"));
        assert_eq!(requests[0].body, requests[1].body);
        assert_eq!(requests[0].url, requests[1].url);
    }

    #[tokio::test]
    async fn second_stale_csrf_is_surfaced() {
        let stale = || {
            Reply::json(403, json!({"errors": [{"code": 353, "message": "stale"}]}))
                .cookie("ct0", "AGAIN")
                .ok()
        };
        let (pipeline, transport) = pipeline(vec![stale(), stale(), stale()], false);
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::Forbidden));
        assert_eq!(transport.request_count(), 2);
        assert_eq!(account.status(), AccountStatus::Unknown);
    }

    #[tokio::test]
    async fn stale_csrf_without_cookie_is_not_retried() {
        let (pipeline, transport) = pipeline(
            vec![Reply::json(403, json!({"errors": [{"code": 353, "message": "stale"}]})).ok()],
            false,
        );
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::Forbidden));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(account.csrf_token(), Some("CT0"));
    }

    // --- status side effects ---

    #[tokio::test]
    async fn unauthorized_bad_token_marks_account() {
        let (pipeline, _t) = pipeline(
            vec![Reply::json(401, json!({"errors": [{"code": 32, "message": "bad token"}]})).ok()],
            false,
        );
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        let api = err.api().unwrap();
        assert_eq!(api.kind, ApiErrorKind::Unauthorized);
        assert_eq!(api.status, 401);
        assert_eq!(api.codes, vec![32]);
        assert_eq!(account.status(), AccountStatus::BadToken);
    }

    #[tokio::test]
    async fn unauthorized_without_code_leaves_status() {
        let (pipeline, _t) = pipeline(vec![Reply::status(401).ok()], false);
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::Unauthorized));
        assert_eq!(account.status(), AccountStatus::Unknown);
    }

    #[tokio::test]
    async fn forbidden_suspended_marks_account() {
        let (pipeline, _t) = pipeline(
            vec![Reply::json(403, json!({"errors": [{"code": 64, "message": "suspended"}]})).ok()],
            false,
        );
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::Forbidden));
        assert_eq!(account.status(), AccountStatus::Suspended);
    }

    #[tokio::test]
    async fn application_error_locked_marks_account() {
        let (pipeline, _t) = pipeline(
            vec![
                Reply::json(
                    200,
                    json!({"data": {"x": 1}, "errors": [{"code": 326, "message": "locked"}]}),
                )
                .ok(),
            ],
            false,
        );
        let mut account = account_with_csrf();
        account.mark_status(AccountStatus::Good);

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::Application));
        assert_eq!(account.status(), AccountStatus::Locked);
    }

    #[tokio::test]
    async fn application_error_suspended_marks_account() {
        let (pipeline, _t) = pipeline(
            vec![Reply::json(200, json!({"errors": [{"code": 141, "message": "suspended"}]})).ok()],
            false,
        );
        let mut account = account_with_csrf();

        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();
        assert_eq!(account.status(), AccountStatus::Suspended);
    }

    #[tokio::test]
    async fn sink_states_survive_clean_responses() {
        let (pipeline, _t) = pipeline(vec![Reply::json(200, json!({})).ok()], false);
        let mut account = account_with_csrf();
        account.mark_status(AccountStatus::Locked);

        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        assert_eq!(account.status(), AccountStatus::Locked);
    }

    #[tokio::test]
    async fn clean_success_is_idempotent() {
        let (pipeline, transport) = pipeline(
            vec![
                Reply::json(200, json!({"v": 1})).ok(),
                Reply::json(200, json!({"v": 1})).ok(),
            ],
            false,
        );
        let mut account = account_with_csrf();

        let first = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        assert_eq!(account.status(), AccountStatus::Good);
        let second = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        assert_eq!(account.status(), AccountStatus::Good);

        assert_eq!(first.body, second.body);
        assert_eq!(first.body, Some(json!({"v": 1})));
        let requests = transport.requests();
        assert_eq!(requests[0].cookies, requests[1].cookies);
    }

    #[tokio::test]
    async fn non_json_success_returns_no_body() {
        let (pipeline, _t) = pipeline(vec![Reply::status(204).ok()], false);
        let mut account = account_with_csrf();

        let response = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        assert_eq!(response.status, 204);
        assert!(response.body.is_none());
        assert_eq!(account.status(), AccountStatus::Good);
    }

    #[tokio::test]
    async fn terminal_statuses_are_not_retried() {
        for (status, kind) in [
            (400, ApiErrorKind::BadRequest),
            (404, ApiErrorKind::NotFound),
            (500, ApiErrorKind::ServerError),
            (503, ApiErrorKind::ServerError),
            (418, ApiErrorKind::Http),
        ] {
            let (pipeline, transport) = pipeline(
                vec![Reply::status(status).ok(), Reply::json(200, json!({})).ok()],
                true,
            );
            let mut account = account_with_csrf();

            let err = pipeline
                .execute(&mut account, ApiRequest::get(API_URL))
                .await
                .unwrap_err();

            assert_eq!(err.kind(), Some(kind), "status {status}");
            assert_eq!(err.api().unwrap().message, format!("HTTP {status}"));
            assert_eq!(transport.request_count(), 1, "status {status} must not retry");
            assert_eq!(account.status(), AccountStatus::Unknown);
        }
    }

    #[tokio::test]
    async fn transport_errors_pass_through_untouched() {
        let (pipeline, transport) = pipeline(
            vec![
                Err(TransportError::Timeout("deadline".into())),
                Reply::json(200, json!({})).ok(),
            ],
            true,
        );
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(account.status(), AccountStatus::Unknown);
    }

    // --- rate limiting ---

    #[tokio::test]
    async fn rate_limited_without_wait_is_raised() {
        let reset = (unix_now() + 60).to_string();
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::json(200, json!({})).ok(),
            ],
            false,
        );
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::RateLimited));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_with_wait_sleeps_until_reset() {
        let reset = (unix_now() + 2).to_string();
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::json(200, json!({"after": "wait"})).ok(),
            ],
            true,
        );
        let mut account = account_with_csrf();

        let started = tokio::time::Instant::now();
        let response = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        let waited = started.elapsed();

        assert_eq!(response.body, Some(json!({"after": "wait"})));
        assert!(
            waited >= Duration::from_secs(2) && waited <= Duration::from_secs(3),
            "expected reset - now + 1 seconds, waited {waited:?}"
        );
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, requests[1].url);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_with_past_reset_retries_immediately() {
        let reset = (unix_now() - 30).to_string();
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::json(200, json!({})).ok(),
            ],
            true,
        );
        let mut account = account_with_csrf();

        let started = tokio::time::Instant::now();
        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_bootstrap_waits_then_obtains_token() {
        let reset = (unix_now() + 2).to_string();
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::status(200).cookie("ct0", "BOOT").ok(),
                Reply::json(200, json!({"ok": true})).ok(),
            ],
            true,
        );
        let mut account = Account::new(TOKEN).unwrap();

        let started = tokio::time::Instant::now();
        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();
        let waited = started.elapsed();

        assert!(
            waited >= Duration::from_secs(2) && waited <= Duration::from_secs(3),
            "expected reset - now + 1 seconds, waited {waited:?}"
        );
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, BOOTSTRAP_URL);
        assert_eq!(requests[1].url, BOOTSTRAP_URL);
        assert_eq!(header(&requests[2], "x-csrf-token"), Some("BOOT"));
        assert_eq!(account.csrf_token(), Some("BOOT"));
        assert_eq!(account.status(), AccountStatus::Good);
    }

    #[tokio::test]
    async fn rate_limited_bootstrap_without_wait_is_raised() {
        let reset = (unix_now() + 60).to_string();
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::status(200).cookie("ct0", "BOOT").ok(),
            ],
            false,
        );
        let mut account = Account::new(TOKEN).unwrap();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::RateLimited));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(account.csrf_token(), None);
    }

    #[tokio::test]
    async fn rate_limit_without_reset_header_is_raised() {
        let (pipeline, transport) = pipeline(vec![Reply::status(429).ok()], true);
        let mut account = account_with_csrf();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ApiErrorKind::RateLimited));
        assert_eq!(transport.request_count(), 1);
    }

    // --- cancellation ---

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_rate_limit_wait() {
        let reset = (unix_now() + 3_600).to_string();
        let (pipeline, transport) = pipeline(
            vec![
                Reply::status(429).header("x-rate-limit-reset", &reset).ok(),
                Reply::json(200, json!({})).ok(),
            ],
            true,
        );
        let token = CancellationToken::new();
        let pipeline = pipeline.with_cancellation(token.clone());
        let mut account = account_with_csrf();

        let canceller = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        };
        let (result, ()) = tokio::join!(
            pipeline.execute(&mut account, ApiRequest::get(API_URL)),
            canceller
        );

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(account.status(), AccountStatus::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_request() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![Reply::json(200, json!({})).ok()])
                .with_latency(Duration::from_secs(3_600)),
        );
        let token = CancellationToken::new();
        let pipeline = Pipeline::new(Arc::clone(&transport), PipelineConfig::default())
            .with_cancellation(token.clone());
        let mut account = account_with_csrf();

        let started = tokio::time::Instant::now();
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        };
        let (result, ()) = tokio::join!(
            pipeline.execute(&mut account, ApiRequest::get(API_URL)),
            canceller
        );

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(3_600));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(account.status(), AccountStatus::Unknown);
        assert_eq!(account.csrf_token(), Some("CT0"));
    }

    #[tokio::test]
    async fn cancelled_pipeline_sends_nothing() {
        let (pipeline, transport) = pipeline(vec![Reply::json(200, json!({})).ok()], true);
        let token = CancellationToken::new();
        token.cancel();
        let pipeline = pipeline.with_cancellation(token);
        let mut account = Account::new(TOKEN).unwrap();

        let err = pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.request_count(), 0);
    }

    // --- metrics ---

    #[tokio::test]
    async fn records_refresh_and_transition_metrics() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let (pipeline, _t) = pipeline(
            vec![
                Reply::json(403, json!({"errors": [{"code": 353, "message": "stale"}]}))
                    .cookie("ct0", "NEW")
                    .ok(),
                Reply::json(200, json!({})).ok(),
            ],
            false,
        );
        let mut account = account_with_csrf();
        pipeline
            .execute(&mut account, ApiRequest::get(API_URL))
            .await
            .unwrap();

        let output = handle.render();
        assert!(output.contains("pipeline_csrf_refresh_total 1"));
        assert!(output.contains("pipeline_requests_total{status=\"403\"} 1"));
        assert!(output.contains("pipeline_requests_total{status=\"200\"} 1"));
        assert!(output.contains("pipeline_status_transitions_total{to=\"GOOD\"} 1"));
    }
}
