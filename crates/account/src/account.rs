//! Account model and credential setters

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{AUTH_TOKEN_COOKIE, AUTH_TOKEN_LEN, CSRF_COOKIE};
use crate::error::{Error, Result};

/// Health of an account as observed from API responses.
///
/// Transitions are decided by the request pipeline:
/// - Unknown → Good (clean 2xx)
/// - Unknown/Good → BadToken (401 with the invalid-token code)
/// - Unknown/Good → Suspended / Locked (403 or 2xx-with-errors carrying the code)
/// - BadToken, Suspended, Locked → (only `Account::reset` leaves them)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Unknown,
    Good,
    BadToken,
    Suspended,
    Locked,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 5] = [
        AccountStatus::Unknown,
        AccountStatus::Good,
        AccountStatus::BadToken,
        AccountStatus::Suspended,
        AccountStatus::Locked,
    ];

    /// Status label for file names and logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Unknown => "UNKNOWN",
            AccountStatus::Good => "GOOD",
            AccountStatus::BadToken => "BAD_TOKEN",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::Locked => "LOCKED",
        }
    }

    /// Sink states: nothing the pipeline observes moves an account out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AccountStatus::BadToken | AccountStatus::Suspended | AccountStatus::Locked
        )
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AccountStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AccountStatus::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Parse(format!("unknown account status: {s}")))
    }
}

/// Whether `token` looks like a primary token (40 lowercase hex characters).
pub fn is_valid_auth_token(token: &str) -> bool {
    token.len() == AUTH_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// One platform session identity.
///
/// Owned by exactly one task at a time; the pipeline borrows it mutably for
/// the duration of each call.
#[derive(Clone)]
pub struct Account {
    auth_token: Secret<String>,
    csrf_token: String,
    username: Option<String>,
    user_id: Option<u64>,
    status: AccountStatus,
}

impl Account {
    /// Create an account from a primary token. Status starts as `Unknown`.
    pub fn new(auth_token: impl Into<String>) -> Result<Self> {
        let auth_token = auth_token.into();
        if !is_valid_auth_token(&auth_token) {
            return Err(Error::InvalidToken(format!(
                "expected {AUTH_TOKEN_LEN} lowercase hex characters, got {} characters",
                auth_token.len()
            )));
        }
        Ok(Self {
            auth_token: Secret::new(auth_token),
            csrf_token: String::new(),
            username: None,
            user_id: None,
            status: AccountStatus::Unknown,
        })
    }

    /// Builder-style CSRF token, for accounts persisted with one.
    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = token.into();
        self
    }

    /// Build an account from an exported browser cookie list.
    ///
    /// Accepts `[{"name": "auth_token", "value": "..."}, ...]`, optionally
    /// base64-encoded. `auth_token` is required; `ct0` is picked up if present.
    pub fn from_cookies(raw: &str, base64: bool) -> Result<Self> {
        let decoded;
        let json = if base64 {
            let bytes = STANDARD
                .decode(raw.trim())
                .map_err(|e| Error::CookieParse(format!("invalid base64: {e}")))?;
            decoded = String::from_utf8(bytes)
                .map_err(|e| Error::CookieParse(format!("cookie blob is not UTF-8: {e}")))?;
            decoded.as_str()
        } else {
            raw
        };

        #[derive(Deserialize)]
        struct ExportedCookie {
            name: String,
            value: String,
        }

        let cookies: Vec<ExportedCookie> = serde_json::from_str(json)
            .map_err(|e| Error::CookieParse(format!("invalid cookie JSON: {e}")))?;

        let mut auth_token = None;
        let mut csrf_token = None;
        for cookie in cookies {
            match cookie.name.as_str() {
                AUTH_TOKEN_COOKIE => auth_token = Some(cookie.value),
                CSRF_COOKIE => csrf_token = Some(cookie.value),
                _ => {}
            }
        }

        let auth_token = auth_token
            .ok_or_else(|| Error::CookieParse(format!("no {AUTH_TOKEN_COOKIE} cookie found")))?;
        let account = Self::new(auth_token)?;
        Ok(match csrf_token {
            Some(ct0) => account.with_csrf_token(ct0),
            None => account,
        })
    }

    pub fn auth_token(&self) -> &str {
        self.auth_token.expose()
    }

    /// `abcd...wxyz`, safe to log.
    pub fn short_token(&self) -> String {
        let token = self.auth_token.expose();
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    }

    /// The CSRF token, or `None` while it is unknown.
    pub fn csrf_token(&self) -> Option<&str> {
        if self.csrf_token.is_empty() {
            None
        } else {
            Some(&self.csrf_token)
        }
    }

    /// Store a CSRF token. An empty string marks it unknown again.
    pub fn set_csrf_token(&mut self, token: impl Into<String>) {
        self.csrf_token = token.into();
        debug!(account = %self, known = !self.csrf_token.is_empty(), "csrf token set");
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Overwrite the status. Transition rules live in the pipeline.
    pub fn mark_status(&mut self, status: AccountStatus) {
        self.status = status;
    }

    /// Replace the primary token after an external credential rotation.
    ///
    /// Everything derived from the old token is dropped: CSRF token, identity,
    /// and status (back to `Unknown`).
    pub fn reset(&mut self, auth_token: impl Into<String>) -> Result<()> {
        let auth_token = auth_token.into();
        if !is_valid_auth_token(&auth_token) {
            return Err(Error::InvalidToken(format!(
                "expected {AUTH_TOKEN_LEN} lowercase hex characters, got {} characters",
                auth_token.len()
            )));
        }
        self.auth_token.replace(auth_token);
        self.csrf_token.clear();
        self.username = None;
        self.user_id = None;
        self.status = AccountStatus::Unknown;
        Ok(())
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    pub fn set_user_id(&mut self, user_id: u64) {
        self.user_id = Some(user_id);
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_token())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("auth_token", &self.short_token())
            .field("csrf_token", &self.csrf_token().map(|_| "[set]"))
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("status", &self.status)
            .finish()
    }
}
