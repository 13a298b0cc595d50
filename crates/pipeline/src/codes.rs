//! Platform sub-error codes that drive account status
//!
//! The numeric values are empirical and drift over time, so they are
//! configuration (`[codes]` in the checker config) with the currently
//! observed values as defaults.

use account::AccountStatus;
use serde::Deserialize;

use crate::error::ApiError;

fn default_bad_token() -> Vec<i64> {
    vec![32]
}

fn default_suspended() -> Vec<i64> {
    vec![64, 141]
}

fn default_locked() -> Vec<i64> {
    vec![326]
}

fn default_stale_csrf() -> Vec<i64> {
    vec![353]
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusCodes {
    /// 401 codes meaning the primary token is invalid.
    #[serde(default = "default_bad_token")]
    pub bad_token: Vec<i64>,

    /// 403 / 2xx codes meaning the account is suspended.
    #[serde(default = "default_suspended")]
    pub suspended: Vec<i64>,

    /// 403 / 2xx codes meaning the account is locked.
    #[serde(default = "default_locked")]
    pub locked: Vec<i64>,

    /// 403 codes meaning the CSRF token is stale.
    #[serde(default = "default_stale_csrf")]
    pub stale_csrf: Vec<i64>,
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self {
            bad_token: default_bad_token(),
            suspended: default_suspended(),
            locked: default_locked(),
            stale_csrf: default_stale_csrf(),
        }
    }
}

impl StatusCodes {
    /// Account health revealed by a 403 or an application error.
    ///
    /// Locked wins when both locked and suspended codes are present.
    pub fn health_signal(&self, error: &ApiError) -> Option<AccountStatus> {
        if error.has_any_code(&self.locked) {
            Some(AccountStatus::Locked)
        } else if error.has_any_code(&self.suspended) {
            Some(AccountStatus::Suspended)
        } else {
            None
        }
    }

    pub fn is_bad_token(&self, error: &ApiError) -> bool {
        error.has_any_code(&self.bad_token)
    }

    pub fn is_stale_csrf(&self, error: &ApiError) -> bool {
        error.has_any_code(&self.stale_csrf)
    }
}
