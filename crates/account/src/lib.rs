//! Per-account credential state
//!
//! An `Account` holds the long-lived primary token, the short-lived CSRF token,
//! lazily resolved identity, and a health `AccountStatus`. The request pipeline
//! is the only code that mutates the CSRF token and status during a run; the
//! operations here are plain setters with no transition logic.
//!
//! Persistence is file based:
//! - `store::load_status_dir` / `store::save_status_dir` read and write one
//!   `<STATUS>.txt` file per status, one `auth_token[:extra...]` line per account
//! - `store::load_snapshot` / `store::save_snapshot` round-trip the full state
//!   as JSON

pub mod account;
pub mod constants;
pub mod error;
pub mod store;

pub use account::{Account, AccountStatus, is_valid_auth_token};
pub use constants::*;
pub use error::{Error, Result};
