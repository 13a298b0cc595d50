//! Authenticated request pipeline for the platform's private web API
//!
//! `Pipeline::execute` is the single entry point every API call goes through.
//! It attaches the account's credentials, bootstraps and self-heals the CSRF
//! token, waits out rate limits when configured to, classifies failures into
//! `ApiError`, and keeps `Account::status` in step with what the server
//! reveals about the account.
//!
//! The network itself sits behind `transport::Transport`; the pipeline holds
//! no cross-account state, so one pipeline per account (or per worker) can be
//! driven concurrently.

pub mod cancel;
pub mod classify;
pub mod codes;
pub mod constants;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod pipeline;
pub mod request;

#[cfg(test)]
pub(crate) mod test_support;

pub use cancel::CancellationToken;
pub use classify::{classify, parse_body};
pub use codes::StatusCodes;
pub use error::{ApiError, ApiErrorKind, Error, Result, SubError};
pub use identity::UserData;
pub use pipeline::{Pipeline, PipelineConfig, next_status, rate_limit_delay};
pub use request::{ApiRequest, ApiResponse};
