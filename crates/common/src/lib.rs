//! Shared building blocks for the account automation workspace
//!
//! Holds the redacting `Secret` wrapper used for account credentials and the
//! configuration error type shared by the service crates.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
