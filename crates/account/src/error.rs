//! Error types for account construction and persistence

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid auth token: {0}")]
    InvalidToken(String),

    #[error("cookie parse error: {0}")]
    CookieParse(String),

    #[error("account file parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
