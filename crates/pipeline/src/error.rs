//! Error taxonomy for pipeline calls
//!
//! `ApiError` is the typed view of a non-successful HTTP exchange: the kind is
//! derived from the status code (or from an error envelope on a 2xx), and the
//! sub-errors are extracted from the body so callers can branch on platform
//! codes without re-parsing anything. Everything that is not an HTTP outcome
//! (transport failures, cancellation, bootstrap exhaustion) is a separate
//! `Error` variant.

use std::fmt;

use serde_json::Value;
use transport::TransportError;

/// Status-derived error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimited,
    /// 500-599
    ServerError,
    /// Any other status outside 2xx
    Http,
    /// 2xx whose body carries an `errors`/`error` envelope
    Application,
}

impl ApiErrorKind {
    /// Kind for a non-2xx status. Returns `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorized),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            429 => Some(Self::RateLimited),
            500..=599 => Some(Self::ServerError),
            _ => Some(Self::Http),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Http => "http",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of a server error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubError {
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl fmt::Display for SubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code} - {message}"),
            (None, Some(message)) => f.write_str(message),
            (Some(code), None) => write!(f, "{code}"),
            (None, None) => Ok(()),
        }
    }
}

/// Typed HTTP/API failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} ({status}): {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: u16,
    /// Parsed JSON body, `None` when the body was empty or not JSON.
    pub body: Option<Value>,
    pub errors: Vec<SubError>,
    /// Every sub-error code, in body order.
    pub codes: Vec<i64>,
    /// Human-readable rendering of `errors`.
    pub message: String,
}

impl ApiError {
    pub fn has_code(&self, code: i64) -> bool {
        self.codes.contains(&code)
    }

    pub fn has_any_code(&self, codes: &[i64]) -> bool {
        codes.iter().any(|c| self.has_code(*c))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to obtain csrf token (bootstrap returned {status})")]
    CsrfTokenUnavailable { status: u16 },

    #[error("request cancelled")]
    Cancelled,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// The typed API error, if this is one.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ApiErrorKind> {
        self.api().map(|e| e.kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
