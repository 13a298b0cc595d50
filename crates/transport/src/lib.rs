//! Transport boundary for the request pipeline
//!
//! Defines the `Transport` trait that decouples the pipeline from the actual
//! network session. `HttpTransport` is the reqwest-backed implementation (one
//! per account or per worker, optionally bound to a proxy); tests substitute a
//! scripted in-memory transport.
//!
//! The transport knows nothing about accounts or error taxonomies: it sends
//! exactly what it is given and returns status, headers, raw body and the
//! cookies the server set. Connection failures and timeouts surface as
//! `TransportError`, never as HTTP statuses.

pub mod cookies;
pub mod http;
pub mod proxy;

pub use http::{HttpTransport, HttpTransportConfig};
pub use proxy::Proxy;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::future::Future;
use std::pin::Pin;

/// Request body variants accepted by the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A fully assembled outgoing request.
///
/// `cookies` are sent as a single `Cookie` header; they are not stored in any
/// client-side jar.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    pub body: RequestBody,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Value of an outgoing cookie, if set.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response as seen on the wire.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `(name, value)` pairs from every `Set-Cookie` header, in order.
    pub cookies: Vec<(String, String)>,
}

impl TransportResponse {
    /// Last value the server set for `name`.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Errors below the HTTP layer. Never mapped onto the API error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid transport configuration: {0}")]
    Build(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Abstraction over the network session.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Box<dyn Transport>`, `Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Perform one request. Must not retry and must not follow redirects.
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>> {
        (**self).send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(cookies: Vec<(&str, &str)>) -> TransportResponse {
        TransportResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cookies: cookies
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn response_cookie_returns_last_value() {
        let resp = response(vec![("ct0", "first"), ("guest_id", "g"), ("ct0", "second")]);
        assert_eq!(resp.cookie("ct0"), Some("second"));
        assert_eq!(resp.cookie("guest_id"), Some("g"));
        assert_eq!(resp.cookie("missing"), None);
    }

    #[test]
    fn response_header_lookup() {
        let mut resp = response(vec![]);
        resp.headers
            .insert("x-rate-limit-reset", HeaderValue::from_static("1700000000"));
        assert_eq!(resp.header("x-rate-limit-reset"), Some("1700000000"));
        assert_eq!(resp.header("X-Rate-Limit-Reset"), Some("1700000000"));
        assert_eq!(resp.header("retry-after"), None);
    }

    #[test]
    fn request_defaults_are_empty() {
        let req = TransportRequest::new(Method::GET, "https://example.com");
        assert!(req.query.is_empty());
        assert!(req.headers.is_empty());
        assert!(req.cookies.is_empty());
        assert_eq!(req.body, RequestBody::Empty);
        assert_eq!(req.cookie("auth_token"), None);
    }
}
