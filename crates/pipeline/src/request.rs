//! Caller-facing request and response types

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Value;
use transport::RequestBody;

/// One API call as the endpoint layer describes it.
///
/// Headers and cookies set here win over the credential values the pipeline
/// attaches. The request is replayed verbatim on CSRF self-heal and
/// rate-limit retries.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: RequestBody,
    /// Whether a CSRF token must be bootstrapped before sending.
    pub requires_csrf: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: RequestBody::Empty,
            requires_csrf: true,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    /// Send without bootstrapping a CSRF token first.
    pub fn without_csrf(mut self) -> Self {
        self.requires_csrf = false;
        self
    }
}

/// Successful outcome of `Pipeline::execute`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON body, `None` when empty or not JSON.
    pub body: Option<Value>,
}

impl ApiResponse {
    /// Look up a value by JSON pointer (`/data/user/result`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.pointer(pointer))
    }
}
