//! Scripted in-memory transport for pipeline tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use transport::{Result, Transport, TransportError, TransportRequest, TransportResponse};

pub const TOKEN: &str = "0123456789abcdef0123456789abcdef01234567";

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<TransportResponse>>>,
    requests: Mutex<Vec<TransportRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<TransportResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Hold every reply for `latency` before resolving.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())));
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            next
        })
    }
}

/// Response builder for scripts.
pub struct Reply(TransportResponse);

impl Reply {
    pub fn status(status: u16) -> Self {
        Self(TransportResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cookies: Vec::new(),
        })
    }

    pub fn json(status: u16, body: Value) -> Self {
        let mut reply = Self::status(status);
        reply.0.body = Bytes::from(body.to_string());
        reply
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.0.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.0.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }

    pub fn ok(self) -> Result<TransportResponse> {
        Ok(self.0)
    }
}

/// Header value on a recorded request.
pub fn header<'a>(request: &'a TransportRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}
