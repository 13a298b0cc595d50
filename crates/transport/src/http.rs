//! reqwest-backed transport
//!
//! One `HttpTransport` per account (or per worker). The proxy, when present,
//! is resolved before construction and bound to the underlying client for its
//! whole lifetime. Redirects are not followed and no cookie jar is kept: the
//! pipeline owns every cookie that goes out. Cookies set by a response are
//! surfaced on `TransportResponse::cookies` in header order.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use crate::cookies::render_cookie_header;
use crate::{
    Proxy, RequestBody, Result, Transport, TransportError, TransportRequest, TransportResponse,
};

/// Chrome-on-Windows header set sent with every request unless overridden.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("accept", "*/*"),
    ("accept-language", "en-US,en"),
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36",
    ),
    (
        "sec-ch-ua",
        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"110\", \"Google Chrome\";v=\"110\"",
    ),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
];

/// Construction options for `HttpTransport`.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub proxy: Option<Proxy>,
    pub timeout: Duration,
    /// Extra default headers layered over the browser set.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    proxy: Option<Proxy>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.timeout)
            .default_headers(default_headers(&config.headers));

        if let Some(proxy) = &config.proxy {
            let resolved = reqwest::Proxy::all(proxy.as_url()?.as_str())
                .map_err(|e| TransportError::Build(format!("proxy {proxy}: {e}")))?;
            builder = builder.proxy(resolved);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        debug!(proxy = ?config.proxy.as_ref().map(ToString::to_string), "http transport ready");
        Ok(Self {
            client,
            proxy: config.proxy,
        })
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);

            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if !request.cookies.is_empty() {
                builder = builder.header(COOKIE, render_cookie_header(&request.cookies));
            }
            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(&value),
                RequestBody::Form(fields) => builder.form(&fields),
            };

            let response = builder.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let cookies = response
                .cookies()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect();
            let body = response.bytes().await.map_err(map_reqwest_error)?;

            Ok(TransportResponse {
                status,
                headers,
                body,
                cookies,
            })
        })
    }
}

/// Browser header set with configured overrides applied on top.
fn default_headers(extra: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = BROWSER_HEADERS
        .iter()
        .map(|(n, v)| (*n, *v))
        .chain(extra.iter().map(|(n, v)| (n.as_str(), v.as_str())));

    for (name, value) in pairs {
        let name = match HeaderName::from_str(name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
    headers
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
