//! Proxy endpoint parsing
//!
//! Proxy lists arrive in whatever format the seller used. Accepted shapes,
//! each with an optional `scheme://` prefix (default `http`), tried in order:
//!
//! - `login:password@host:port` and `login:password:host:port`
//! - `host:port@login:password` and `host:port:login:password`
//! - `host:port`

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::TransportError;

static PROXY_FORMATS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"^(?:(?P<scheme>.+)://)?(?P<login>[^:]+):(?P<password>[^@|:]+)[@|:](?P<host>[^:]+):(?P<port>\d+)$",
        r"^(?:(?P<scheme>.+)://)?(?P<host>[^:]+):(?P<port>\d+)[@|:](?P<login>[^:]+):(?P<password>[^:]+)$",
        r"^(?:(?P<scheme>.+)://)?(?P<host>[^:]+):(?P<port>\d+)$",
    ]
    .map(|pattern| Regex::new(pattern).expect("invalid proxy format regex"))
});

/// A pre-resolved proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub login: Option<String>,
    pub password: Option<String>,
}

impl Proxy {
    /// URL form understood by reqwest, with credentials percent-encoded.
    pub fn as_url(&self) -> Result<Url, TransportError> {
        let invalid = || TransportError::Build(format!("invalid proxy url for {self}"));
        let mut url = Url::parse(&format!("{}://{}:{}", self.scheme, self.host, self.port))
            .map_err(|e| TransportError::Build(format!("proxy {self}: {e}")))?;
        if let (Some(login), Some(password)) = (&self.login, &self.password) {
            url.set_username(login).map_err(|()| invalid())?;
            url.set_password(Some(password)).map_err(|()| invalid())?;
        }
        Ok(url)
    }
}

impl fmt::Display for Proxy {
    // Never prints credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Proxy {
    type Err = TransportError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let unsupported = || TransportError::Build(format!("unsupported proxy format: {raw}"));

        let caps = PROXY_FORMATS
            .iter()
            .find_map(|format| format.captures(raw))
            .ok_or_else(unsupported)?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        let port = caps["port"].parse::<u16>().map_err(|_| unsupported())?;
        Ok(Self {
            scheme: group("scheme").unwrap_or_else(|| "http".to_string()),
            host: caps["host"].to_string(),
            port,
            login: group("login"),
            password: group("password"),
        })
    }
}

/// Parse one proxy per non-empty line, skipping `#` comments.
pub fn parse_proxy_list(contents: &str) -> Result<Vec<Proxy>, TransportError> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(Proxy::from_str)
        .collect()
}
