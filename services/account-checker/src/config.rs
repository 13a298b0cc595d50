//! Configuration types and loading
//!
//! Config path precedence: `--config` arg > `CONFIG_PATH` env var >
//! `account-checker.toml`. Every section except `[checker]` has defaults, so
//! the minimal config is a single `accounts_dir` line.

use account::{AUTH_TOKEN_COOKIE, CSRF_COOKIE};
use pipeline::constants::{API_HEADERS, BOOTSTRAP_URL, CSRF_HEADER, RATE_LIMIT_RESET_HEADER};
use pipeline::{PipelineConfig, StatusCodes};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub checker: CheckerConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub codes: StatusCodes,
    /// Extra headers layered over the built-in API headers.
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Fan-out settings
#[derive(Debug, Deserialize)]
pub struct CheckerConfig {
    /// Directory holding `UNKNOWN.txt`, `GOOD.txt`, ...
    pub accounts_dir: PathBuf,
    /// One proxy per line. Accounts go direct when absent.
    #[serde(default)]
    pub proxies_file: Option<PathBuf>,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    /// Prometheus textfile written at the end of the run.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

/// Request pipeline settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub wait_on_rate_limit: bool,
    pub timeout_secs: u64,
    pub bootstrap_url: String,
    pub rate_limit_reset_header: String,
    pub csrf_cookie: String,
    pub auth_cookie: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            wait_on_rate_limit: true,
            timeout_secs: 30,
            bootstrap_url: BOOTSTRAP_URL.to_string(),
            rate_limit_reset_header: RATE_LIMIT_RESET_HEADER.to_string(),
            csrf_cookie: CSRF_COOKIE.to_string(),
            auth_cookie: AUTH_TOKEN_COOKIE.to_string(),
        }
    }
}

/// Header sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

fn default_max_tasks() -> usize {
    100
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.checker.max_tasks == 0 {
            return Err(common::Error::Config(
                "max_tasks must be greater than 0".into(),
            ));
        }

        if self.pipeline.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.pipeline.bootstrap_url.starts_with("http://")
            && !self.pipeline.bootstrap_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "bootstrap_url must start with http:// or https://, got: {}",
                self.pipeline.bootstrap_url
            )));
        }

        if self.pipeline.csrf_cookie.is_empty() || self.pipeline.auth_cookie.is_empty() {
            return Err(common::Error::Config(
                "csrf_cookie and auth_cookie must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("account-checker.toml")
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            wait_on_rate_limit: self.pipeline.wait_on_rate_limit,
            bootstrap_url: self.pipeline.bootstrap_url.clone(),
            rate_limit_reset_header: self.pipeline.rate_limit_reset_header.clone(),
            auth_cookie: self.pipeline.auth_cookie.clone(),
            csrf_cookie: self.pipeline.csrf_cookie.clone(),
            csrf_header: CSRF_HEADER.to_string(),
            codes: self.codes.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.timeout_secs)
    }

    /// Built-in API headers followed by the configured ones.
    pub fn transport_headers(&self) -> Vec<(String, String)> {
        API_HEADERS
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .chain(self.headers.iter().map(|h| (h.name.clone(), h.value.clone())))
            .collect()
    }
}
