//! Configuration management for opflow
//!
//! Configuration is loaded from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::poll::PollPolicy;

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Analysis backend base URL
    pub base_url: String,

    /// Impact graph submit path (poll strategy)
    pub impact_path: String,
    /// Job status path; the job id is appended
    pub status_path: String,
    /// Metadata extraction path (SSE)
    pub extract_path: String,
    /// NL-to-SQL path (NDJSON)
    pub react_path: String,

    /// Timeout for non-streaming requests
    pub request_timeout: Duration,
    /// TCP connect timeout, also applied to streams
    pub connect_timeout: Duration,

    /// Backoff and budget defaults for polled operations
    pub poll: PollPolicy,
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &str, default: Duration) -> Result<Duration> {
    var_or(name, default.as_millis() as u64).map(Duration::from_millis)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = PollPolicy::default();

        let multiplier: f64 = var_or("OPFLOW_POLL_MULTIPLIER", defaults.multiplier)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            anyhow::bail!("Invalid OPFLOW_POLL_MULTIPLIER: must be >= 1.0");
        }

        let poll = PollPolicy {
            default_interval: millis_or("OPFLOW_POLL_INTERVAL_MS", defaults.default_interval)?,
            multiplier,
            max_interval: millis_or("OPFLOW_POLL_MAX_INTERVAL_MS", defaults.max_interval)?,
            max_attempts: var_or("OPFLOW_POLL_MAX_ATTEMPTS", defaults.max_attempts)?,
            max_elapsed: millis_or("OPFLOW_POLL_MAX_ELAPSED_MS", defaults.max_elapsed)?,
        };

        Ok(Self {
            base_url: env::var("OPFLOW_BASE_URL")
                .context("OPFLOW_BASE_URL must be set")?
                .trim_end_matches('/')
                .to_string(),

            impact_path: env::var("OPFLOW_IMPACT_PATH")
                .unwrap_or_else(|_| "/api/impact/graph".to_string()),
            status_path: env::var("OPFLOW_STATUS_PATH")
                .unwrap_or_else(|_| "/api/jobs".to_string()),
            extract_path: env::var("OPFLOW_EXTRACT_PATH")
                .unwrap_or_else(|_| "/api/metadata/extract".to_string()),
            react_path: env::var("OPFLOW_REACT_PATH")
                .unwrap_or_else(|_| "/api/nl2sql/react".to_string()),

            request_timeout: Duration::from_secs(var_or("OPFLOW_REQUEST_TIMEOUT_SECS", 30u64)?),
            connect_timeout: Duration::from_secs(var_or("OPFLOW_CONNECT_TIMEOUT_SECS", 10u64)?),

            poll,
        })
    }

    /// Configuration pointing at `base_url` with every other value defaulted.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            impact_path: "/api/impact/graph".to_string(),
            status_path: "/api/jobs".to_string(),
            extract_path: "/api/metadata/extract".to_string(),
            react_path: "/api/nl2sql/react".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            poll: PollPolicy::default(),
        }
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
