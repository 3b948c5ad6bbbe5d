//! Shared HTTP client construction.

use crate::error::{Result, ScrapeError};
use std::time::Duration;

/// Browser-like user agent; some hosts reject script-identified clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// HTTP settings shared by every client in the pipeline
#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl HttpConfig {
    /// Config with an optional timeout in whole seconds
    pub fn with_timeout_secs(secs: Option<u64>) -> Self {
        Self {
            timeout: secs.map(Duration::from_secs),
        }
    }
}

/// Build an HTTP client with the browser user agent
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }

    builder
        .build()
        .map_err(|e| ScrapeError::Config(format!("Failed to build HTTP client: {}", e)))
}
