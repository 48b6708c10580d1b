//! Router client configuration from environment.

use std::env;
use std::time::Duration;

use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Built-in backend profile used to snap single positions.
    pub locate_profile: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:17777".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            locate_profile: "trekking".to_string(),
        }
    }
}

impl RouterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("VELO_ROUTER_URL").unwrap_or(defaults.base_url),
            timeout: env::var("VELO_ROUTER_TIMEOUT_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            retry: RetryPolicy::new(
                env::var("VELO_ROUTER_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_RETRIES),
                env::var("VELO_ROUTER_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.delay),
            ),
            locate_profile: env::var("VELO_LOCATE_PROFILE").unwrap_or(defaults.locate_profile),
        }
    }
}
