//! Client configuration
//!
//! Configuration is plain TOML. Every retry knob is optional: a missing or
//! zero value resolves to its documented default through the accessors on
//! [`RetryConfig`], never by reading the raw field.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default B2 API endpoint used for account authorization
pub const DEFAULT_API_URL: &str = "https://api.backblazeb2.com";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_JITTER_MS: u64 = 1000;
const DEFAULT_MIN_MS: u64 = 1000;
const DEFAULT_UNIT_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Retry configuration
///
/// Durations are stored in milliseconds. `max_ms == 0` means the backoff
/// delay has no upper bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub jitter_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub unit_ms: u64,
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            self.max_attempts
        }
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(non_zero_or(self.jitter_ms, DEFAULT_JITTER_MS))
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(non_zero_or(self.min_ms, DEFAULT_MIN_MS))
    }

    /// Upper clamp for backoff; zero means unbounded
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn unit(&self) -> Duration {
        Duration::from_millis(non_zero_or(self.unit_ms, DEFAULT_UNIT_MS))
    }
}

fn non_zero_or(value: u64, default: u64) -> u64 {
    if value == 0 { default } else { value }
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone, Default)]
pub struct RetryBuilder {
    config: RetryConfig,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter_ms = duration_ms(jitter);
        self
    }

    pub fn min(mut self, min: Duration) -> Self {
        self.config.min_ms = duration_ms(min);
        self
    }

    pub fn max(mut self, max: Duration) -> Self {
        self.config.max_ms = duration_ms(max);
        self
    }

    pub fn unit(mut self, unit: Duration) -> Self {
        self.config.unit_ms = duration_ms(unit);
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL used for `b2_authorize_account`
    pub api_url: Option<String>,

    /// User-Agent sent with every request
    pub user_agent: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn api_url(&self) -> Result<Url> {
        let raw = self.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        Url::parse(raw).map_err(|e| Error::Config(format!("invalid api_url '{raw}': {e}")))
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("b2c/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(
            self.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ))
    }
}
