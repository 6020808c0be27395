//! Configuration types for fetch-pool

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a batch run
///
/// Groups the settings of the three layers a batch goes through:
/// - [`retry`](RetryConfig) — per-task retry budget and backoff
/// - [`pool`](PoolConfig) — concurrency limit and batch deadline
/// - [`fetch`](FetchConfig) — HTTP client settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Retry behavior for each task
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool behavior
    #[serde(default)]
    pub pool: PoolConfig,

    /// HTTP client settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Config {
    /// Check every sub-config, returning the first invalid setting found
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.pool.validate()?;
        self.fetch.validate()
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    ///
    /// When enabled each delay is stretched by up to 100%, so successive
    /// waits are no longer guaranteed to be non-decreasing.
    #[serde(default)]
    pub jitter: bool,

    /// Retry failures where no response was received at all (default: true)
    ///
    /// Connection refused, DNS failure, timeouts and broken transfers fall
    /// into this class. Server-side (5xx) failures are always retried.
    #[serde(default = "default_true")]
    pub retry_transport_failures: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
            retry_transport_failures: true,
        }
    }
}

impl RetryConfig {
    /// Validate the retry settings
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(config_error(
                "initial_delay must be greater than zero",
                "retry.initial_delay",
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(config_error(
                format!(
                    "backoff_multiplier must be at least 1.0, got {}",
                    self.backoff_multiplier
                ),
                "retry.backoff_multiplier",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(config_error(
                format!(
                    "max_delay ({} ms) must not be smaller than initial_delay ({} ms)",
                    self.max_delay.as_millis(),
                    self.initial_delay.as_millis()
                ),
                "retry.max_delay",
            ));
        }
        Ok(())
    }
}

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of tasks in flight at once (default: 2)
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Stop claiming new tasks once this much time has passed (default: none)
    ///
    /// Tasks already running are left to finish.
    #[serde(default, with = "optional_duration_millis")]
    pub deadline: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            deadline: None,
        }
    }
}

impl PoolConfig {
    /// Validate the pool settings
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(config_error("limit must be at least 1", "pool.limit"));
        }
        Ok(())
    }
}

/// HTTP client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_millis")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// Validate the HTTP client settings
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(config_error(
                "timeout must be greater than zero",
                "fetch.timeout",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    2
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("fetch-pool/", env!("CARGO_PKG_VERSION")).to_string()
}

// Duration serialization helper (integer milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
