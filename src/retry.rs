//! Retry logic with exponential backoff
//!
//! Wraps a single asynchronous operation with bounded retries. Failures are
//! classified into three classes ([`FailureClass`]): transient failures are
//! retried, permanent failures end the loop immediately, and transport
//! failures (no response at all) are retried only when
//! [`RetryConfig::retry_transport_failures`] is set.
//!
//! # Example
//!
//! ```no_run
//! use fetch_pool::retry::{Classify, FailureClass, with_retry};
//! use fetch_pool::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Overloaded,
//!     BadRequest,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl Classify for MyError {
//!     fn classify(&self) -> FailureClass {
//!         match self {
//!             MyError::Overloaded => FailureClass::Transient,
//!             MyError::BadRequest => FailureClass::Permanent,
//!         }
//!     }
//! }
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, RetryError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a failed attempt should be treated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Likely to succeed if retried (server overload, 5xx)
    Transient,
    /// Will not be fixed by retrying (4xx, malformed input)
    Permanent,
    /// No response was received at all (connection refused, timeout)
    Transport,
}

/// Trait for errors that can be classified for retry purposes
pub trait Classify {
    /// Returns the failure class of this error
    fn classify(&self) -> FailureClass;
}

impl Classify for Error {
    fn classify(&self) -> FailureClass {
        match self {
            // 5xx is the server telling us to come back later
            Error::Http { status, .. } if *status >= 500 => FailureClass::Transient,
            Error::Http { .. } => FailureClass::Permanent,
            Error::Network(e) => {
                if let Some(status) = e.status() {
                    if status.is_server_error() {
                        FailureClass::Transient
                    } else {
                        FailureClass::Permanent
                    }
                } else if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
                    FailureClass::Transport
                } else {
                    // Decode and builder errors
                    FailureClass::Permanent
                }
            }
            Error::Config { .. }
            | Error::InvalidUrl(_)
            | Error::Serialization(_)
            | Error::Other(_) => FailureClass::Permanent,
        }
    }
}

impl FailureClass {
    /// Whether a failure of this class may be retried under `config`
    pub fn is_retryable(self, config: &RetryConfig) -> bool {
        match self {
            FailureClass::Transient => true,
            FailureClass::Transport => config.retry_transport_failures,
            FailureClass::Permanent => false,
        }
    }
}

/// Shortest delay a retry will wait
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Successive backoff delays for a retry configuration, before jitter
///
/// The k-th item (1-based) is `initial_delay * backoff_multiplier^(k-1)`,
/// capped at `max_delay`. The sequence is infinite and non-decreasing.
///
/// Settings that [`RetryConfig::validate`] would reject are clamped rather
/// than trusted: a multiplier below 1.0 (or NaN) is treated as 1.0 and
/// delays never drop below one millisecond.
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    /// Start the delay sequence for `config`
    pub fn new(config: &RetryConfig) -> Self {
        let max = config.max_delay.max(MIN_RETRY_DELAY);
        Self {
            current: config.initial_delay.max(MIN_RETRY_DELAY).min(max),
            // f64::max returns 1.0 for NaN
            multiplier: config.backoff_multiplier.max(1.0),
            max,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        let next_secs = delay.as_secs_f64() * self.multiplier;
        // Saturate at the cap instead of overflowing Duration
        self.current = if next_secs.is_finite() && next_secs < self.max.as_secs_f64() {
            Duration::try_from_secs_f64(next_secs)
                .unwrap_or(self.max)
                .max(delay)
        } else {
            self.max
        };
        Some(delay)
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (retry budget, delays, multiplier, jitter, transport policy)
/// * `operation` - Closure producing one attempt, returning `Result<T, E>` where `E: Classify`
///
/// # Returns
///
/// The successful value, [`RetryError::Permanent`] on the first non-retryable
/// failure, or [`RetryError::Exhausted`] after `max_retries` retries
/// (`max_retries + 1` attempts).
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    retry_loop(config, None, operation).await
}

/// Like [`with_retry`], but stops waiting when `cancel` fires during a backoff delay
///
/// An attempt already in progress is never interrupted. If the token fires
/// while waiting to retry, [`RetryError::Cancelled`] carries the last error.
pub async fn with_retry_cancellable<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    retry_loop(config, Some(cancel), operation).await
}

async fn retry_loop<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: Option<&CancellationToken>,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut attempts: u32 = 0;
    let mut delays = Backoff::new(config);

    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        let class = error.classify();
        if !class.is_retryable(config) {
            tracing::error!(error = %error, ?class, attempts, "Operation failed with non-retryable error");
            return Err(RetryError::Permanent { error, attempts });
        }
        if attempts > config.max_retries {
            tracing::error!(
                error = %error,
                attempts,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(RetryError::Exhausted {
                last: error,
                attempts,
            });
        }

        let base_delay = delays.next().unwrap_or(config.max_delay);
        let delay = if config.jitter {
            add_jitter(base_delay)
        } else {
            base_delay
        };

        tracing::warn!(
            error = %error,
            ?class,
            attempt = attempts,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying"
        );

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => {
                        tracing::debug!(attempts, "Retry wait cancelled");
                        return Err(RetryError::Cancelled { last: error, attempts });
                    }
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
        .unwrap_or(Duration::MAX)
}
