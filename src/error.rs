//! Error types for fetch-pool
//!
//! This module provides:
//! - The crate-wide [`Error`] used by configuration and the HTTP fetcher
//! - [`RetryError`], the terminal result of the retry wrapper
//! - [`TaskFailure`], the serializable descriptor stored in a failed result slot

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for fetch-pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetch-pool
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pool.limit")
        key: Option<String>,
    },

    /// The server answered with a non-success HTTP status
    #[error("HTTP error {status} fetching {url}")]
    Http {
        /// HTTP status code returned by the server
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Network error (connection, timeout, body transfer, decoding)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The task descriptor is not a valid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Terminal failure of the retry wrapper
///
/// `attempts` always counts operation invocations, so a task that failed
/// permanently on its first try reports `attempts == 1`.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with a non-retryable error
    #[error("permanent failure after {attempts} attempt(s): {error}")]
    Permanent {
        /// The error that ended the retry loop
        error: E,
        /// Number of attempts made
        attempts: u32,
    },

    /// Every retry was spent on retryable failures
    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    Exhausted {
        /// The last observed error
        last: E,
        /// Number of attempts made
        attempts: u32,
    },

    /// Cancellation was requested while waiting to retry
    #[error("cancelled after {attempts} attempt(s): {last}")]
    Cancelled {
        /// The last observed error
        last: E,
        /// Number of attempts made
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The last error the operation returned
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Permanent { error, .. } => error,
            RetryError::Exhausted { last, .. } | RetryError::Cancelled { last, .. } => last,
        }
    }

    /// Consume the retry error, returning the last error the operation returned
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent { error, .. } => error,
            RetryError::Exhausted { last, .. } | RetryError::Cancelled { last, .. } => last,
        }
    }
}

/// Classification of a stored task failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task failed with an error that retrying would not fix
    Permanent,
    /// The task kept failing transiently until its retry budget ran out
    RetriesExhausted,
    /// The task was not run (or stopped waiting to retry) because the batch was cancelled
    Cancelled,
    /// The task was not run because the batch deadline elapsed
    DeadlineExceeded,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Permanent => "permanent",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::Cancelled => "cancelled",
            FailureKind::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(s)
    }
}

/// Failure descriptor recorded in a task's result slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct TaskFailure {
    /// What kind of terminal failure this was
    pub kind: FailureKind,
    /// Human-readable description of the last error
    pub message: String,
    /// Number of operation attempts made (0 if the task never started)
    pub attempts: u32,
}

impl TaskFailure {
    /// Create a failure descriptor
    pub fn new(kind: FailureKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts,
        }
    }

    /// Descriptor for a task that never ran because the batch was cancelled
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "batch cancelled before task started", 0)
    }

    /// Descriptor for a task that never ran because the batch deadline elapsed
    pub fn deadline_exceeded() -> Self {
        Self::new(
            FailureKind::DeadlineExceeded,
            "batch deadline elapsed before task started",
            0,
        )
    }
}

impl<E: std::fmt::Display> From<RetryError<E>> for TaskFailure {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Permanent { error, attempts } => {
                TaskFailure::new(FailureKind::Permanent, error.to_string(), attempts)
            }
            RetryError::Exhausted { last, attempts } => {
                TaskFailure::new(FailureKind::RetriesExhausted, last.to_string(), attempts)
            }
            RetryError::Cancelled { last, attempts } => {
                TaskFailure::new(FailureKind::Cancelled, last.to_string(), attempts)
            }
        }
    }
}

/// A bare crate error reaching the pool was never retried
impl From<Error> for TaskFailure {
    fn from(err: Error) -> Self {
        TaskFailure::new(FailureKind::Permanent, err.to_string(), 1)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_error_accessors_report_attempts_and_last_error() {
        let err: RetryError<String> = RetryError::Exhausted {
            last: "503".to_string(),
            attempts: 4,
        };
        assert_eq!(err.attempts(), 4);
        assert_eq!(err.last_error(), "503");
        assert_eq!(err.into_inner(), "503");
    }

    #[test]
    fn exhausted_converts_to_retries_exhausted_failure() {
        let err: RetryError<Error> = RetryError::Exhausted {
            last: Error::Http {
                status: 503,
                url: "http://example.com/a".to_string(),
            },
            attempts: 4,
        };
        let failure = TaskFailure::from(err);

        assert_eq!(failure.kind, FailureKind::RetriesExhausted);
        assert_eq!(failure.attempts, 4);
        assert_eq!(failure.message, "HTTP error 503 fetching http://example.com/a");
    }

    #[test]
    fn permanent_converts_to_permanent_failure() {
        let err: RetryError<Error> = RetryError::Permanent {
            error: Error::InvalidUrl("not a url".to_string()),
            attempts: 1,
        };
        let failure = TaskFailure::from(err);

        assert_eq!(failure.kind, FailureKind::Permanent);
        assert_eq!(failure.attempts, 1);
    }

    #[test]
    fn bare_error_counts_as_single_permanent_attempt() {
        let failure = TaskFailure::from(Error::Other("boom".to_string()));
        assert_eq!(failure, TaskFailure::new(FailureKind::Permanent, "boom", 1));
    }

    #[test]
    fn task_failure_serializes_kind_in_snake_case() {
        let json = serde_json::to_value(TaskFailure::deadline_exceeded()).unwrap();
        assert_eq!(json["kind"], "deadline_exceeded");
        assert_eq!(json["attempts"], 0);
    }

    #[test]
    fn task_failure_display_includes_kind_and_message() {
        let failure = TaskFailure::new(FailureKind::Permanent, "HTTP error 404", 1);
        assert_eq!(failure.to_string(), "permanent: HTTP error 404");
    }
}
