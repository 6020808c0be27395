//! # fetch-pool
//!
//! Run a batch of independent async tasks with a concurrency limit and
//! per-task retries, and get back one outcome per task in input order.
//!
//! ## Design Philosophy
//!
//! fetch-pool is designed to be:
//! - **Partial-success first** - One task's failure never aborts its siblings
//! - **Order preserving** - `outcomes[i]` always belongs to input `i`
//! - **Explicit about retries** - Transient, permanent and transport failures are separate classes
//! - **Library-first** - Results are returned as values; printing is up to the caller
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetch_pool::{Config, fetch_all_json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.pool.limit = 2;
//!     config.retry.max_retries = 3;
//!
//!     let urls = [
//!         "https://jsonplaceholder.typicode.com/posts/1",
//!         "https://jsonplaceholder.typicode.com/posts/2",
//!     ];
//!     let report = fetch_all_json::<serde_json::Value, _>(urls, &config).await?;
//!
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! Any async work can go through the pool directly:
//!
//! ```no_run
//! use fetch_pool::{RetryConfig, pool::run_bounded, retry::with_retry};
//!
//! # async fn example() -> fetch_pool::Result<()> {
//! let retry = RetryConfig::default();
//! let tasks = (0..10u32).map(|i| {
//!     let retry = retry.clone();
//!     move || async move { with_retry(&retry, || async move { Ok::<_, fetch_pool::Error>(i) }).await }
//! });
//!
//! let report = run_bounded(tasks, 4).await?;
//! assert_eq!(report.len(), 10);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP fetching
pub mod fetch;
/// Bounded-concurrency task pool
pub mod pool;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FetchConfig, PoolConfig, RetryConfig};
pub use error::{Error, FailureKind, Result, RetryError, TaskFailure};
pub use fetch::{Fetcher, fetch_all_json, fetch_all_json_with};
pub use pool::TaskPool;
pub use retry::{Backoff, Classify, FailureClass};
pub use types::{BatchReport, Event, TaskOutcome};
