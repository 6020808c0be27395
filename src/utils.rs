//! Small stateful call wrappers and collection helpers

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Lets a call through at most once per interval
///
/// The first call always runs. Later calls run only if `interval` has passed
/// since the last call that ran; others are dropped.
///
/// # Examples
///
/// ```
/// use fetch_pool::utils::Throttle;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut throttle = Throttle::new(Duration::from_secs(1));
/// assert_eq!(throttle.call(|| 1), Some(1));
/// assert_eq!(throttle.call(|| 2), None);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl Throttle {
    /// Create a throttle admitting one call per `interval`
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// Run `f` if the interval has elapsed, returning its result
    pub fn call<R>(&mut self, f: impl FnOnce() -> R) -> Option<R> {
        let now = Instant::now();
        if let Some(last) = self.last_run
            && now.duration_since(last) < self.interval
        {
            return None;
        }
        self.last_run = Some(now);
        Some(f())
    }

    /// Forget the last call so the next one runs immediately
    pub fn reset(&mut self) {
        self.last_run = None;
    }
}

/// Delays a call until no newer call has arrived for `delay`
///
/// Each [`call`](Debouncer::call) replaces the pending invocation. An
/// invocation whose delay has already elapsed is not affected. Dropping the
/// debouncer cancels the pending invocation. Must be used inside a Tokio
/// runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `fut` to run after the quiet period, replacing any pending call
    pub fn call<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach so a later call cannot abort an invocation that already fired
            tokio::spawn(fut);
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending invocation, if any
    pub fn cancel(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pending) = pending {
            pending.abort();
        }
    }

    /// Returns true while an invocation is waiting for its quiet period
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Group items by key, keeping input order within each group
///
/// # Examples
///
/// ```
/// use fetch_pool::utils::group_by;
///
/// let groups = group_by(vec![1, 2, 3, 4, 5], |n| n % 2 == 0);
/// assert_eq!(groups[&false], vec![1, 3, 5]);
/// assert_eq!(groups[&true], vec![2, 4]);
/// ```
pub fn group_by<I, K, F>(items: I, mut key: F) -> BTreeMap<K, Vec<I::Item>>
where
    I: IntoIterator,
    K: Ord,
    F: FnMut(&I::Item) -> K,
{
    let mut groups: BTreeMap<K, Vec<I::Item>> = BTreeMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}
