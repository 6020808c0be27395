//! Bounded-concurrency task pool
//!
//! [`TaskPool::run`] executes a batch of zero-argument async tasks with at
//! most `limit` of them in flight. `min(limit, N)` worker loops share one
//! atomic cursor: each worker claims the next index, awaits that task, and
//! records the outcome in the task's own write-once slot. A failing task is
//! stored as a [`TaskFailure`] and never disturbs its siblings, so a run
//! always resolves with one outcome per task, in input order.
//!
//! Workers are plain futures joined in the caller's task. Claiming happens
//! before the first suspension point of a task, so claim order is strictly
//! increasing while completion order is not.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::{Result, TaskFailure};
use crate::types::{BatchReport, Event, TaskOutcome};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Why workers stopped claiming before the queue ran dry
#[derive(Clone, Copy, Debug)]
enum StopReason {
    Cancelled,
    DeadlineExceeded,
}

/// Runs batches of tasks with a concurrency limit
///
/// # Example
///
/// ```no_run
/// use fetch_pool::config::PoolConfig;
/// use fetch_pool::pool::TaskPool;
/// use fetch_pool::error::TaskFailure;
///
/// # async fn example() -> fetch_pool::Result<()> {
/// let pool = TaskPool::new(PoolConfig { limit: 2, deadline: None })?;
///
/// let tasks = (0..5u32).map(|i| move || async move { Ok::<_, TaskFailure>(i * 10) });
/// let report = pool.run(tasks).await;
///
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TaskPool {
    config: PoolConfig,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl TaskPool {
    /// Create a pool, rejecting an invalid configuration
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
            event_tx,
        })
    }

    /// Subscribe to task lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops workers from claiming further tasks when cancelled
    ///
    /// Cancellation is permanent for this pool: later runs record every task
    /// as cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop claiming new tasks; tasks already in flight run to completion
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run every task, returning one outcome per task in input order
    ///
    /// Never fails as a whole. Tasks left unclaimed because of cancellation
    /// or the configured deadline are recorded as
    /// [`FailureKind::Cancelled`](crate::error::FailureKind::Cancelled) or
    /// [`FailureKind::DeadlineExceeded`](crate::error::FailureKind::DeadlineExceeded).
    pub async fn run<I, F, Fut, T, E>(&self, tasks: I) -> BatchReport<T>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<TaskFailure>,
    {
        let started = Instant::now();
        let state = RunState::new(tasks, self.config.deadline.map(|d| started + d));
        let workers = self.config.limit.min(state.total);

        tracing::debug!(
            tasks = state.total,
            workers,
            limit = self.config.limit,
            "Starting batch"
        );

        join_all((0..workers).map(|worker| self.worker_loop(worker, &state))).await;

        let peak_in_flight = state.peak_in_flight.load(Ordering::SeqCst);
        let stop_reason = state.stop_reason.get().copied();
        let outcomes: Vec<TaskOutcome<T>> = state
            .slots
            .into_iter()
            .map(|slot| {
                slot.into_inner().unwrap_or_else(|| match stop_reason {
                    Some(StopReason::DeadlineExceeded) => Err(TaskFailure::deadline_exceeded()),
                    Some(StopReason::Cancelled) | None => Err(TaskFailure::cancelled()),
                })
            })
            .collect();

        let report = BatchReport {
            outcomes,
            elapsed: started.elapsed(),
            peak_in_flight,
        };

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch finished"
        );
        self.emit(Event::BatchFinished {
            succeeded: report.succeeded(),
            failed: report.failed(),
        });

        report
    }

    async fn worker_loop<F, Fut, T, E>(&self, worker: usize, state: &RunState<F, T>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<TaskFailure>,
    {
        loop {
            if let Some(reason) = self.should_stop(state) {
                state.stop_reason.set(reason).ok();
                tracing::debug!(worker, ?reason, "Worker stopped claiming tasks");
                return;
            }

            // Claim before the first suspension point
            let index = state.cursor.fetch_add(1, Ordering::SeqCst);
            if index >= state.total {
                return;
            }
            let Some(task) = state.take(index) else {
                tracing::error!(worker, index, "Claimed task was already taken");
                continue;
            };

            let in_flight = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            tracing::debug!(worker, index, in_flight, "Task started");
            self.emit(Event::TaskStarted { index });

            let outcome: TaskOutcome<T> = task().await.map_err(Into::into);
            state.in_flight.fetch_sub(1, Ordering::SeqCst);

            match &outcome {
                Ok(_) => {
                    tracing::debug!(worker, index, "Task succeeded");
                    self.emit(Event::TaskSucceeded { index });
                }
                Err(failure) => {
                    tracing::warn!(worker, index, kind = %failure.kind, error = %failure.message, "Task failed");
                    self.emit(Event::TaskFailed {
                        index,
                        failure: failure.clone(),
                    });
                }
            }

            if state.slots[index].set(outcome).is_err() {
                tracing::error!(worker, index, "Result slot was already written");
            }
        }
    }

    fn should_stop<F, T>(&self, state: &RunState<F, T>) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        match state.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::DeadlineExceeded),
            _ => None,
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

/// Shared state of one run
struct RunState<F, T> {
    tasks: Vec<Mutex<Option<F>>>,
    slots: Vec<OnceLock<TaskOutcome<T>>>,
    total: usize,
    cursor: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    deadline: Option<Instant>,
    stop_reason: OnceLock<StopReason>,
}

impl<F, T> RunState<F, T> {
    fn new(tasks: impl IntoIterator<Item = F>, deadline: Option<Instant>) -> Self {
        let tasks: Vec<Mutex<Option<F>>> =
            tasks.into_iter().map(|t| Mutex::new(Some(t))).collect();
        let total = tasks.len();
        Self {
            tasks,
            slots: (0..total).map(|_| OnceLock::new()).collect(),
            total,
            cursor: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            deadline,
            stop_reason: OnceLock::new(),
        }
    }

    fn take(&self, index: usize) -> Option<F> {
        self.tasks[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Run `tasks` with at most `limit` in flight, using a fresh pool
pub async fn run_bounded<I, F, Fut, T, E>(tasks: I, limit: usize) -> Result<BatchReport<T>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<TaskFailure>,
{
    let pool = TaskPool::new(PoolConfig {
        limit,
        deadline: None,
    })?;
    Ok(pool.run(tasks).await)
}
