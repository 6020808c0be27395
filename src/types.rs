//! Core types for fetch-pool

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{FailureKind, TaskFailure};
use crate::utils::group_by;

/// Terminal outcome of one task: its value, or the recorded failure
pub type TaskOutcome<T> = std::result::Result<T, TaskFailure>;

/// Event emitted while a batch runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A worker claimed the task and started it
    TaskStarted {
        /// Position of the task in the input
        index: usize,
    },

    /// The task settled successfully
    TaskSucceeded {
        /// Position of the task in the input
        index: usize,
    },

    /// The task settled with a failure
    TaskFailed {
        /// Position of the task in the input
        index: usize,
        /// The recorded failure
        failure: TaskFailure,
    },

    /// Every worker has exited and all slots are filled
    BatchFinished {
        /// Number of successful tasks
        succeeded: usize,
        /// Number of failed tasks (including never-started ones)
        failed: usize,
    },
}

/// Complete result set of one batch run
///
/// `outcomes[i]` always belongs to task `i` of the input, whatever order the
/// tasks completed in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport<T> {
    /// One outcome per input task, in input order
    pub outcomes: Vec<TaskOutcome<T>>,
    /// Wall time from the start of the run until the last worker exited
    pub elapsed: Duration,
    /// Highest number of tasks observed in flight at once
    pub peak_in_flight: usize,
}

impl<T> BatchReport<T> {
    /// Number of tasks in the batch
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if the batch had no tasks
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of tasks that succeeded
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of tasks that failed
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Returns true if every task succeeded
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_ok())
    }

    /// Successful values with their task index
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().ok().map(|v| (i, v)))
    }

    /// Recorded failures with their task index
    pub fn failures(&self) -> impl Iterator<Item = (usize, &TaskFailure)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().err().map(|f| (i, f)))
    }

    /// Indices of failed tasks, grouped by failure kind
    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, Vec<usize>> {
        group_by(self.failures(), |(_, failure)| failure.kind)
            .into_iter()
            .map(|(kind, failures)| (kind, failures.into_iter().map(|(i, _)| i).collect()))
            .collect()
    }

    /// Human-readable tally, e.g. "4 of 5 succeeded"
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded(), self.len())
    }

    /// Consume the report, returning the ordered outcomes
    pub fn into_outcomes(self) -> Vec<TaskOutcome<T>> {
        self.outcomes
    }
}
