//! Result envelopes and index-aligned batch results.

use fanout_error::{TaskError, TaskErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminal state of one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    /// The task produced a value
    Success(T),
    /// The task ran and failed for good
    Failed(TaskError),
    /// The batch was cancelled before the task started
    Cancelled,
}

/// Outcome record for one task: the last attempt's result plus bookkeeping.
///
/// # Examples
///
/// ```
/// use fanout_core::Envelope;
///
/// let env = Envelope::success("ok", 2, false);
/// assert!(env.is_success());
/// assert_eq!(env.value(), Some(&"ok"));
/// assert_eq!(env.attempts(), 2);
///
/// let never_ran: Envelope<&str> = Envelope::cancelled();
/// assert!(never_ran.is_cancelled());
/// assert_eq!(never_ran.attempts(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    outcome: TaskOutcome<T>,
    attempts: u32,
    bypass_limiter: bool,
}

impl<T> Envelope<T> {
    /// A successful final attempt.
    pub fn success(value: T, attempts: u32, bypass_limiter: bool) -> Self {
        Self {
            outcome: TaskOutcome::Success(value),
            attempts,
            bypass_limiter,
        }
    }

    /// A terminal failure after `attempts` attempts.
    pub fn failure(error: TaskError, attempts: u32) -> Self {
        Self {
            outcome: TaskOutcome::Failed(error),
            attempts,
            bypass_limiter: false,
        }
    }

    /// A task that never started.
    pub fn cancelled() -> Self {
        Self {
            outcome: TaskOutcome::Cancelled,
            attempts: 0,
            bypass_limiter: false,
        }
    }

    /// The terminal outcome.
    pub fn outcome(&self) -> &TaskOutcome<T> {
        &self.outcome
    }

    /// Attempts made, including the first.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the final attempt declared it should not be rate-charged.
    pub fn bypass_limiter(&self) -> bool {
        self.bypass_limiter
    }

    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success(_))
    }

    /// True for `Failed`.
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Failed(_))
    }

    /// True for `Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Cancelled)
    }

    /// The value, if the task succeeded.
    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            TaskOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The failure, if the task ran and failed.
    pub fn error(&self) -> Option<&TaskError> {
        match &self.outcome {
            TaskOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into a `Result`; cancellation becomes `TaskErrorKind::Cancelled`.
    pub fn into_result(self) -> Result<T, TaskError> {
        match self.outcome {
            TaskOutcome::Success(value) => Ok(value),
            TaskOutcome::Failed(err) => Err(err),
            TaskOutcome::Cancelled => Err(TaskError::new(TaskErrorKind::Cancelled)),
        }
    }
}

/// Per-task metadata carried alongside the envelope.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct TaskMeta {
    /// Human-readable label used in progress output.
    label: String,
    /// Bucket key the task was limited under.
    bucket: Option<String>,
}

impl TaskMeta {
    /// Metadata for one task.
    pub fn new(label: impl Into<String>, bucket: Option<String>) -> Self {
        Self {
            label: label.into(),
            bucket,
        }
    }
}

/// A failed task together with where it came from.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// Index of the task in the input batch
    pub index: usize,
    /// Label of the task
    pub label: String,
    /// Bucket key of the task
    pub bucket: Option<String>,
    /// Terminal error
    pub error: TaskError,
}

/// Serializable counts describing a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Tasks in the batch
    pub total: usize,
    /// Tasks that produced a value
    pub succeeded: usize,
    /// Tasks that ran and failed
    pub failed: usize,
    /// Tasks that never started
    pub cancelled: usize,
    /// Retries spent across the batch
    pub retries: u32,
    /// Wall-clock duration of the batch in milliseconds
    pub elapsed_ms: u64,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} succeeded, {} failed, {} cancelled, {} retries in {}ms",
            self.succeeded, self.total, self.failed, self.cancelled, self.retries, self.elapsed_ms
        )
    }
}

/// Index-aligned results of one gather call.
///
/// Entry `i` always describes input task `i`, whatever order tasks finished in.
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    envelopes: Vec<Envelope<T>>,
    meta: Vec<TaskMeta>,
    total_retries: u32,
    elapsed: Duration,
}

impl<T> BatchResult<T> {
    /// Assemble a batch result; `envelopes` and `meta` must be index-aligned.
    pub fn new(
        envelopes: Vec<Envelope<T>>,
        meta: Vec<TaskMeta>,
        total_retries: u32,
        elapsed: Duration,
    ) -> Self {
        debug_assert_eq!(envelopes.len(), meta.len());
        Self {
            envelopes,
            meta,
            total_retries,
            elapsed,
        }
    }

    /// An empty batch.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), 0, Duration::ZERO)
    }

    /// Number of tasks in the batch.
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// True when the batch had no tasks.
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Envelopes in input order.
    pub fn envelopes(&self) -> &[Envelope<T>] {
        &self.envelopes
    }

    /// Metadata in input order.
    pub fn meta(&self) -> &[TaskMeta] {
        &self.meta
    }

    /// Envelope for input task `index`.
    pub fn get(&self, index: usize) -> Option<&Envelope<T>> {
        self.envelopes.get(index)
    }

    /// Retries spent across the batch.
    pub fn total_retries(&self) -> u32 {
        self.total_retries
    }

    /// Total attempts across the batch.
    pub fn total_attempts(&self) -> u32 {
        self.envelopes.iter().map(Envelope::attempts).sum()
    }

    /// Wall-clock duration of the gather call.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Tasks that produced a value.
    pub fn success_count(&self) -> usize {
        self.envelopes.iter().filter(|e| e.is_success()).count()
    }

    /// Tasks that ran and failed.
    pub fn failure_count(&self) -> usize {
        self.envelopes.iter().filter(|e| e.is_failure()).count()
    }

    /// Tasks that never started.
    pub fn cancelled_count(&self) -> usize {
        self.envelopes.iter().filter(|e| e.is_cancelled()).count()
    }

    /// Failed tasks with their index, label and bucket.
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.envelopes
            .iter()
            .zip(&self.meta)
            .enumerate()
            .filter_map(|(index, (env, meta))| {
                env.error().map(|error| FailureRecord {
                    index,
                    label: meta.label.clone(),
                    bucket: meta.bucket.clone(),
                    error: error.clone(),
                })
            })
            .collect()
    }

    /// Successful values in input order; failed and cancelled tasks are skipped.
    pub fn successes(&self) -> Vec<&T> {
        self.envelopes.iter().filter_map(Envelope::value).collect()
    }

    /// One entry per input task: the value, or `None` if it did not succeed.
    pub fn successes_or_none(&self) -> Vec<Option<&T>> {
        self.envelopes.iter().map(Envelope::value).collect()
    }

    /// Consume into index-aligned optional values.
    pub fn into_values(self) -> Vec<Option<T>> {
        self.envelopes
            .into_iter()
            .map(|env| env.into_result().ok())
            .collect()
    }

    /// Consume into index-aligned results.
    pub fn into_results(self) -> Vec<Result<T, TaskError>> {
        self.envelopes
            .into_iter()
            .map(Envelope::into_result)
            .collect()
    }

    /// Counts for logging.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.len(),
            succeeded: self.success_count(),
            failed: self.failure_count(),
            cancelled: self.cancelled_count(),
            retries: self.total_retries,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}
