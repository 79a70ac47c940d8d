//! Per-task failure types.
//!
//! A `TaskError` is what a batch result stores for a task that did not
//! produce a value. It is never raised on its own; callers inspect it through
//! the batch result.

/// Why a task ended without a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TaskErrorKind {
    /// The work function failed and was not retried: retries are disabled,
    /// or the batch was cancelled while the task waited to retry
    #[display("{}", _0)]
    WorkFailed(String),
    /// The work function panicked or its attempt was aborted
    #[display("task panicked: {}", _0)]
    Panicked(String),
    /// The per-task retry cap was reached
    #[display("retries exhausted after {} attempts: {}", attempts, last_error)]
    RetriesExhausted {
        /// Total attempts made, including the first
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },
    /// The batch-wide retry budget ran out before the per-task cap
    #[display("batch retry budget exhausted after {} attempts: {}", attempts, last_error)]
    RetryBudgetExhausted {
        /// Total attempts made, including the first
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },
    /// The batch was cancelled before the task started
    #[display("task cancelled before it started")]
    Cancelled,
}

/// Task failure with location tracking.
///
/// # Examples
///
/// ```
/// use fanout_error::{TaskError, TaskErrorKind};
///
/// let err = TaskError::new(TaskErrorKind::RetriesExhausted {
///     attempts: 3,
///     last_error: "connection reset".to_string(),
/// });
/// assert_eq!(err.last_message(), "connection reset");
/// assert!(format!("{}", err).contains("3 attempts"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Task Error: {} at line {} in {}", kind, line, file)]
pub struct TaskError {
    /// The specific error condition
    pub kind: TaskErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl TaskError {
    /// Create a new TaskError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: TaskErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &TaskErrorKind {
        &self.kind
    }

    /// The underlying work-function message, without retry bookkeeping.
    pub fn last_message(&self) -> &str {
        match &self.kind {
            TaskErrorKind::WorkFailed(msg) | TaskErrorKind::Panicked(msg) => msg,
            TaskErrorKind::RetriesExhausted { last_error, .. }
            | TaskErrorKind::RetryBudgetExhausted { last_error, .. } => last_error,
            TaskErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether this error records a task that never ran.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, TaskErrorKind::Cancelled)
    }
}
