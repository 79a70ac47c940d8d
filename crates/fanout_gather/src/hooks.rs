//! Optional per-call hooks: progress reporter, labeler, cancellation, timeout.

use fanout_core::{ProgressReporter, TaskSpec};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Caller-supplied `(index, task) -> label` function used for progress text.
pub type Labeler<T> = Arc<dyn Fn(usize, &TaskSpec<T>) -> String + Send + Sync>;

/// Label used when no labeler is supplied: `task 3/10`, or
/// `task 3/10: <description>` when the task carries a description.
pub fn default_label<T>(index: usize, total: usize, task: &TaskSpec<T>) -> String {
    match task.description() {
        Some(description) => format!("task {}/{}: {}", index + 1, total, description),
        None => format!("task {}/{}", index + 1, total),
    }
}

/// Everything about a gather call that is not scheduling policy.
///
/// None of these hooks change admission or retry decisions; the
/// cancellation token and timeout only stop tasks from starting.
///
/// # Examples
///
/// ```
/// use fanout_core::TracingReporter;
/// use fanout_gather::{CancellationToken, GatherHooks};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let cancel = CancellationToken::new();
/// let hooks: GatherHooks<String> = GatherHooks::new()
///     .with_reporter(Arc::new(TracingReporter::new()))
///     .with_labeler(|i, _task| format!("Link {}", i + 1))
///     .with_cancellation(cancel.clone())
///     .with_timeout(Duration::from_secs(30));
/// assert!(hooks.timeout().is_some());
/// ```
pub struct GatherHooks<T> {
    pub(crate) reporter: Option<Arc<dyn ProgressReporter>>,
    pub(crate) labeler: Option<Labeler<T>>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) timeout: Option<Duration>,
}

impl<T> GatherHooks<T> {
    /// No reporter, default labels, no cancellation, no timeout.
    pub fn new() -> Self {
        Self {
            reporter: None,
            labeler: None,
            cancel: None,
            timeout: None,
        }
    }

    /// Send lifecycle notifications to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Label tasks with `labeler` instead of [`default_label`].
    pub fn with_labeler<F>(mut self, labeler: F) -> Self
    where
        F: Fn(usize, &TaskSpec<T>) -> String + Send + Sync + 'static,
    {
        self.labeler = Some(Arc::new(labeler));
        self
    }

    /// Stop starting new tasks once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stop starting new tasks after `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configured batch timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<T> Default for GatherHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for GatherHooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatherHooks")
            .field("reporter", &self.reporter.is_some())
            .field("labeler", &self.labeler.is_some())
            .field("cancel", &self.cancel)
            .field("timeout", &self.timeout)
            .finish()
    }
}
