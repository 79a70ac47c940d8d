//! Progress reporting contract and stock reporters.
//!
//! The gatherer pushes lifecycle notifications into a [`ProgressReporter`].
//! Reporters are observers only: every method must return promptly and
//! nothing they do can influence admission or retry decisions.

use fanout_error::TaskError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sink for per-task lifecycle notifications.
///
/// All methods default to doing nothing, so implementors only override the
/// events they care about. Implementations must not block.
pub trait ProgressReporter: Send + Sync {
    /// An attempt of task `index` is about to run.
    fn task_started(&self, _index: usize, _label: &str) {}

    /// Task `index` produced a value.
    fn task_succeeded(&self, _index: usize) {}

    /// Attempt `attempt` of task `index` failed and will be retried after `delay`.
    fn task_retrying(&self, _index: usize, _attempt: u32, _delay: Duration) {}

    /// Task `index` failed for good.
    fn task_failed(&self, _index: usize, _error: &TaskError) {}

    /// Task `index` was cancelled before it started.
    fn task_cancelled(&self, _index: usize) {}
}

/// Reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}

/// Reporter that turns notifications into `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    labels: std::sync::Arc<Mutex<BTreeMap<usize, String>>>,
}

impl TracingReporter {
    /// Create a new tracing reporter.
    pub fn new() -> Self {
        Self::default()
    }

    fn label(&self, index: usize) -> String {
        self.labels
            .lock()
            .ok()
            .and_then(|labels| labels.get(&index).cloned())
            .unwrap_or_else(|| format!("task {}", index + 1))
    }
}

impl ProgressReporter for TracingReporter {
    fn task_started(&self, index: usize, label: &str) {
        if let Ok(mut labels) = self.labels.lock() {
            labels.insert(index, label.to_string());
        }
        debug!(index, label, "Task started");
    }

    fn task_succeeded(&self, index: usize) {
        info!(index, label = %self.label(index), "Task succeeded");
    }

    fn task_retrying(&self, index: usize, attempt: u32, delay: Duration) {
        warn!(
            index,
            label = %self.label(index),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Task failed, retrying"
        );
    }

    fn task_failed(&self, index: usize, error: &TaskError) {
        warn!(index, label = %self.label(index), error = %error.kind, "Task failed");
    }

    fn task_cancelled(&self, index: usize) {
        debug!(index, "Task cancelled before start");
    }
}

/// One lifecycle notification, as sent by [`ChannelReporter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// An attempt is starting
    Started {
        /// Task index
        index: usize,
        /// Task label
        label: String,
    },
    /// The task produced a value
    Succeeded {
        /// Task index
        index: usize,
    },
    /// The task will be retried
    Retrying {
        /// Task index
        index: usize,
        /// Attempt that just failed
        attempt: u32,
        /// Backoff before the next attempt, in milliseconds
        delay_ms: u64,
    },
    /// The task failed for good
    Failed {
        /// Task index
        index: usize,
        /// Rendered error
        error: String,
    },
    /// The task never started
    Cancelled {
        /// Task index
        index: usize,
    },
}

/// Buffered reporter forwarding events over an unbounded channel.
///
/// Sending never waits; events are dropped silently once the receiver is gone.
///
/// # Examples
///
/// ```
/// use fanout_core::{ChannelReporter, ProgressEvent, ProgressReporter};
///
/// let (reporter, mut events) = ChannelReporter::new();
/// reporter.task_started(0, "first");
/// reporter.task_succeeded(0);
///
/// assert_eq!(
///     events.try_recv().unwrap(),
///     ProgressEvent::Started { index: 0, label: "first".to_string() }
/// );
/// assert_eq!(events.try_recv().unwrap(), ProgressEvent::Succeeded { index: 0 });
/// ```
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn task_started(&self, index: usize, label: &str) {
        self.send(ProgressEvent::Started {
            index,
            label: label.to_string(),
        });
    }

    fn task_succeeded(&self, index: usize) {
        self.send(ProgressEvent::Succeeded { index });
    }

    fn task_retrying(&self, index: usize, attempt: u32, delay: Duration) {
        self.send(ProgressEvent::Retrying {
            index,
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
    }

    fn task_failed(&self, index: usize, error: &TaskError) {
        self.send(ProgressEvent::Failed {
            index,
            error: error.kind.to_string(),
        });
    }

    fn task_cancelled(&self, index: usize) {
        self.send(ProgressEvent::Cancelled { index });
    }
}

/// Lifecycle state of a task as seen by [`ProgressTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not started yet
    Pending,
    /// An attempt is running
    Running,
    /// Waiting out a backoff delay
    Retrying,
    /// Finished with a value
    Succeeded,
    /// Finished with a terminal failure
    Failed,
    /// Never started
    Cancelled,
}

#[derive(Debug, Clone)]
struct TrackedTask {
    label: String,
    state: TaskState,
    attempts: u32,
}

/// Counts of tasks per state at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Tasks in the batch
    pub total: usize,
    /// Not started yet
    pub pending: usize,
    /// Attempt in flight
    pub running: usize,
    /// Waiting to retry
    pub retrying: usize,
    /// Finished with a value
    pub succeeded: usize,
    /// Finished with a failure
    pub failed: usize,
    /// Never started
    pub cancelled: usize,
}

impl ProgressSnapshot {
    /// Tasks in a terminal state.
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Live status board: remembers the latest state of every task.
///
/// Suitable for driving a terminal status display by polling [`snapshot`]
/// or [`render`].
///
/// [`snapshot`]: ProgressTracker::snapshot
/// [`render`]: ProgressTracker::render
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    tasks: Mutex<BTreeMap<usize, TrackedTask>>,
}

impl ProgressTracker {
    /// Tracker for a batch of `total` tasks.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    fn update(&self, index: usize, apply: impl FnOnce(&mut TrackedTask)) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        let task = tasks.entry(index).or_insert_with(|| TrackedTask {
            label: format!("task {}", index + 1),
            state: TaskState::Pending,
            attempts: 0,
        });
        apply(task);
    }

    /// Latest state of task `index`.
    pub fn state(&self, index: usize) -> TaskState {
        self.tasks
            .lock()
            .ok()
            .and_then(|tasks| tasks.get(&index).map(|t| t.state))
            .unwrap_or(TaskState::Pending)
    }

    /// Attempts started for task `index`.
    pub fn attempts(&self, index: usize) -> u32 {
        self.tasks
            .lock()
            .ok()
            .and_then(|tasks| tasks.get(&index).map(|t| t.attempts))
            .unwrap_or(0)
    }

    /// Count tasks per state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let mut snap = ProgressSnapshot {
            total: self.total,
            ..ProgressSnapshot::default()
        };
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.values() {
                match task.state {
                    TaskState::Pending => snap.pending += 1,
                    TaskState::Running => snap.running += 1,
                    TaskState::Retrying => snap.retrying += 1,
                    TaskState::Succeeded => snap.succeeded += 1,
                    TaskState::Failed => snap.failed += 1,
                    TaskState::Cancelled => snap.cancelled += 1,
                }
            }
            snap.pending += self.total.saturating_sub(tasks.len());
        }
        snap
    }

    /// One line per known task, in index order.
    pub fn render(&self) -> Vec<String> {
        let Ok(tasks) = self.tasks.lock() else {
            return Vec::new();
        };
        tasks
            .values()
            .map(|t| format!("[{}] {} (attempts: {})", t.state, t.label, t.attempts))
            .collect()
    }
}

impl ProgressReporter for ProgressTracker {
    fn task_started(&self, index: usize, label: &str) {
        self.update(index, |t| {
            t.label = label.to_string();
            t.state = TaskState::Running;
            t.attempts += 1;
        });
    }

    fn task_succeeded(&self, index: usize) {
        self.update(index, |t| t.state = TaskState::Succeeded);
    }

    fn task_retrying(&self, index: usize, _attempt: u32, _delay: Duration) {
        self.update(index, |t| t.state = TaskState::Retrying);
    }

    fn task_failed(&self, index: usize, _error: &TaskError) {
        self.update(index, |t| t.state = TaskState::Failed);
    }

    fn task_cancelled(&self, index: usize) {
        self.update(index, |t| t.state = TaskState::Cancelled);
    }
}
