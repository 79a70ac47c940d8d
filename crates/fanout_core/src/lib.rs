//! Core data types for the fanout task gatherer.
//!
//! This crate provides the types shared by the rate limiter and the gatherer:
//! task descriptors, result envelopes, batch results, the retry policy and
//! the progress reporting contract.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod outcome;
mod progress;
mod retry;
mod serde_secs;
mod task;

pub use outcome::{BatchResult, BatchSummary, Envelope, FailureRecord, TaskMeta, TaskOutcome};
pub use progress::{
    ChannelReporter, NoopReporter, ProgressEvent, ProgressReporter, ProgressSnapshot,
    ProgressTracker, TaskState, TracingReporter,
};
pub use retry::{RetryBudget, RetryDecision, RetrySettings, RetrySettingsBuilder};
pub use task::{Completed, TaskSpec, Work, WorkFailure};
