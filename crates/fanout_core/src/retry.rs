//! Retry policy and exponential backoff for failed tasks.

use fanout_error::{RetryConfigError, RetryConfigErrorKind, TaskError, TaskErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Parameters controlling whether and how failed tasks are retried.
///
/// `max_task_retries` bounds retries of a single task; `max_total_retries`
/// bounds the sum of retries across the whole batch. Backoff after a task's
/// n-th attempt is `min(max_backoff, initial_backoff * backoff_factor^(n-1))`.
///
/// # Examples
///
/// ```
/// use fanout_core::RetrySettings;
/// use std::time::Duration;
///
/// let retry = RetrySettings::builder()
///     .max_task_retries(2)
///     .max_total_retries(20)
///     .initial_backoff(Duration::from_millis(125))
///     .build();
///
/// assert!(retry.should_retry(1, 0));
/// assert!(retry.should_retry(2, 0));
/// assert!(!retry.should_retry(3, 0));
/// assert_eq!(retry.backoff_delay(1), Duration::from_millis(125));
/// assert_eq!(retry.backoff_delay(2), Duration::from_millis(250));
///
/// // Default: no retries at all
/// assert!(!RetrySettings::default().should_retry(1, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Retries allowed for any single task.
    #[serde(default)]
    max_task_retries: u32,

    /// Retries allowed across the whole batch.
    #[serde(default)]
    max_total_retries: u32,

    /// Delay before the first retry of a task.
    #[serde(
        rename = "initial_backoff_secs",
        with = "crate::serde_secs",
        default = "default_initial_backoff"
    )]
    initial_backoff: Duration,

    /// Ceiling on any single backoff delay.
    #[serde(
        rename = "max_backoff_secs",
        with = "crate::serde_secs",
        default = "default_max_backoff"
    )]
    max_backoff: Duration,

    /// Growth factor between consecutive delays.
    #[serde(default = "default_backoff_factor")]
    backoff_factor: f64,

    /// Randomise delays to avoid synchronised retries.
    #[serde(default)]
    jitter: bool,
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_task_retries: 0,
            max_total_retries: 0,
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            backoff_factor: default_backoff_factor(),
            jitter: false,
        }
    }
}

impl RetrySettings {
    /// Creates a new retry settings builder.
    pub fn builder() -> RetrySettingsBuilder {
        RetrySettingsBuilder::default()
    }

    /// No retries; every failure is terminal.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sensible defaults for remote API calls: 5 retries per task, 100 per batch.
    pub fn standard() -> Self {
        Self {
            max_task_retries: 5,
            max_total_retries: 100,
            ..Self::default()
        }
    }

    /// Whether any retry can ever happen.
    pub fn is_enabled(&self) -> bool {
        self.max_task_retries > 0 && self.max_total_retries > 0
    }

    /// Validates the backoff parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the factor is below 1.0 or not finite, or if the
    /// initial backoff exceeds the ceiling.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(RetryConfigError::new(RetryConfigErrorKind::InvalidFactor(
                self.backoff_factor,
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(RetryConfigError::new(RetryConfigErrorKind::InvertedBounds {
                initial: self.initial_backoff,
                max: self.max_backoff,
            }));
        }
        Ok(())
    }

    /// Whether a task that has made `task_attempt_count` attempts may retry,
    /// given `batch_retry_count` retries already spent by the batch.
    pub fn should_retry(&self, task_attempt_count: u32, batch_retry_count: u32) -> bool {
        task_attempt_count <= self.max_task_retries && batch_retry_count < self.max_total_retries
    }

    /// Delay to wait after a task's `attempt_count`-th failed attempt.
    ///
    /// Non-decreasing in `attempt_count` until it saturates at `max_backoff`
    /// (unless jitter is enabled). Never exceeds `max_backoff`, jittered or not.
    pub fn backoff_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ceiling = self.max_backoff.as_secs_f64();
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        let secs = if scaled.is_finite() {
            scaled.min(ceiling)
        } else {
            ceiling
        };
        let delay = Duration::from_secs_f64(secs.max(0.0));
        if self.jitter {
            tokio_retry2::strategy::jitter(delay).min(self.max_backoff)
        } else {
            delay
        }
    }
}

/// Builder for `RetrySettings`.
#[derive(Debug, Default)]
pub struct RetrySettingsBuilder {
    max_task_retries: Option<u32>,
    max_total_retries: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    backoff_factor: Option<f64>,
    jitter: Option<bool>,
}

impl RetrySettingsBuilder {
    /// Sets the per-task retry cap.
    pub fn max_task_retries(mut self, value: u32) -> Self {
        self.max_task_retries = Some(value);
        self
    }

    /// Sets the batch-wide retry cap.
    pub fn max_total_retries(mut self, value: u32) -> Self {
        self.max_total_retries = Some(value);
        self
    }

    /// Sets the first backoff delay.
    pub fn initial_backoff(mut self, value: Duration) -> Self {
        self.initial_backoff = Some(value);
        self
    }

    /// Sets the backoff ceiling.
    pub fn max_backoff(mut self, value: Duration) -> Self {
        self.max_backoff = Some(value);
        self
    }

    /// Sets the backoff growth factor.
    pub fn backoff_factor(mut self, value: f64) -> Self {
        self.backoff_factor = Some(value);
        self
    }

    /// Enables or disables jitter.
    pub fn jitter(mut self, value: bool) -> Self {
        self.jitter = Some(value);
        self
    }

    /// Builds the `RetrySettings`.
    pub fn build(self) -> RetrySettings {
        let defaults = RetrySettings::default();
        RetrySettings {
            max_task_retries: self.max_task_retries.unwrap_or(defaults.max_task_retries),
            max_total_retries: self.max_total_retries.unwrap_or(defaults.max_total_retries),
            initial_backoff: self.initial_backoff.unwrap_or(defaults.initial_backoff),
            max_backoff: self.max_backoff.unwrap_or(defaults.max_backoff),
            backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

/// Outcome of consulting the retry policy after a failed attempt.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Run the task again after the delay.
    RetryAfter(Duration),
    /// Stop; the error is the task's terminal failure.
    GiveUp(TaskError),
}

/// Batch-wide retry counter shared by every task of one batch.
///
/// # Examples
///
/// ```
/// use fanout_core::{RetryBudget, RetryDecision, RetrySettings};
/// use fanout_error::{TaskError, TaskErrorKind};
///
/// let boom = || TaskError::new(TaskErrorKind::WorkFailed("boom".to_string()));
/// let settings = RetrySettings::builder()
///     .max_task_retries(3)
///     .max_total_retries(1)
///     .build();
/// let budget = RetryBudget::new(*settings.max_total_retries());
///
/// assert!(matches!(budget.decide(&settings, 1, boom()), RetryDecision::RetryAfter(_)));
/// // Budget spent: the next task gives up even though its own cap allows more
/// assert!(matches!(budget.decide(&settings, 1, boom()), RetryDecision::GiveUp(_)));
/// assert_eq!(budget.used(), 1);
/// ```
#[derive(Debug)]
pub struct RetryBudget {
    used: AtomicU32,
    cap: u32,
}

impl RetryBudget {
    /// A budget allowing `cap` retries in total.
    pub fn new(cap: u32) -> Self {
        Self {
            used: AtomicU32::new(0),
            cap,
        }
    }

    /// Retries reserved so far.
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    /// Atomically reserve one retry; false once the cap is reached.
    pub fn try_reserve(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.cap).then_some(used + 1)
            })
            .is_ok()
    }

    /// Decide what happens after a task's `attempts`-th attempt failed.
    ///
    /// A retry is granted only when the per-task cap allows it and a slot
    /// of the batch budget could be reserved. With retries disabled the
    /// attempt's own failure is terminal.
    pub fn decide(
        &self,
        settings: &RetrySettings,
        attempts: u32,
        failure: TaskError,
    ) -> RetryDecision {
        if settings.max_task_retries == 0 {
            return RetryDecision::GiveUp(failure);
        }

        let last_error = failure.last_message().to_string();
        if attempts > settings.max_task_retries {
            return RetryDecision::GiveUp(TaskError::new(TaskErrorKind::RetriesExhausted {
                attempts,
                last_error,
            }));
        }
        if !settings.should_retry(attempts, self.used()) || !self.try_reserve() {
            return RetryDecision::GiveUp(TaskError::new(
                TaskErrorKind::RetryBudgetExhausted {
                    attempts,
                    last_error,
                },
            ));
        }

        RetryDecision::RetryAfter(settings.backoff_delay(attempts))
    }
}
