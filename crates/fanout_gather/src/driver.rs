//! Per-batch scheduling state and the per-task retry loop.
//!
//! Every task is driven by its own future inside one `FuturesUnordered`
//! set. A task future loops: wait for admission, run one attempt on a
//! spawned Tokio task, then either record the outcome or sleep out the
//! backoff delay holding no slot and no token.

use crate::hooks::default_label;
use crate::{GatherConfig, GatherHooks, Labeler};
use fanout_core::{
    BatchResult, Envelope, NoopReporter, ProgressReporter, RetryBudget, RetryDecision,
    RetrySettings, TaskMeta, TaskSpec,
};
use fanout_error::{
    FanoutResult, GatherError, GatherErrorKind, LimitError, TaskError, TaskErrorKind,
};
use fanout_rate_limit::LimiterSet;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Mutable scheduling state owned by one gather call.
pub(crate) struct Batch {
    limiters: LimiterSet,
    budget: RetryBudget,
    retry: RetrySettings,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl Batch {
    pub(crate) fn new<T>(
        config: &GatherConfig,
        hooks: GatherHooks<T>,
    ) -> (Self, Option<Labeler<T>>) {
        // A child token lets the timeout stop this batch without cancelling
        // the caller's token.
        let cancel = hooks
            .cancel
            .map(|token| token.child_token())
            .unwrap_or_default();

        let batch = Self {
            limiters: LimiterSet::new(*config.global(), config.buckets().clone()),
            budget: RetryBudget::new(*config.retry().max_total_retries()),
            retry: config.retry().clone(),
            reporter: hooks.reporter.unwrap_or_else(|| Arc::new(NoopReporter)),
            cancel,
            timeout: hooks.timeout,
        };
        (batch, hooks.labeler)
    }

    pub(crate) async fn run<T>(
        self,
        tasks: Vec<TaskSpec<T>>,
        labeler: Option<Labeler<T>>,
    ) -> FanoutResult<BatchResult<T>>
    where
        T: Send + 'static,
    {
        let started = Instant::now();
        let total = tasks.len();

        let meta: Vec<TaskMeta> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let label = match &labeler {
                    Some(labeler) => labeler(index, task),
                    None => default_label(index, total, task),
                };
                TaskMeta::new(label, task.bucket().map(str::to_string))
            })
            .collect();

        let mut running: FuturesUnordered<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| self.drive(index, task, meta[index].label()))
            .collect();

        let mut slots: Vec<Option<Envelope<T>>> = (0..total).map(|_| None).collect();

        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let mut timed_out = false;

        loop {
            tokio::select! {
                next = running.next() => match next {
                    Some(finished) => {
                        let (index, envelope) = finished?;
                        slots[index] = Some(envelope);
                    }
                    None => break,
                },
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    warn!(
                        timeout_ms = self.timeout.map(|t| t.as_millis() as u64),
                        "Batch timed out, cancelling tasks not yet started"
                    );
                    self.cancel.cancel();
                }
            }
        }
        drop(running);

        let envelopes = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(Envelope::cancelled))
            .collect();
        let result = BatchResult::new(envelopes, meta, self.budget.used(), started.elapsed());
        let summary = result.summary();

        debug!(
            peak_in_flight = self.limiters.global().peak_in_flight(),
            buckets = self.limiters.bucket_limiters().len(),
            "Limiter statistics"
        );

        if summary.succeeded == 0 {
            warn!(%summary, "No task in batch succeeded");
            return Err(GatherError::new(GatherErrorKind::AllFailed {
                total: summary.total,
                failed: summary.failed,
                cancelled: summary.cancelled,
            })
            .into());
        }

        info!(%summary, "Batch complete");
        Ok(result)
    }

    /// Drive one task to a terminal envelope.
    async fn drive<T>(
        &self,
        index: usize,
        task: TaskSpec<T>,
        label: &str,
    ) -> Result<(usize, Envelope<T>), LimitError>
    where
        T: Send + 'static,
    {
        let mut attempts = 0u32;
        let mut last_failure: Option<TaskError> = None;

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let envelope = match last_failure {
                        Some(failure) => self.give_up(index, failure, attempts),
                        None => {
                            debug!(index, "Task cancelled before start");
                            self.reporter.task_cancelled(index);
                            Envelope::cancelled()
                        }
                    };
                    return Ok((index, envelope));
                }
                permit = self.limiters.acquire(task.bucket()) => permit?,
            };

            attempts += 1;
            debug!(index, attempt = attempts, bucket = ?task.bucket(), "Starting attempt");
            self.reporter.task_started(index, label);

            let work = task.work();
            let failure = match tokio::spawn(async move { work.execute().await }).await {
                Ok(Ok(completed)) => {
                    let (value, bypass) = completed.into_parts();
                    if bypass {
                        debug!(index, "Attempt bypassed the limiter, refunding tokens");
                        permit.refund();
                    } else {
                        drop(permit);
                    }
                    self.reporter.task_succeeded(index);
                    return Ok((index, Envelope::success(value, attempts, bypass)));
                }
                Ok(Err(err)) => TaskError::new(TaskErrorKind::WorkFailed(err.to_string())),
                Err(join_err) => TaskError::new(TaskErrorKind::Panicked(panic_message(join_err))),
            };
            drop(permit);
            debug!(index, attempt = attempts, error = %failure.kind, "Attempt failed");

            if self.cancel.is_cancelled() {
                return Ok((index, self.give_up(index, failure, attempts)));
            }

            let delay = match self.budget.decide(&self.retry, attempts, failure.clone()) {
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::GiveUp(terminal) => {
                    return Ok((index, self.give_up(index, terminal, attempts)));
                }
            };

            self.reporter.task_retrying(index, attempts, delay);
            debug!(
                index,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Backing off"
            );
            last_failure = Some(failure);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn give_up<T>(&self, index: usize, failure: TaskError, attempts: u32) -> Envelope<T> {
        self.reporter.task_failed(index, &failure);
        Envelope::failure(failure, attempts)
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
