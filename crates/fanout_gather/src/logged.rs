//! Convenience wrapper for callers that only want failures logged.

use crate::{GatherHooks, Gatherer};
use fanout_core::{BatchResult, TaskSpec};
use fanout_error::FanoutResult;
use tracing::{error, info, instrument, warn};

/// Run a batch and log every failed task at `warn` with its label.
///
/// `what` names the kind of work for log output, for example
/// `"link fetch"` or `"chunk summary"`. The batch result is returned
/// unchanged so the caller can still inspect it.
///
/// # Errors
///
/// Returns the gatherer's error, after logging it, when nothing succeeded.
///
/// # Examples
///
/// ```
/// use fanout_core::TaskSpec;
/// use fanout_gather::{GatherHooks, Gatherer, gather_logged};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tasks = vec![
///     TaskSpec::new(|| async { Ok::<_, String>("ok") }),
///     TaskSpec::new(|| async { Err::<&str, _>("bad gateway".to_string()) }),
/// ];
///
/// let batch = gather_logged(&Gatherer::default(), tasks, GatherHooks::new(), "page fetch").await?;
/// assert_eq!(batch.success_count(), 1);
/// assert_eq!(batch.failure_count(), 1);
/// # Ok(())
/// # }
/// ```
#[instrument(skip(gatherer, tasks, hooks), fields(total = tasks.len()))]
pub async fn gather_logged<T>(
    gatherer: &Gatherer,
    tasks: Vec<TaskSpec<T>>,
    hooks: GatherHooks<T>,
    what: &str,
) -> FanoutResult<BatchResult<T>>
where
    T: Send + 'static,
{
    let batch = match gatherer.gather_with(tasks, hooks).await {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "Every {} failed", what);
            return Err(e);
        }
    };

    for failure in batch.failures() {
        warn!(
            index = failure.index,
            label = %failure.label,
            bucket = ?failure.bucket,
            error = %failure.error.kind,
            "{} failed",
            what
        );
    }
    info!(summary = %batch.summary(), "{} batch finished", what);

    Ok(batch)
}
