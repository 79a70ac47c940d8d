//! The gatherer: validated scheduling policy plus the batch entry points.

use crate::GatherHooks;
use crate::driver::Batch;
use fanout_core::{BatchResult, RetrySettings, TaskSpec};
use fanout_error::FanoutResult;
use fanout_rate_limit::{BucketLimits, FanoutConfig, Limit};
use tracing::{debug, instrument};

/// Scheduling policy for every batch a [`Gatherer`] runs.
#[derive(Debug, Clone, PartialEq, Default, derive_getters::Getters)]
pub struct GatherConfig {
    /// Ceiling applied to every task
    global: Limit,
    /// Per-bucket ceilings, with `"*"` as the default bucket limit
    buckets: BucketLimits,
    /// Retry policy and batch retry budget
    retry: RetrySettings,
}

impl GatherConfig {
    /// Policy from explicit parts.
    pub fn new(global: Limit, buckets: BucketLimits, retry: RetrySettings) -> Self {
        Self {
            global,
            buckets,
            retry,
        }
    }

    /// Validates limits and retry settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid limit or retry parameter.
    pub fn validate(&self) -> FanoutResult<()> {
        self.global.validate()?;
        self.buckets.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

impl From<&FanoutConfig> for GatherConfig {
    fn from(config: &FanoutConfig) -> Self {
        Self::new(
            *config.limits().global(),
            config.limits().buckets().clone(),
            config.retry().clone(),
        )
    }
}

/// Rate-limited concurrent task gatherer.
///
/// A gatherer holds only configuration. Every call to [`gather`](Self::gather)
/// builds fresh limiters and a fresh retry budget, so batches never share
/// scheduling state and one gatherer can run several batches at once.
#[derive(Debug, Clone, Default)]
pub struct Gatherer {
    config: GatherConfig,
}

impl Gatherer {
    /// Gatherer with a validated policy.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit or retry parameter is invalid.
    pub fn new(config: GatherConfig) -> FanoutResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Creates a new gatherer builder.
    pub fn builder() -> GathererBuilder {
        GathererBuilder::default()
    }

    /// Gatherer using the limits and retry policy of a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &FanoutConfig) -> FanoutResult<Self> {
        Self::new(GatherConfig::from(config))
    }

    /// The scheduling policy.
    pub fn config(&self) -> &GatherConfig {
        &self.config
    }

    /// Run `tasks` with default hooks.
    ///
    /// # Errors
    ///
    /// Returns `AllFailed` when the batch is non-empty and no task succeeded.
    pub async fn gather<T>(&self, tasks: Vec<TaskSpec<T>>) -> FanoutResult<BatchResult<T>>
    where
        T: Send + 'static,
    {
        self.gather_with(tasks, GatherHooks::new()).await
    }

    /// Run `tasks` with a reporter, labeler, cancellation token or timeout.
    ///
    /// The returned result is index-aligned with `tasks` whatever order the
    /// tasks finished in.
    ///
    /// # Errors
    ///
    /// Returns `AllFailed` when the batch is non-empty and no task succeeded.
    #[instrument(
        name = "gather",
        skip(self, tasks, hooks),
        fields(
            total = tasks.len(),
            global_rps = *self.config.global.rps(),
            global_concurrency = *self.config.global.concurrency(),
        )
    )]
    pub async fn gather_with<T>(
        &self,
        tasks: Vec<TaskSpec<T>>,
        hooks: GatherHooks<T>,
    ) -> FanoutResult<BatchResult<T>>
    where
        T: Send + 'static,
    {
        if tasks.is_empty() {
            debug!("Empty batch, nothing to gather");
            return Ok(BatchResult::empty());
        }

        let (batch, labeler) = Batch::new(&self.config, hooks);
        batch.run(tasks, labeler).await
    }
}

/// Builder for [`Gatherer`].
///
/// # Examples
///
/// ```
/// use fanout_core::RetrySettings;
/// use fanout_gather::Gatherer;
/// use fanout_rate_limit::Limit;
///
/// let gatherer = Gatherer::builder()
///     .global_limit(Limit::new(20.0, 20))
///     .default_bucket_limit(Limit::new(2.0, 2))
///     .bucket_limit("api.example.com", Limit::new(10.0, 4))
///     .retry(RetrySettings::standard())
///     .build()
///     .unwrap();
///
/// assert_eq!(gatherer.config().buckets().len(), 2);
/// assert!(Gatherer::builder().global_limit(Limit::new(1.0, 0)).build().is_err());
/// ```
#[derive(Debug, Default)]
pub struct GathererBuilder {
    global: Option<Limit>,
    buckets: BucketLimits,
    retry: Option<RetrySettings>,
}

impl GathererBuilder {
    /// Sets the global limit.
    pub fn global_limit(mut self, limit: Limit) -> Self {
        self.global = Some(limit);
        self
    }

    /// Sets the limit for one bucket key.
    pub fn bucket_limit(mut self, key: impl Into<String>, limit: Limit) -> Self {
        self.buckets.insert(key, limit);
        self
    }

    /// Sets the limit for buckets without their own entry.
    pub fn default_bucket_limit(self, limit: Limit) -> Self {
        self.bucket_limit(fanout_rate_limit::WILDCARD_BUCKET, limit)
    }

    /// Replaces all bucket limits.
    pub fn bucket_limits(mut self, buckets: BucketLimits) -> Self {
        self.buckets = buckets;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds and validates the gatherer.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit or retry parameter is invalid.
    pub fn build(self) -> FanoutResult<Gatherer> {
        Gatherer::new(GatherConfig::new(
            self.global.unwrap_or_default(),
            self.buckets,
            self.retry.unwrap_or_default(),
        ))
    }
}
