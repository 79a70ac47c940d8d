//! Limit values: a refill rate plus an in-flight cap.

use fanout_error::{LimitError, LimitErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Semaphore;

/// Bucket key whose limit applies to every bucket without its own entry.
pub const WILDCARD_BUCKET: &str = "*";

/// Throughput ceiling for the whole batch or for one bucket.
///
/// A task attempt may start only when a rate token is available **and** the
/// number of attempts in flight is below `concurrency`. An `rps` of zero
/// disables the rate dimension, leaving a pure concurrency cap.
///
/// # Examples
///
/// ```
/// use fanout_rate_limit::Limit;
///
/// let per_host = Limit::new(2.0, 2);
/// assert_eq!(*per_host.rps(), 2.0);
/// assert_eq!(*per_host.concurrency(), 2);
/// assert_eq!(*per_host.burst(), 1.0);
/// assert!(per_host.validate().is_ok());
///
/// assert!(Limit::new(-1.0, 2).validate().is_err());
/// assert!(Limit::new(1.0, 0).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
#[serde(deny_unknown_fields)]
pub struct Limit {
    /// Tokens replenished per second; 0 means unconstrained.
    #[serde(default)]
    rps: f64,

    /// Maximum attempts in flight.
    #[serde(default = "unbounded_concurrency")]
    concurrency: usize,

    /// Token bucket capacity.
    #[serde(default = "default_burst")]
    burst: f64,
}

fn unbounded_concurrency() -> usize {
    Semaphore::MAX_PERMITS
}

fn default_burst() -> f64 {
    1.0
}

impl Default for Limit {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl Limit {
    /// Limit with the given rate and concurrency and a burst of one token.
    pub fn new(rps: f64, concurrency: usize) -> Self {
        Self {
            rps,
            concurrency,
            burst: default_burst(),
        }
    }

    /// No rate constraint and no practical concurrency cap.
    pub fn unlimited() -> Self {
        Self::new(0.0, unbounded_concurrency())
    }

    /// Concurrency cap only.
    pub fn concurrency_only(concurrency: usize) -> Self {
        Self::new(0.0, concurrency)
    }

    /// Allow up to `burst` tokens to accumulate while idle.
    pub fn with_burst(mut self, burst: f64) -> Self {
        self.burst = burst;
        self
    }

    /// Whether the rate dimension is active.
    pub fn is_rate_limited(&self) -> bool {
        self.rps > 0.0
    }

    /// Checks that the limit can be enforced.
    ///
    /// # Errors
    ///
    /// Returns an error for a negative or non-finite rate, zero concurrency,
    /// or a burst below one token.
    pub fn validate(&self) -> Result<(), LimitError> {
        if !self.rps.is_finite() || self.rps < 0.0 {
            return Err(LimitError::new(LimitErrorKind::InvalidRate(self.rps)));
        }
        if self.concurrency == 0 {
            return Err(LimitError::new(LimitErrorKind::ZeroConcurrency));
        }
        if !self.burst.is_finite() || self.burst < 1.0 {
            return Err(LimitError::new(LimitErrorKind::InvalidBurst(self.burst)));
        }
        Ok(())
    }
}

/// Per-bucket limits keyed by bucket name.
///
/// The [`WILDCARD_BUCKET`] entry, when present, is the default for every
/// bucket key that has no explicit entry. Buckets resolving to the wildcard
/// still get independent limiters.
///
/// # Examples
///
/// ```
/// use fanout_rate_limit::{BucketLimits, Limit};
///
/// let buckets = BucketLimits::new()
///     .with_bucket("api.example.com", Limit::new(5.0, 4))
///     .with_default(Limit::new(2.0, 2));
///
/// assert_eq!(buckets.resolve("api.example.com"), Some(&Limit::new(5.0, 4)));
/// assert_eq!(buckets.resolve("other.org"), Some(&Limit::new(2.0, 2)));
/// assert_eq!(BucketLimits::new().resolve("other.org"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketLimits(BTreeMap<String, Limit>);

impl BucketLimits {
    /// No bucket limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the limit for one bucket.
    pub fn with_bucket(mut self, key: impl Into<String>, limit: Limit) -> Self {
        self.insert(key, limit);
        self
    }

    /// Set the wildcard limit.
    pub fn with_default(self, limit: Limit) -> Self {
        self.with_bucket(WILDCARD_BUCKET, limit)
    }

    /// Add or replace the limit for one bucket in place.
    pub fn insert(&mut self, key: impl Into<String>, limit: Limit) {
        self.0.insert(key.into(), limit);
    }

    /// Effective limit for `key`: its own entry, else the wildcard, else none.
    pub fn resolve(&self, key: &str) -> Option<&Limit> {
        self.0.get(key).or_else(|| self.0.get(WILDCARD_BUCKET))
    }

    /// Whether no bucket limits are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of configured entries, including the wildcard.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Configured entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Limit)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Validates every entry.
    ///
    /// # Errors
    ///
    /// Returns [`LimitErrorKind::InvalidBucket`] naming the first bad bucket.
    pub fn validate(&self) -> Result<(), LimitError> {
        for (bucket, limit) in &self.0 {
            limit.validate().map_err(|e| {
                LimitError::new(LimitErrorKind::InvalidBucket {
                    bucket: bucket.clone(),
                    reason: e.kind.to_string(),
                })
            })?;
        }
        Ok(())
    }
}

impl FromIterator<(String, Limit)> for BucketLimits {
    fn from_iter<I: IntoIterator<Item = (String, Limit)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_is_valid_and_unconstrained() {
        let limit = Limit::unlimited();
        assert!(limit.validate().is_ok());
        assert!(!limit.is_rate_limited());
        assert_eq!(*limit.concurrency(), Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_burst_below_one_is_rejected() {
        let err = Limit::new(1.0, 1).with_burst(0.5).validate().unwrap_err();
        assert_eq!(err.kind(), &LimitErrorKind::InvalidBurst(0.5));
    }

    #[test]
    fn test_nan_rate_is_rejected() {
        assert!(Limit::new(f64::NAN, 1).validate().is_err());
    }

    #[test]
    fn test_bucket_validation_names_bucket() {
        let buckets = BucketLimits::new().with_bucket("slow.example", Limit::new(1.0, 0));
        let err = buckets.validate().unwrap_err();
        match err.kind() {
            LimitErrorKind::InvalidBucket { bucket, .. } => assert_eq!(bucket, "slow.example"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
