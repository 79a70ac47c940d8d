//! Rate limiter implementation using a token bucket and Tokio Semaphore.
//!
//! Each [`RateLimiter`] enforces one [`Limit`]:
//! - a [`TokenBucket`] for requests per second (absent when `rps == 0`)
//! - a Tokio semaphore for attempts in flight
//!
//! A [`LimiterSet`] combines the global limiter with per-bucket limiters
//! created on first use, and grants a [`LimitPermit`] only when both agree.

use crate::{BucketLimits, Limit, TokenBucket};
use fanout_error::{LimitError, LimitErrorKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, trace};

/// Rate limiter that enforces one rate and one concurrency ceiling.
///
/// Tracks how many attempts currently hold a permit and the highest number
/// ever observed at once.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    limit: Limit,
    tokens: Option<TokenBucket>,
    slots: Arc<Semaphore>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RateLimiter {
    /// Create a limiter enforcing `limit`.
    ///
    /// The limit should already be validated; concurrency is clamped to what
    /// a semaphore can hold.
    pub fn new(name: impl Into<String>, limit: Limit) -> Self {
        let tokens = limit
            .is_rate_limited()
            .then(|| TokenBucket::new(*limit.rps(), *limit.burst()));
        let permits = (*limit.concurrency()).clamp(1, Semaphore::MAX_PERMITS);

        Self {
            name: name.into(),
            limit,
            tokens,
            slots: Arc::new(Semaphore::new(permits)),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Name used in log output (`global` or the bucket key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The enforced limit.
    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    /// Attempts currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of attempts that held a permit at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Free concurrency slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, LimitError> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| LimitError::new(LimitErrorKind::Closed))
    }

    async fn acquire_token(&self) {
        if let Some(tokens) = &self.tokens {
            tokens.acquire().await;
        }
    }

    fn refund_token(&self) {
        if let Some(tokens) = &self.tokens {
            trace!(limiter = %self.name, "Refunding rate token");
            tokens.refund();
        }
    }

    fn enter(self: &Arc<Self>, slot: OwnedSemaphorePermit) -> Grant {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Grant {
            limiter: Arc::clone(self),
            _slot: slot,
        }
    }
}

/// One limiter's share of a permit.
#[derive(Debug)]
struct Grant {
    limiter: Arc<RateLimiter>,
    _slot: OwnedSemaphorePermit,
}

impl Drop for Grant {
    fn drop(&mut self) {
        self.limiter.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard for an admitted attempt.
///
/// Dropping it releases the global and bucket concurrency slots. Rate tokens
/// stay spent unless [`refund`](Self::refund) is called.
#[derive(Debug)]
pub struct LimitPermit {
    global: Grant,
    bucket: Option<Grant>,
}

impl LimitPermit {
    /// Return the rate tokens this permit consumed, then release its slots.
    ///
    /// Used when the attempt turned out not to need a real remote call.
    pub fn refund(self) {
        if let Some(bucket) = &self.bucket {
            bucket.limiter.refund_token();
        }
        self.global.limiter.refund_token();
    }

    /// Bucket limiter name, if a bucket limit applied.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_ref().map(|g| g.limiter.name())
    }
}

/// Global limiter plus per-bucket limiters for one batch.
///
/// # Examples
///
/// ```
/// use fanout_rate_limit::{BucketLimits, Limit, LimiterSet};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let limiters = LimiterSet::new(
///     Limit::concurrency_only(4),
///     BucketLimits::new().with_default(Limit::concurrency_only(1)),
/// );
///
/// let permit = limiters.acquire(Some("a.example")).await?;
/// assert_eq!(permit.bucket(), Some("a.example"));
/// assert_eq!(limiters.global().in_flight(), 1);
///
/// drop(permit);
/// assert_eq!(limiters.global().in_flight(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LimiterSet {
    global: Arc<RateLimiter>,
    bucket_limits: BucketLimits,
    buckets: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterSet {
    /// Limiter set with the given global limit and bucket limits.
    pub fn new(global: Limit, bucket_limits: BucketLimits) -> Self {
        Self {
            global: Arc::new(RateLimiter::new("global", global)),
            bucket_limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The global limiter.
    pub fn global(&self) -> &Arc<RateLimiter> {
        &self.global
    }

    /// Limiter for `key`, created on first use; `None` when no limit applies.
    pub fn bucket(&self, key: &str) -> Option<Arc<RateLimiter>> {
        let limit = *self.bucket_limits.resolve(key)?;
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let limiter = buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(
                bucket = key,
                rps = *limit.rps(),
                concurrency = *limit.concurrency(),
                "Creating bucket limiter"
            );
            Arc::new(RateLimiter::new(key, limit))
        });
        Some(Arc::clone(limiter))
    }

    /// Bucket limiters created so far, keyed by bucket.
    pub fn bucket_limiters(&self) -> HashMap<String, Arc<RateLimiter>> {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until both the bucket and global limiters admit one attempt.
    ///
    /// The bucket is settled first (slot, then token) and only then the
    /// global limiter (slot, then token). A task never holds a global slot
    /// while waiting on its own bucket's slot or rate, so a slow bucket does
    /// not stall tasks in other buckets.
    ///
    /// The bucket token is spent before the global wait. If the returned
    /// future is dropped during that wait the token is handed back.
    ///
    /// # Errors
    ///
    /// Returns an error only if a limiter semaphore was closed.
    #[instrument(level = "trace", skip(self))]
    pub async fn acquire(&self, bucket: Option<&str>) -> Result<LimitPermit, LimitError> {
        let bucket_limiter = bucket.and_then(|key| self.bucket(key));

        let bucket_slot = match &bucket_limiter {
            Some(limiter) => {
                let slot = limiter.acquire_slot().await?;
                limiter.acquire_token().await;
                Some(slot)
            }
            None => None,
        };
        let pending = PendingRefund(bucket_limiter.as_deref());

        let global_slot = self.global.acquire_slot().await?;
        self.global.acquire_token().await;
        pending.disarm();

        let bucket = bucket_limiter
            .zip(bucket_slot)
            .map(|(limiter, slot)| limiter.enter(slot));
        let global = self.global.enter(global_slot);
        trace!(in_flight = self.global.in_flight(), "Attempt admitted");

        Ok(LimitPermit { global, bucket })
    }
}

/// Bucket token taken ahead of the global wait, refunded unless disarmed.
struct PendingRefund<'a>(Option<&'a RateLimiter>);

impl PendingRefund<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for PendingRefund<'_> {
    fn drop(&mut self) {
        if let Some(limiter) = self.0.take() {
            limiter.refund_token();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unbucketed_task_skips_bucket_limits() {
        let limiters = LimiterSet::new(
            Limit::unlimited(),
            BucketLimits::new().with_bucket("a", Limit::concurrency_only(1)),
        );
        let permit = limiters.acquire(None).await.unwrap();
        assert_eq!(permit.bucket(), None);
        assert!(limiters.bucket_limiters().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_bucket_without_wildcard_is_unconstrained() {
        let limiters = LimiterSet::new(
            Limit::unlimited(),
            BucketLimits::new().with_bucket("a", Limit::concurrency_only(1)),
        );
        let first = limiters.acquire(Some("b")).await.unwrap();
        let second = limiters.acquire(Some("b")).await.unwrap();
        assert_eq!(first.bucket(), None);
        assert_eq!(second.bucket(), None);
    }

    #[tokio::test]
    async fn test_wildcard_buckets_are_independent() {
        let limiters = LimiterSet::new(
            Limit::unlimited(),
            BucketLimits::new().with_default(Limit::concurrency_only(1)),
        );
        let _a = limiters.acquire(Some("a")).await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(100), limiters.acquire(Some("b"))).await;
        assert!(b.is_ok(), "bucket b must not wait on bucket a");

        let a2 = tokio::time::timeout(Duration::from_millis(50), limiters.acquire(Some("a"))).await;
        assert!(a2.is_err(), "bucket a is saturated");
    }

    #[tokio::test]
    async fn test_peak_tracks_simultaneous_permits() {
        let limiters = LimiterSet::new(Limit::concurrency_only(3), BucketLimits::new());
        let p1 = limiters.acquire(None).await.unwrap();
        let p2 = limiters.acquire(None).await.unwrap();
        drop(p1);
        let _p3 = limiters.acquire(None).await.unwrap();
        drop(p2);

        assert_eq!(limiters.global().in_flight(), 1);
        assert_eq!(limiters.global().peak_in_flight(), 2);
        assert_eq!(limiters.global().available_slots(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_global_wait_returns_bucket_token() {
        let limiters = LimiterSet::new(
            Limit::concurrency_only(1),
            BucketLimits::new().with_bucket("a", Limit::new(1.0, 5)),
        );
        let _held = limiters.acquire(None).await.unwrap();

        let waited =
            tokio::time::timeout(Duration::from_millis(50), limiters.acquire(Some("a"))).await;
        assert!(waited.is_err(), "global slot is held");

        let bucket = limiters.bucket("a").unwrap();
        assert_eq!(bucket.tokens.as_ref().map(TokenBucket::available), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_rate_wait_holds_no_global_slot() {
        let limiters = LimiterSet::new(
            Limit::concurrency_only(1),
            BucketLimits::new().with_bucket("slow", Limit::new(0.2, 10)),
        );
        // Spend the slow bucket's only token
        drop(limiters.acquire(Some("slow")).await.unwrap());

        let slow = limiters.acquire(Some("slow"));
        tokio::pin!(slow);
        let polled = tokio::time::timeout(Duration::from_millis(10), &mut slow).await;
        assert!(polled.is_err());

        assert_eq!(limiters.global().available_slots(), 1);
        let other =
            tokio::time::timeout(Duration::from_millis(10), limiters.acquire(None)).await;
        assert!(other.is_ok(), "unbucketed task must not wait on the slow bucket");
    }
}
