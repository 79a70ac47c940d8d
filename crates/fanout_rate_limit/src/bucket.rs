//! Continuously refilled token bucket with refunds.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket refilled at a fixed rate, starting full.
///
/// Waiters are woken either when enough time has passed for a token to
/// accumulate or when a token is handed back with [`refund`](Self::refund).
///
/// # Examples
///
/// ```
/// use fanout_rate_limit::TokenBucket;
///
/// # #[tokio::main]
/// # async fn main() {
/// let bucket = TokenBucket::new(1.0, 1.0);
/// bucket.acquire().await;
/// assert!(!bucket.try_acquire());
///
/// bucket.refund();
/// assert!(bucket.try_acquire());
/// # }
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
    refunded: Notify,
}

impl TokenBucket {
    /// Bucket refilling `rate` tokens per second, holding at most `capacity`.
    ///
    /// `rate` must be positive and `capacity` at least one; callers validate
    /// through [`Limit::validate`](crate::Limit::validate).
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            refunded: Notify::new(),
        }
    }

    /// Refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            // Vanishingly small rates overflow a Duration; wait "forever" then
            let secs_to_wait = (1.0 - state.tokens) / self.rate;
            Err(Duration::try_from_secs_f64(secs_to_wait).unwrap_or(Duration::MAX))
        }
    }

    /// Take a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.try_take().is_ok()
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            let refunded = self.refunded.notified();
            tokio::pin!(refunded);
            // Register before checking so a refund between the check and the
            // wait is not missed.
            refunded.as_mut().enable();

            let wait = match self.try_take() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate token");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut refunded => {}
            }
        }
    }

    /// Return one token and wake every waiter.
    pub fn refund(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.tokens = (state.tokens + 1.0).min(self.capacity);
        }
        self.refunded.notify_waiters();
    }

    /// Whole tokens currently available.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
        state.tokens.floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::new(2.0, 1.0);
        let start = Instant::now();

        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;

        // First token is free, then one every 500ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_allows_immediate_tokens() {
        let bucket = TokenBucket::new(1.0, 3.0);
        assert_eq!(bucket.available(), 3);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_wakes_waiter() {
        let bucket = std::sync::Arc::new(TokenBucket::new(0.01, 1.0));
        bucket.acquire().await;

        let waiter = {
            let bucket = std::sync::Arc::clone(&bucket);
            tokio::spawn(async move { bucket.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        let start = Instant::now();
        bucket.refund();
        waiter.await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_waits_instead_of_overflowing() {
        let bucket = TokenBucket::new(1e-25, 1.0);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        let waited = tokio::time::timeout(Duration::from_secs(3600), bucket.acquire()).await;
        assert!(waited.is_err());

        bucket.refund();
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_refund_is_capped_at_capacity() {
        let bucket = TokenBucket::new(1.0, 1.0);
        bucket.refund();
        bucket.refund();
        assert_eq!(bucket.available(), 1);
    }
}
