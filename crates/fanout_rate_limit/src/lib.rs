//! Rate and concurrency limiting for fanout batches.
//!
//! A batch is governed by one global [`Limit`] and, optionally, one limit per
//! bucket key (for example one per remote host). Each limit combines:
//! - a token bucket refilled continuously at `rps` tokens per second
//! - a Tokio semaphore capping the number of attempts in flight
//!
//! [`LimiterSet`] owns the global limiter plus lazily created bucket
//! limiters and hands out [`LimitPermit`]s that release their concurrency
//! slots on drop.
//!
//! Limits and retry settings are loaded from `fanout.toml` through
//! [`FanoutConfig`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod config;
mod limit;
mod limiter;

pub use bucket::TokenBucket;
pub use config::{FanoutConfig, LimitsConfig};
pub use limit::{BucketLimits, Limit, WILDCARD_BUCKET};
pub use limiter::{LimitPermit, LimiterSet, RateLimiter};
