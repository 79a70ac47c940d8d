//! Fanout - rate-limited concurrent task gatherer
//!
//! Fanout runs a batch of independent asynchronous (or blocking) tasks
//! concurrently while enforcing a global rate and concurrency limit plus
//! optional per-bucket limits, retries failures under a batch-wide retry
//! budget, and returns one outcome per task in input order.
//!
//! # Quick Start
//!
//! ```
//! use fanout::{Gatherer, Limit, RetrySettings, TaskSpec};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gatherer = Gatherer::builder()
//!     .global_limit(Limit::new(50.0, 8))
//!     .default_bucket_limit(Limit::new(10.0, 2))
//!     .retry(
//!         RetrySettings::builder()
//!             .max_task_retries(2)
//!             .max_total_retries(10)
//!             .initial_backoff(Duration::from_millis(10))
//!             .build(),
//!     )
//!     .build()?;
//!
//! let tasks = ["alpha.example", "beta.example", "alpha.example"]
//!     .into_iter()
//!     .map(|host| {
//!         TaskSpec::new(move || async move { Ok::<_, String>(host.len()) }).in_bucket(host)
//!     })
//!     .collect();
//!
//! let batch = gatherer.gather(tasks).await?;
//! assert_eq!(batch.successes(), vec![&13, &12, &13]);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Fanout is organized as a workspace with focused crates:
//!
//! - `fanout_error` - Error types
//! - `fanout_core` - Task descriptors, outcomes, retry policy and progress reporting
//! - `fanout_rate_limit` - Token buckets, limiters and configuration loading
//! - `fanout_gather` - The gatherer and its scheduling loop
//!
//! This crate (`fanout`) re-exports everything for convenience and ships the
//! `fanout` command-line tool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use fanout_core::*;
pub use fanout_error::*;
pub use fanout_gather::*;
pub use fanout_rate_limit::*;

/// Logging initialisation
pub mod telemetry;
