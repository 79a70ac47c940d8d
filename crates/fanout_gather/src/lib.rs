//! Rate-limited concurrent task gatherer.
//!
//! The [`Gatherer`] runs a batch of [`TaskSpec`](fanout_core::TaskSpec)s
//! concurrently, admitting each attempt through a global limit and an
//! optional per-bucket limit, retrying failures with exponential backoff,
//! and returning results aligned with the input order.
//!
//! A batch in which nothing succeeds is reported as
//! [`GatherErrorKind::AllFailed`](fanout_error::GatherErrorKind::AllFailed);
//! anything else comes back as a [`BatchResult`](fanout_core::BatchResult)
//! whose failed entries the caller inspects.
//!
//! # Example
//!
//! ```
//! use fanout_core::TaskSpec;
//! use fanout_gather::Gatherer;
//! use fanout_rate_limit::Limit;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gatherer = Gatherer::builder()
//!     .global_limit(Limit::concurrency_only(4))
//!     .build()?;
//!
//! let tasks = (1..=3)
//!     .map(|n| TaskSpec::new(move || async move { Ok::<_, String>(n * 10) }))
//!     .collect();
//!
//! let batch = gatherer.gather(tasks).await?;
//! assert_eq!(batch.successes(), vec![&10, &20, &30]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod gatherer;
mod hooks;
mod logged;

pub use gatherer::{GatherConfig, Gatherer, GathererBuilder};
pub use hooks::{GatherHooks, Labeler, default_label};
pub use logged::gather_logged;
pub use tokio_util::sync::CancellationToken;
