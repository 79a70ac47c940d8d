//! Error types for the fanout workspace.
//!
//! This crate provides the foundation error types used by every fanout crate.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! Per-task failures ([`TaskError`]) are recorded inside batch results and are
//! never raised on their own. Only malformed configuration and batches in
//! which nothing succeeded surface as a [`FanoutError`].
//!
//! # Examples
//!
//! ```
//! use fanout_error::{FanoutResult, LimitError, LimitErrorKind};
//!
//! fn check(concurrency: usize) -> FanoutResult<()> {
//!     if concurrency == 0 {
//!         Err(LimitError::new(LimitErrorKind::ZeroConcurrency))?
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(0).is_err());
//! assert!(check(4).is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod gather;
mod limit;
mod retry;
mod task;

pub use config::{ConfigError, ConfigErrorKind};
pub use error::{FanoutError, FanoutErrorKind, FanoutResult};
pub use gather::{GatherError, GatherErrorKind};
pub use limit::{LimitError, LimitErrorKind};
pub use retry::{RetryConfigError, RetryConfigErrorKind};
pub use task::{TaskError, TaskErrorKind};
