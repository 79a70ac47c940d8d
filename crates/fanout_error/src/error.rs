//! Top-level error wrapper types.

use crate::{ConfigError, GatherError, LimitError, RetryConfigError, TaskError};

/// The foundation error enum covering every fallible fanout operation.
///
/// # Examples
///
/// ```
/// use fanout_error::{ConfigError, ConfigErrorKind, FanoutError};
///
/// let err: FanoutError =
///     ConfigError::new(ConfigErrorKind::Load("fanout.toml not found".into())).into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum FanoutErrorKind {
    /// Invalid rate or concurrency limit
    #[from(LimitError)]
    Limit(LimitError),
    /// Invalid retry settings
    #[from(RetryConfigError)]
    RetryConfig(RetryConfigError),
    /// Batch-level gather failure
    #[from(GatherError)]
    Gather(GatherError),
    /// Configuration loading error
    #[from(ConfigError)]
    Config(ConfigError),
    /// A single task failure promoted to an error by the caller
    #[from(TaskError)]
    Task(TaskError),
}

/// Fanout error with kind discrimination.
///
/// # Examples
///
/// ```
/// use fanout_error::{FanoutErrorKind, FanoutResult, GatherError, GatherErrorKind};
///
/// fn run() -> FanoutResult<()> {
///     Err(GatherError::new(GatherErrorKind::AllFailed {
///         total: 2,
///         failed: 2,
///         cancelled: 0,
///     }))?
/// }
///
/// let err = run().unwrap_err();
/// assert!(matches!(err.kind(), FanoutErrorKind::Gather(_)));
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Fanout Error: {}", _0)]
pub struct FanoutError(Box<FanoutErrorKind>);

impl FanoutError {
    /// Create a new error from a kind.
    pub fn new(kind: FanoutErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &FanoutErrorKind {
        &self.0
    }

    /// Whether this is the batch-level "nothing succeeded" failure.
    pub fn is_all_failed(&self) -> bool {
        matches!(self.kind(), FanoutErrorKind::Gather(_))
    }
}

// Generic From implementation for any type that converts to FanoutErrorKind
impl<T> From<T> for FanoutError
where
    T: Into<FanoutErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for fanout operations.
pub type FanoutResult<T> = std::result::Result<T, FanoutError>;
