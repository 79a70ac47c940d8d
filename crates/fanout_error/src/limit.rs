//! Rate limit validation errors.

/// Specific reasons a `Limit` is rejected.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum LimitErrorKind {
    /// Requests per second must be a finite, non-negative number
    #[display("requests per second must be finite and >= 0, got {}", _0)]
    InvalidRate(f64),
    /// At least one task must be allowed in flight
    #[display("concurrency must be at least 1")]
    ZeroConcurrency,
    /// Burst capacity must hold at least one token
    #[display("burst must be finite and >= 1, got {}", _0)]
    InvalidBurst(f64),
    /// A bucket limit was rejected
    #[display("bucket '{}': {}", bucket, reason)]
    InvalidBucket {
        /// Bucket key
        bucket: String,
        /// Why the bucket limit is invalid
        reason: String,
    },
    /// The limiter was shut down while a task waited for a slot
    #[display("limiter closed while waiting for a slot")]
    Closed,
}

/// Limit error with location tracking.
///
/// # Examples
///
/// ```
/// use fanout_error::{LimitError, LimitErrorKind};
///
/// let err = LimitError::new(LimitErrorKind::InvalidRate(-1.0));
/// assert!(format!("{}", err).contains("requests per second"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Limit Error: {} at line {} in {}", kind, line, file)]
pub struct LimitError {
    /// The specific error condition
    pub kind: LimitErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl LimitError {
    /// Create a new LimitError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: LimitErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &LimitErrorKind {
        &self.kind
    }
}
