//! Retry policy validation errors.

/// Specific reasons retry settings are rejected.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum RetryConfigErrorKind {
    /// Backoff factor must be finite and at least 1.0
    #[display("backoff factor must be finite and >= 1.0, got {}", _0)]
    InvalidFactor(f64),
    /// Initial backoff must not exceed the ceiling
    #[display("initial backoff {:?} exceeds max backoff {:?}", initial, max)]
    InvertedBounds {
        /// Initial backoff
        initial: std::time::Duration,
        /// Maximum backoff
        max: std::time::Duration,
    },
}

/// Retry settings error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Retry Config Error: {} at line {} in {}", kind, line, file)]
pub struct RetryConfigError {
    /// The specific error condition
    pub kind: RetryConfigErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl RetryConfigError {
    /// Create a new RetryConfigError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RetryConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
