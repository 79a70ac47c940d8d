//! Batch-level gather errors.

/// Batch-level failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum GatherErrorKind {
    /// Not a single task in a non-empty batch succeeded
    #[display(
        "all {} tasks in batch failed (0 succeeded, {} failed, {} cancelled)",
        total,
        failed,
        cancelled
    )]
    AllFailed {
        /// Batch size
        total: usize,
        /// Tasks that ran and failed
        failed: usize,
        /// Tasks that never started
        cancelled: usize,
    },
}

/// Gather error with location tracking.
///
/// # Examples
///
/// ```
/// use fanout_error::{GatherError, GatherErrorKind};
///
/// let err = GatherError::new(GatherErrorKind::AllFailed {
///     total: 5,
///     failed: 5,
///     cancelled: 0,
/// });
/// assert!(format!("{}", err).contains("all 5 tasks"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Gather Error: {} at line {} in {}", kind, line, file)]
pub struct GatherError {
    /// The specific error condition
    pub kind: GatherErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl GatherError {
    /// Create a new GatherError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: GatherErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &GatherErrorKind {
        &self.kind
    }
}
