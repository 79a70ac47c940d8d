//! Configuration loading errors.

/// Which stage of loading `fanout.toml` went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConfigErrorKind {
    /// A configuration source could not be read or is not valid TOML
    #[display("failed to load configuration: {}", _0)]
    Load(String),
    /// The TOML is readable but its tables or keys do not match the schema
    #[display("unexpected configuration layout: {}", _0)]
    Shape(String),
    /// A section parsed but holds values the gatherer cannot enforce
    #[display("invalid [{}]: {}", section, reason)]
    Invalid {
        /// Dotted section name, e.g. `limits.global`
        section: String,
        /// Why the values were rejected
        reason: String,
    },
}

/// Configuration error with source location.
///
/// # Examples
///
/// ```
/// use fanout_error::{ConfigError, ConfigErrorKind};
///
/// let err = ConfigError::new(ConfigErrorKind::Invalid {
///     section: "limits.global".to_string(),
///     reason: "concurrency must be at least 1".to_string(),
/// });
/// assert!(format!("{}", err).contains("[limits.global]"));
/// assert!(matches!(err.kind, ConfigErrorKind::Invalid { .. }));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    /// The specific error condition
    pub kind: ConfigErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError at the current location.
    #[track_caller]
    pub fn new(kind: ConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}
