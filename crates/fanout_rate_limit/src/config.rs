//! TOML configuration for limits and retries.
//!
//! Configuration is layered:
//! - Bundled defaults (include_str! from fanout.toml)
//! - User overrides (~/.config/fanout/fanout.toml, then ./fanout.toml)
//!
//! Later layers override individual keys of earlier ones. The loaded value is
//! handed to the gatherer explicitly; nothing here is global.

use crate::{BucketLimits, Limit};
use config::{Config, File, FileFormat};
use fanout_core::RetrySettings;
use fanout_error::{ConfigError, ConfigErrorKind, FanoutError, FanoutResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../../../fanout.toml");

/// The `[limits]` table.
///
/// ```toml
/// [limits.global]
/// rps = 20
/// concurrency = 20
///
/// [limits.buckets."*"]
/// rps = 2
/// concurrency = 2
///
/// [limits.buckets."api.example.com"]
/// rps = 10
/// concurrency = 4
/// burst = 5
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, derive_getters::Getters)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Ceiling applied to every task
    #[serde(default)]
    global: Limit,

    /// Per-bucket ceilings; `"*"` is the default bucket limit
    #[serde(default)]
    buckets: BucketLimits,
}

impl LimitsConfig {
    /// Limits section with the given global limit and bucket limits.
    pub fn new(global: Limit, buckets: BucketLimits) -> Self {
        Self { global, buckets }
    }
}

/// Top-level fanout configuration.
///
/// # Example
///
/// ```no_run
/// use fanout_rate_limit::FanoutConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FanoutConfig::load()?;
/// println!("global rps: {}", config.limits().global().rps());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, derive_getters::Getters)]
#[serde(deny_unknown_fields)]
pub struct FanoutConfig {
    /// Global and per-bucket limits
    #[serde(default)]
    limits: LimitsConfig,

    /// Retry policy
    #[serde(default)]
    retry: RetrySettings,
}

impl FanoutConfig {
    /// Configuration from explicit parts.
    pub fn new(limits: LimitsConfig, retry: RetrySettings) -> Self {
        Self { limits, retry }
    }

    /// The bundled defaults alone, ignoring user files.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled file does not parse.
    pub fn bundled() -> FanoutResult<Self> {
        Self::finish(
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml)),
        )
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> FanoutResult<Self> {
        debug!("Loading configuration from file");

        Self::finish(Config::builder().add_source(File::from(path.as_ref())))
    }

    /// Load configuration with precedence: current dir > home dir > bundled defaults.
    ///
    /// User config files are optional and silently skipped when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if any present file fails to parse or the merged
    /// result is invalid.
    #[instrument]
    pub fn load() -> FanoutResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/fanout/fanout.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("fanout").required(false));

        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> FanoutResult<Self> {
        let config: Self = builder
            .build()
            .map_err(|e| {
                FanoutError::from(ConfigError::new(ConfigErrorKind::Load(e.to_string())))
            })?
            .try_deserialize()
            .map_err(|e| {
                FanoutError::from(ConfigError::new(ConfigErrorKind::Shape(e.to_string())))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates limits and retry settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::Invalid`] naming the first section
    /// (`limits.global`, `limits.buckets` or `retry`) that holds a bad value.
    pub fn validate(&self) -> FanoutResult<()> {
        self.limits
            .global
            .validate()
            .map_err(|e| invalid("limits.global", e.kind))?;
        self.limits
            .buckets
            .validate()
            .map_err(|e| invalid("limits.buckets", e.kind))?;
        self.retry
            .validate()
            .map_err(|e| invalid("retry", e.kind))?;
        Ok(())
    }

    /// Replace the global limit.
    pub fn with_global_limit(mut self, limit: Limit) -> Self {
        self.limits.global = limit;
        self
    }

    /// Add or replace one bucket limit.
    pub fn with_bucket_limit(mut self, key: impl Into<String>, limit: Limit) -> Self {
        self.limits.buckets.insert(key, limit);
        self
    }

    /// Replace the retry settings.
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }
}

#[track_caller]
fn invalid(section: &str, reason: impl std::fmt::Display) -> FanoutError {
    ConfigError::new(ConfigErrorKind::Invalid {
        section: section.to_string(),
        reason: reason.to_string(),
    })
    .into()
}
