use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,fanout=debug";

/// Build the log filter: `RUST_LOG` wins, then `level` for everything with
/// the fanout crates at debug.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},fanout=debug",
            level.as_str().to_ascii_lowercase()
        ))
    })
}

/// Initialize logging to stderr.
///
/// # Arguments
///
/// * `level` - Baseline level for crates other than fanout's own
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_telemetry(level: Level, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    debug!(%level, json, "Telemetry initialized");
    Ok(())
}

/// Initialize console logging with the default filter.
///
/// Useful for tests and small programs that embed the gatherer.
pub fn init_console_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
