//! Configuration loading and the `fanout config` command.

use super::OutputFormat;
use fanout::{FanoutConfig, FanoutResult};
use std::path::Path;
use tracing::debug;

/// Load the configuration from `path`, or from the default locations.
pub fn load_config(path: Option<&Path>) -> FanoutResult<FanoutConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration from explicit file");
            FanoutConfig::from_file(path)
        }
        None => FanoutConfig::load(),
    }
}

/// Print the effective configuration.
pub fn show_config(
    config: &FanoutConfig,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => {
            let limits = config.limits();
            println!("[limits.global]");
            println!("{:?}", limits.global());
            for (key, limit) in limits.buckets().iter() {
                println!();
                println!("[limits.buckets.{:?}]", key);
                println!("{:?}", limit);
            }
            println!();
            println!("[retry]");
            println!("{:#?}", config.retry());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[limits.global]\nrps = 3.0\nconcurrency = 4").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(*config.limits().global().concurrency(), 4);
        assert!(show_config(&config, OutputFormat::Json).is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/fanout.toml"))).is_err());
    }
}
