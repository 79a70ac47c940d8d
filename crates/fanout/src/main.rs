//! Fanout CLI binary.
//!
//! This binary provides command-line access to the gatherer:
//! - Fetch URLs concurrently under global and per-host limits
//! - Inspect the effective configuration

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, load_config, run_fetch, show_config};

    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    fanout::telemetry::init_telemetry(log_level, cli.json_logs)?;

    let config = load_config(cli.config.as_deref())?;

    // Execute the requested command
    match cli.command {
        Commands::Fetch(args) => {
            run_fetch(config, args).await?;
        }

        Commands::Config { format } => {
            show_config(&config, format)?;
        }
    }

    Ok(())
}
