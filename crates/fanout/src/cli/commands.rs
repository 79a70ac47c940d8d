//! CLI command definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fanout - run work concurrently under rate, concurrency and retry limits
#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Run work concurrently under rate, concurrency and retry limits", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Load configuration from this file instead of the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch URLs concurrently, limited globally and per host
    Fetch(FetchArgs),

    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },
}

/// Arguments of `fanout fetch`.
///
/// Every limit flag overrides the matching configuration value.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// URLs to fetch
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Global requests per second (0 disables the rate limit)
    #[arg(long)]
    pub rps: Option<f64>,

    /// Global maximum of requests in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Requests per second for each host
    #[arg(long)]
    pub per_host_rps: Option<f64>,

    /// Maximum of requests in flight for each host
    #[arg(long)]
    pub per_host_concurrency: Option<usize>,

    /// Retries allowed per URL; the batch may spend ten times this many
    #[arg(long)]
    pub retries: Option<u32>,

    /// Give up on URLs not yet started after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<f64>,

    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format
    #[default]
    Human,
    /// JSON format
    Json,
}
