//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the fanout binary.

mod commands;
mod fetch;
mod show_config;

pub use commands::{Cli, Commands, FetchArgs, OutputFormat};
pub use fetch::run_fetch;
pub use show_config::{load_config, show_config};
