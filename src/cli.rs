// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `plangraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "plangraph",
    version,
    about = "Check a planning network for validity and cardinality consistency.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the network description (TOML).
    ///
    /// Default: `Network.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Network.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PLANGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the description and print it, but don't build the graph.
    #[arg(long)]
    pub dry_run: bool,

    /// After building, write the graph back out as a description to PATH.
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
