// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagrt`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagrt",
    version,
    about = "Run a task graph scenario through the direct scheduler on simulated devices.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the scenario file (TOML).
    ///
    /// Default: `Dagrt.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Dagrt.toml")]
    pub config: String,

    /// Submit only this node and the nodes it depends on.
    #[arg(long, value_name = "NAME")]
    pub node: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGRT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph, but don't submit anything.
    #[arg(long)]
    pub dry_run: bool,
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
