// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskgroup`.
///
/// Flags override the matching config file values.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskgroup",
    version,
    about = "Run simulated tasks through a bounded-concurrency task group.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to a config file (TOML). Defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Maximum number of tasks running at once.
    #[arg(long, value_name = "N")]
    pub max_running: Option<usize>,

    /// Number of simulated tasks.
    #[arg(long, value_name = "N")]
    pub tasks: Option<usize>,

    /// Progress steps per task.
    #[arg(long, value_name = "N")]
    pub steps: Option<u32>,

    /// Delay between progress steps in milliseconds.
    #[arg(long, value_name = "MS")]
    pub step_ms: Option<u64>,

    /// Make every n-th task fail (0 disables failures).
    #[arg(long, value_name = "N")]
    pub fail_every: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKGROUP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate and print the effective configuration without running.
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
