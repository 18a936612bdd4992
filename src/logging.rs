// src/logging.rs

//! Diagnostics for the `taskgroup` binary.
//!
//! Scheduling decisions are traced by the library under the `taskgroup`
//! target: session start/stop and cancellation at `info`, dispatch and
//! signal handling at `debug`, rolled-back dispatches at `warn`. The binary
//! prints the event stream on stdout, so diagnostics go to stderr.
//!
//! The filter comes from `--log-level` when given, otherwise from
//! `TASKGROUP_LOG`, which takes full filter directives
//! (`taskgroup::group=debug,info`), otherwise `info`.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TASKGROUP_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(cli_level, env_value.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install logging subscriber: {err}"))
}

fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_directive(level));
    }

    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => EnvFilter::try_new(value).unwrap_or_else(|err| {
            // No subscriber exists yet to report this through.
            eprintln!("taskgroup: ignoring invalid {LOG_ENV_VAR}={value:?}: {err}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
