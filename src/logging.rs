// src/logging.rs

//! Logging setup for `dagrt` using `tracing` + `tracing-subscriber`.
//!
//! Filter selection:
//! 1. `--log-level` applies one level to every target.
//! 2. `DAGRT_LOG` takes full filter directives, e.g.
//!    `warn,dagrt::dag::resolver=trace`.
//! 3. Otherwise `info`.
//!
//! Logs go to stderr so the run report on stdout stays clean.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "DAGRT_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Install the global subscriber. Fails if one is already installed or if
/// `DAGRT_LOG` holds invalid directives.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_from_log_level(lvl).as_str()),
        None => filter_from_env(std::env::var(LOG_ENV_VAR).ok().as_deref())?,
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logging subscriber: {e}"))?;

    Ok(())
}

/// Filter for the value of `DAGRT_LOG`, defaulting when unset or blank.
pub fn filter_from_env(value: Option<&str>) -> Result<EnvFilter> {
    let directives = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => DEFAULT_DIRECTIVES,
    };
    EnvFilter::try_new(directives)
        .with_context(|| format!("invalid {LOG_ENV_VAR} directives: {directives:?}"))
}

pub fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_or_missing_env_uses_default() {
        assert!(filter_from_env(None).is_ok());
        assert!(filter_from_env(Some("  ")).is_ok());
    }

    #[test]
    fn env_accepts_per_target_directives() {
        let filter = filter_from_env(Some("warn,dagrt::dag=trace")).expect("valid directives");
        assert!(filter.to_string().contains("dagrt::dag=trace"));
    }

    #[test]
    fn env_rejects_garbage() {
        assert!(filter_from_env(Some("dagrt=verbose")).is_err());
    }
}
