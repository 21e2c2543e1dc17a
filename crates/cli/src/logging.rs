//! Tracing subscriber setup for the `ldapsync` binary.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "ldapsync.log";

/// Pick the log filter: the `--log-level` flag, then `RUST_LOG`, then the
/// fallback level (normally `logging.level` from the config file).
pub fn build_filter(flag: Option<&str>, fallback: &str) -> Result<EnvFilter> {
    if let Some(level) = flag {
        return EnvFilter::try_new(level).with_context(|| format!("invalid --log-level '{level}'"));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(fallback).with_context(|| format!("invalid log level '{fallback}'"))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for `--json`; when `directory` is set they are also written to a daily
/// rolling file there.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the program exits.
pub fn init(filter: EnvFilter, directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_fallback() {
        let filter = build_filter(Some("debug"), "info").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_flag_accepts_directives() {
        let filter = build_filter(Some("warn,ldapsync_core=trace"), "info").unwrap();
        assert!(filter.to_string().contains("ldapsync_core=trace"));
    }
}
