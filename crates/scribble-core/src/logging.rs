//! Tracing setup.
//!
//! Logs go to a daily file under `$SCRIBBLE_HOME/logs` so they never mix with
//! chat output on the terminal. The filter is read from `SCRIBBLE_LOG`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::paths;

/// Environment variable holding the log filter directive.
pub const LOG_ENV_VAR: &str = "SCRIBBLE_LOG";

const DEFAULT_FILTER: &str = "scribble=info,scribble_core=info";
const LOG_FILE_PREFIX: &str = "scribble.log";

/// Installs the global subscriber writing to the default logs directory.
///
/// Keep the returned guard alive for the lifetime of the program; dropping it
/// flushes pending lines.
///
/// # Errors
/// Returns an error if the directory cannot be created or a subscriber is
/// already installed.
pub fn init() -> Result<WorkerGuard> {
    init_in(&paths::logs_dir())
}

/// Installs the global subscriber writing into `dir`.
///
/// # Errors
/// Returns an error if the directory cannot be created or a subscriber is
/// already installed.
pub fn init_in(dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
