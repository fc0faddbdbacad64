//! Tracing setup for the desktop host
//!
//! Logs go to stderr and to a daily rolling `marginalia.log` inside the data
//! root's `logs/` directory, so they travel with the data when it is moved.

use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter, e.g. `marginalia_migration=debug`
pub const LOG_ENV: &str = "MARGINALIA_LOG";
pub const LOG_FILE: &str = "marginalia.log";
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logging should keep flushing.
///
/// If another subscriber is already installed it stays in place.
pub fn init_logging(logs_dir: &Path) -> io::Result<WorkerGuard> {
    fs::create_dir_all(logs_dir)?;

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();

    if let Err(e) = installed {
        debug!("Keeping existing tracing subscriber: {}", e);
    }

    Ok(guard)
}
