//! Logging setup: console plus an append-only log file

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::AutoAxeError;

/// Open `log_file` for appending, never rotating
pub fn file_appender(log_file: &str) -> Result<RollingFileAppender, AutoAxeError> {
    let path = Path::new(log_file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| AutoAxeError::Logging(format!("not a file path: {}", log_file)))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|e| AutoAxeError::Logging(e.to_string()))
}

/// Install the global subscriber. `RUST_LOG` overrides the level.
///
/// The returned guard must be held for the duration of the program to keep
/// file logging active.
pub fn init_logging(config: &Config) -> Result<WorkerGuard, AutoAxeError> {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(&config.log_file)?);

    let default_level = if config.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| AutoAxeError::Logging(e.to_string()))?;

    Ok(guard)
}
