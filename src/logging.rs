//! Tracing setup: human-readable stderr plus a daily-rolling log file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Overrides the log directory.
pub const LOG_DIR_ENV: &str = "GIVEAWAY_LOG_DIR";

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "giveaway-agent.log";

/// Directory the rolling log file is written to.
pub fn log_dir() -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole run. `None` when the file could not be opened (stderr only).
pub fn init(default_directive: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let dir = log_dir();
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(&dir);

    let (file_layer, guard, file_error) = match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if installed.is_ok()
        && let Some(e) = file_error
    {
        tracing::warn!(dir = %dir.display(), error = %e, "Log file unavailable, logging to stderr only");
    }
    guard
}
