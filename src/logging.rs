//! Tracing subscriber setup.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to open log file {}: {source}", .path.display())]
    LogFile { path: PathBuf, source: io::Error },
    #[error("Invalid log filter: {0}")]
    Filter(String),
    #[error("A global logger is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Filter used when `RUST_LOG` is not set.
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,autosort=info",
        1 => "info,autosort=debug",
        2 => "debug,autosort=trace",
        _ => "trace",
    }
}

/// Installs the global subscriber: stderr always, plus `log_file` if given.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the life of the program.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(verbosity))
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(|source| LoggingError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(ChronoLocal::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}
