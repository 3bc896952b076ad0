//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber from [`LoggingConfig`]
//! - Write to the console or to `<data dir>/logs/<file name>`
//! - Flush the log file on engine shutdown
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON lines when `structured` is set, human-readable otherwise
//! - File output goes through a non-blocking `tracing-appender` writer;
//!   `rotate` rolls the file daily
//! - `try_init`: a second engine in the same process keeps the first
//!   subscriber

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::schema::{LoggerFileConfig, DEFAULT_LOG_FILE_NAME};
use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unable to open log file in {}: {source}", dir.display())]
    Open {
        dir: PathBuf,
        #[source]
        source: InitError,
    },
}

/// Keeps the log writer alive for the life of the engine.
#[derive(Debug, Default)]
pub struct LoggerHandle {
    path: Option<PathBuf>,
    guard: Mutex<Option<WorkerGuard>>,
}

impl LoggerHandle {
    /// File currently written to, if logging to a file.
    pub fn log_file(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flushes buffered lines and closes the log file, if any.
    pub fn teardown(&self) {
        drop(self.guard.lock().take());
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn file_name(settings: &LoggerFileConfig) -> &str {
    if settings.file_name.is_empty() {
        DEFAULT_LOG_FILE_NAME
    } else {
        settings.file_name.as_str()
    }
}

fn rotation(settings: &LoggerFileConfig) -> Rotation {
    if settings.rotate == Some(true) {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    }
}

/// Path the appender writes to today.
fn current_log_path(log_dir: &Path, settings: &LoggerFileConfig) -> PathBuf {
    let name = file_name(settings);
    if settings.rotate == Some(true) {
        let day = chrono::Utc::now().format("%Y-%m-%d");
        log_dir.join(format!("{name}.{day}"))
    } else {
        log_dir.join(name)
    }
}

fn open_log_file(
    log_dir: &Path,
    settings: &LoggerFileConfig,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation(settings))
        .filename_prefix(file_name(settings))
        .build(log_dir)
        .map_err(|source| LoggingError::Open {
            dir: log_dir.to_path_buf(),
            source,
        })?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> Result<LoggerHandle, LoggingError> {
    if config.enabled == Some(false) {
        return Ok(LoggerHandle::default());
    }

    let level = if config.level.is_empty() {
        "info"
    } else {
        config.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut handle = LoggerHandle::default();
    let layer: BoxedLayer = if config.writes_to_file() {
        let settings = config.file.clone().unwrap_or_default();
        let (writer, guard) = open_log_file(log_dir, &settings)?;
        handle.path = Some(current_log_path(log_dir, &settings));
        *handle.guard.get_mut() = Some(guard);
        if config.structured {
            fmt::layer().json().with_ansi(false).with_writer(writer).boxed()
        } else {
            fmt::layer().with_ansi(false).with_writer(writer).boxed()
        }
    } else if config.structured {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    if tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already installed, keeping it");
    }

    Ok(handle)
}
