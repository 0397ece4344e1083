//! Tracing subscriber setup.
//!
//! Installs a registry with:
//! - an `EnvFilter` (`RUST_LOG` wins over the configured level)
//! - a stderr layer with local RFC 3339 timestamps
//! - a daily-rolling file layer behind a non-blocking writer
//!
//! Keep the returned [`LogGuard`] alive for the life of the process; dropping
//! it flushes buffered file output.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log file name prefix; the appender adds the date.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "fleetsync.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("invalid log filter '{0}'")]
    Filter(String),

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `fleetsync=debug`.
    pub level: String,

    /// Directory for rolling log files. `None` disables file output.
    pub directory: Option<PathBuf>,

    pub file_prefix: String,

    /// Whether to also log to stderr.
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            stderr: true,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn with_directory(mut self, directory: PathBuf) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    /// Filter from `RUST_LOG`, falling back to the configured level.
    pub fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|_| LoggingError::Filter(self.level.clone())),
        }
    }
}

/// Flushes file logging on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
    pub log_directory: Option<PathBuf>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let filter = config.filter()?;

    let (file_layer, file_guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(LocalTime::new(Rfc3339))
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = config.stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_timer(LocalTime::new(Rfc3339))
            .with_writer(io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LogGuard {
        _file: file_guard,
        log_directory: config.directory.clone(),
    })
}
