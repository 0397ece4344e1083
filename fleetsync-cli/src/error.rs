//! CLI error type.

use std::fmt;
use std::io;
use std::path::PathBuf;

use fleetsync::config::ConfigError;
use fleetsync::logging::LoggingError;
use fleetsync::{CoordinatorError, RegistryError};

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or incomplete configuration, with a user-facing hint.
    Config(String),
    ConfigFile(ConfigError),
    Logging(LoggingError),
    Fixture { path: PathBuf, source: io::Error },
    Runtime(io::Error),
    Registry(RegistryError),
    Coordinator(CoordinatorError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Fixture { path, source } => {
                write!(f, "Failed to load fleet fixture {}: {}", path.display(), source)
            }
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Registry(e) => write!(f, "{}", e),
            CliError::Coordinator(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Fixture { source, .. } => Some(source),
            CliError::Runtime(e) => Some(e),
            CliError::Registry(e) => Some(e),
            CliError::Coordinator(e) => Some(e),
            CliError::Config(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        CliError::Registry(e)
    }
}

impl From<CoordinatorError> for CliError {
    fn from(e: CoordinatorError) -> Self {
        CliError::Coordinator(e)
    }
}
