//! Shared setup for long-running commands.

use std::path::{Path, PathBuf};

use fleetsync::config::ConfigFile;
use fleetsync::logging::{init_logging, LogGuard};
use tracing::info;

use crate::error::CliError;

/// Loads configuration and installs logging for a command.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _log_guard: LogGuard,
}

impl CliRunner {
    /// Load `config_path` (defaults if it does not exist) and start logging.
    pub fn new(config_path: &Path) -> Result<Self, CliError> {
        let config = crate::commands::common::load_config(config_path)?;
        let log_guard = init_logging(&config.logging_config())?;

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            _log_guard: log_guard,
        })
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = fleetsync::VERSION,
            command,
            config = %self.config_path.display(),
            accounts = self.config.accounts.len(),
            "fleetsync starting"
        );
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }
}
