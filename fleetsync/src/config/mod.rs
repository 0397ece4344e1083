//! Configuration file handling.
//!
//! Settings live in an INI file, by default `<config dir>/fleetsync/config.ini`.
//! See [`ConfigFile`] for the layout.

mod error;
mod file;
mod keys;

use std::path::PathBuf;

pub use error::ConfigError;
pub use file::{AccountSettings, ConfigFile, GeneralSettings, LoggingSettings, PolicySettings};
pub use keys::ConfigKey;

/// Directory holding the configuration file.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetsync")
}

/// Default configuration file path.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default directory for log files.
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetsync")
        .join("logs")
}
