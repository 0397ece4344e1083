//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path` for
//! the scalar settings. Account sections are edited in the file directly.

use std::path::Path;

use clap::Subcommand;
use fleetsync::config::ConfigKey;

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., defaults.quiet_hours)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., defaults.quiet_hours)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key, config_path),
        ConfigCommands::Set { key, value } => run_set(&key, &value, config_path),
        ConfigCommands::List => run_list(config_path),
        ConfigCommands::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'fleetsync config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str, config_path: &Path) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = load_config(config_path)?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }

    Ok(())
}

fn run_set(key: &str, value: &str, config_path: &Path) -> Result<(), CliError> {
    let config_key = parse_key(key)?;

    let mut config = load_config(config_path)?;
    config_key
        .set(&mut config, value)
        .map_err(|e| CliError::Config(e.to_string()))?;
    config.save_to(config_path)?;

    println!("Set {} = {}", config_key.name(), config_key.get(&config));

    Ok(())
}

fn run_list(config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = "";

    for key in ConfigKey::all() {
        let section = key.section();

        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("  {} = (not set)", key.key_name());
        } else {
            println!("  {} = {}", key.key_name(), value);
        }
    }

    if !config.accounts.is_empty() {
        println!();
        println!(
            "{} account section(s); see 'fleetsync accounts'",
            config.accounts.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync::config::ConfigFile;
    use tempfile::TempDir;

    #[test]
    fn test_set_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");

        run_set("defaults.force_interval_mins", "480", &path).unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.defaults.force_interval_mins, 480);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        assert!(matches!(
            run_get("defaults.nope", &path),
            Err(CliError::Config(_))
        ));
        assert!(!path.exists());
    }
}
