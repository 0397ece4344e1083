//! Scalar configuration keys addressable as `section.key`.
//!
//! Used by `fleetsync config get|set|list`. Account sections are edited by
//! hand and are not exposed here.

use std::path::PathBuf;
use std::str::FromStr;

use super::error::ConfigError;
use super::file::{
    format_quiet_hours, parse_bool, parse_interval_mins, parse_log_level, parse_max_polls,
    parse_positive_u64, parse_quiet_hours, parse_u64, ConfigFile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    GeneralSettleDelaySecs,
    GeneralActionPollIntervalSecs,
    GeneralActionMaxPolls,
    GeneralManualForceBypassesQuietHours,
    LoggingLevel,
    LoggingDirectory,
    DefaultsCachedIntervalMins,
    DefaultsForceIntervalMins,
    DefaultsQuietHours,
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::GeneralSettleDelaySecs,
            ConfigKey::GeneralActionPollIntervalSecs,
            ConfigKey::GeneralActionMaxPolls,
            ConfigKey::GeneralManualForceBypassesQuietHours,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
            ConfigKey::DefaultsCachedIntervalMins,
            ConfigKey::DefaultsForceIntervalMins,
            ConfigKey::DefaultsQuietHours,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::GeneralSettleDelaySecs
            | ConfigKey::GeneralActionPollIntervalSecs
            | ConfigKey::GeneralActionMaxPolls
            | ConfigKey::GeneralManualForceBypassesQuietHours => "general",
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
            ConfigKey::DefaultsCachedIntervalMins
            | ConfigKey::DefaultsForceIntervalMins
            | ConfigKey::DefaultsQuietHours => "defaults",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::GeneralSettleDelaySecs => "settle_delay_secs",
            ConfigKey::GeneralActionPollIntervalSecs => "action_poll_interval_secs",
            ConfigKey::GeneralActionMaxPolls => "action_max_polls",
            ConfigKey::GeneralManualForceBypassesQuietHours => "manual_force_bypasses_quiet_hours",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
            ConfigKey::DefaultsCachedIntervalMins => "cached_interval_mins",
            ConfigKey::DefaultsForceIntervalMins => "force_interval_mins",
            ConfigKey::DefaultsQuietHours => "quiet_hours",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::GeneralSettleDelaySecs => config.general.settle_delay_secs.to_string(),
            ConfigKey::GeneralActionPollIntervalSecs => {
                config.general.action_poll_interval_secs.to_string()
            }
            ConfigKey::GeneralActionMaxPolls => config.general.action_max_polls.to_string(),
            ConfigKey::GeneralManualForceBypassesQuietHours => {
                config.general.manual_force_bypasses_quiet_hours.to_string()
            }
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config.logging.directory.to_string_lossy().into_owned(),
            ConfigKey::DefaultsCachedIntervalMins => config.defaults.cached_interval_mins.to_string(),
            ConfigKey::DefaultsForceIntervalMins => config.defaults.force_interval_mins.to_string(),
            ConfigKey::DefaultsQuietHours => format_quiet_hours(config.defaults.quiet_hours),
        }
    }

    /// Validate `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let (section, key) = (self.section(), self.key_name());
        match self {
            ConfigKey::GeneralSettleDelaySecs => {
                config.general.settle_delay_secs = parse_u64(section, key, value)?;
            }
            ConfigKey::GeneralActionPollIntervalSecs => {
                config.general.action_poll_interval_secs = parse_positive_u64(section, key, value)?;
            }
            ConfigKey::GeneralActionMaxPolls => {
                config.general.action_max_polls = parse_max_polls(section, key, value)?;
            }
            ConfigKey::GeneralManualForceBypassesQuietHours => {
                config.general.manual_force_bypasses_quiet_hours = parse_bool(section, key, value)?;
            }
            ConfigKey::LoggingLevel => {
                config.logging.level = parse_log_level(section, key, value)?;
            }
            ConfigKey::LoggingDirectory => {
                if value.trim().is_empty() {
                    return Err(ConfigError::invalid(section, key, value, "path is empty"));
                }
                config.logging.directory = PathBuf::from(value.trim());
            }
            ConfigKey::DefaultsCachedIntervalMins => {
                config.defaults.cached_interval_mins = parse_interval_mins(section, key, value)?;
            }
            ConfigKey::DefaultsForceIntervalMins => {
                config.defaults.force_interval_mins = parse_interval_mins(section, key, value)?;
            }
            ConfigKey::DefaultsQuietHours => {
                config.defaults.quiet_hours = parse_quiet_hours(section, key, value)?;
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::QuietHours;

    #[test]
    fn test_every_key_parses_from_its_name() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!("general.nope".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_set_then_get() {
        let mut config = ConfigFile::default();
        ConfigKey::DefaultsQuietHours
            .set(&mut config, "21:30-06:15")
            .unwrap();
        assert_eq!(ConfigKey::DefaultsQuietHours.get(&config), "21:30-06:15");
        assert_eq!(
            config.defaults.quiet_hours,
            Some("21:30-06:15".parse::<QuietHours>().unwrap())
        );

        ConfigKey::DefaultsQuietHours.set(&mut config, "off").unwrap();
        assert_eq!(config.defaults.quiet_hours, None);
        assert_eq!(ConfigKey::DefaultsQuietHours.get(&config), "off");
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let mut config = ConfigFile::default();
        let before = config.clone();
        assert!(ConfigKey::DefaultsForceIntervalMins
            .set(&mut config, "soon")
            .is_err());
        assert!(ConfigKey::GeneralManualForceBypassesQuietHours
            .set(&mut config, "maybe")
            .is_err());
        assert!(ConfigKey::DefaultsCachedIntervalMins
            .set(&mut config, "307445734561825861")
            .is_err());
        assert_eq!(config, before);
    }
}
