//! INI configuration file.
//!
//! ```ini
//! [general]
//! settle_delay_secs = 5
//! action_poll_interval_secs = 5
//! action_max_polls = 12
//! manual_force_bypasses_quiet_hours = false
//!
//! [logging]
//! level = info
//! directory = /home/me/.local/share/fleetsync/logs
//!
//! [defaults]
//! cached_interval_mins = 30
//! force_interval_mins = 240
//! quiet_hours = 22:00-06:00
//!
//! [account.family]
//! brand = kia
//! region = europe
//! username = me@example.com
//! password = hunter2
//! pin = 1234
//! force_interval_mins = 480
//! ```
//!
//! `quiet_hours = off` disables the quiet window. Per-account interval and
//! quiet-hours keys override `[defaults]`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, Properties};
use tracing::warn;

use super::error::ConfigError;
use super::{config_file_path, default_log_directory};
use crate::coordinator::{
    CoordinatorConfig, RefreshPolicy, DEFAULT_ACTION_MAX_POLLS, DEFAULT_ACTION_POLL_INTERVAL,
    DEFAULT_CACHED_INTERVAL, DEFAULT_FORCE_INTERVAL, DEFAULT_QUIET_END_HOUR,
    DEFAULT_QUIET_START_HOUR, DEFAULT_SETTLE_DELAY,
};
use crate::logging::LoggingConfig;
use crate::model::{Account, AccountId, Brand, Credentials, Region};
use crate::schedule::QuietHours;

pub(crate) const ACCOUNT_SECTION_PREFIX: &str = "account.";
pub(crate) const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Longest accepted refresh interval: one year.
pub const MAX_INTERVAL_MINS: u64 = 366 * 24 * 60;


// =============================================================================
// Sections
// =============================================================================

/// `[general]`: action confirmation and manual refresh behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSettings {
    pub settle_delay_secs: u64,
    pub action_poll_interval_secs: u64,
    pub action_max_polls: u32,
    pub manual_force_bypasses_quiet_hours: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            settle_delay_secs: DEFAULT_SETTLE_DELAY.as_secs(),
            action_poll_interval_secs: DEFAULT_ACTION_POLL_INTERVAL.as_secs(),
            action_max_polls: DEFAULT_ACTION_MAX_POLLS,
            manual_force_bypasses_quiet_hours: false,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub directory: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: default_log_directory(),
        }
    }
}

/// `[defaults]`: refresh policy applied to every account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySettings {
    pub cached_interval_mins: u64,
    pub force_interval_mins: u64,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            cached_interval_mins: DEFAULT_CACHED_INTERVAL.as_secs() / 60,
            force_interval_mins: DEFAULT_FORCE_INTERVAL.as_secs() / 60,
            quiet_hours: QuietHours::from_hours(DEFAULT_QUIET_START_HOUR, DEFAULT_QUIET_END_HOUR),
        }
    }
}

/// `[account.<name>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSettings {
    pub name: String,
    pub brand: Brand,
    pub region: Region,
    pub username: String,
    pub password: String,
    pub pin: Option<String>,

    /// Id persisted by older versions. Only used to report mismatches.
    pub legacy_id: Option<String>,

    pub cached_interval_mins: Option<u64>,
    pub force_interval_mins: Option<u64>,

    /// `Some(None)` turns quiet hours off for this account only.
    pub quiet_hours: Option<Option<QuietHours>>,
}

impl AccountSettings {
    pub fn new(
        name: impl Into<String>,
        brand: Brand,
        region: Region,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            brand,
            region,
            username: username.into(),
            password: password.into(),
            pin: None,
            legacy_id: None,
            cached_interval_mins: None,
            force_interval_mins: None,
            quiet_hours: None,
        }
    }

    pub fn account(&self) -> Account {
        let mut credentials = Credentials::new(self.username.clone(), self.password.clone());
        if let Some(pin) = &self.pin {
            credentials = credentials.with_pin(pin.clone());
        }
        Account::new(self.brand, self.region, credentials)
    }

    /// Derived account id, reconciled against a legacy stored id.
    pub fn account_id(&self) -> AccountId {
        self.account().migrate_stored_id(self.legacy_id.as_deref())
    }

    fn section(&self) -> String {
        format!("{}{}", ACCOUNT_SECTION_PREFIX, self.name)
    }
}

// =============================================================================
// Config file
// =============================================================================

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub general: GeneralSettings,
    pub logging: LoggingSettings,
    pub defaults: PolicySettings,
    pub accounts: Vec<AccountSettings>,
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_at(&contents, path)
    }

    /// Parse INI text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_at(contents, Path::new("<string>"))
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn account(&self, name: &str) -> Option<&AccountSettings> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Refresh policy from `[defaults]` alone.
    pub fn default_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(
            minutes(self.defaults.cached_interval_mins),
            minutes(self.defaults.force_interval_mins),
        )
        .with_quiet_hours(self.defaults.quiet_hours)
    }

    /// Refresh policy for an account: `[defaults]` plus its overrides.
    pub fn policy_for(&self, account: &AccountSettings) -> RefreshPolicy {
        let cached = account
            .cached_interval_mins
            .unwrap_or(self.defaults.cached_interval_mins);
        let force = account
            .force_interval_mins
            .unwrap_or(self.defaults.force_interval_mins);
        let quiet_hours = account.quiet_hours.unwrap_or(self.defaults.quiet_hours);

        RefreshPolicy::new(minutes(cached), minutes(force)).with_quiet_hours(quiet_hours)
    }

    pub fn coordinator_config(&self, account: &AccountSettings) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_policy(self.policy_for(account))
            .with_settle_delay(Duration::from_secs(self.general.settle_delay_secs))
            .with_action_polling(
                Duration::from_secs(self.general.action_poll_interval_secs),
                self.general.action_max_polls,
            )
            .with_manual_force_bypass(self.general.manual_force_bypasses_quiet_hours)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::new(&self.logging.level).with_directory(self.logging.directory.clone())
    }

    fn parse_at(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut config = Self::default();

        if let Some(props) = ini.section(Some("general")) {
            let general = &mut config.general;
            if let Some(v) = props.get("settle_delay_secs") {
                general.settle_delay_secs = parse_u64("general", "settle_delay_secs", v)?;
            }
            if let Some(v) = props.get("action_poll_interval_secs") {
                general.action_poll_interval_secs =
                    parse_positive_u64("general", "action_poll_interval_secs", v)?;
            }
            if let Some(v) = props.get("action_max_polls") {
                general.action_max_polls = parse_max_polls("general", "action_max_polls", v)?;
            }
            if let Some(v) = props.get("manual_force_bypasses_quiet_hours") {
                general.manual_force_bypasses_quiet_hours =
                    parse_bool("general", "manual_force_bypasses_quiet_hours", v)?;
            }
        }

        if let Some(props) = ini.section(Some("logging")) {
            if let Some(v) = props.get("level") {
                config.logging.level = parse_log_level("logging", "level", v)?;
            }
            if let Some(v) = props.get("directory") {
                if !v.trim().is_empty() {
                    config.logging.directory = PathBuf::from(v.trim());
                }
            }
        }

        if let Some(props) = ini.section(Some("defaults")) {
            let defaults = &mut config.defaults;
            if let Some(v) = props.get("cached_interval_mins") {
                defaults.cached_interval_mins =
                    parse_interval_mins("defaults", "cached_interval_mins", v)?;
            }
            if let Some(v) = props.get("force_interval_mins") {
                defaults.force_interval_mins =
                    parse_interval_mins("defaults", "force_interval_mins", v)?;
            }
            if let Some(v) = props.get("quiet_hours") {
                defaults.quiet_hours = parse_quiet_hours("defaults", "quiet_hours", v)?;
            }
        }

        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            if let Some(name) = section.strip_prefix(ACCOUNT_SECTION_PREFIX) {
                config.accounts.push(parse_account(section, name, props)?);
            } else if !matches!(section, "general" | "logging" | "defaults") {
                warn!(section, "Ignoring unknown configuration section");
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("general"))
            .set("settle_delay_secs", self.general.settle_delay_secs.to_string())
            .set(
                "action_poll_interval_secs",
                self.general.action_poll_interval_secs.to_string(),
            )
            .set("action_max_polls", self.general.action_max_polls.to_string())
            .set(
                "manual_force_bypasses_quiet_hours",
                self.general.manual_force_bypasses_quiet_hours.to_string(),
            );

        ini.with_section(Some("logging"))
            .set("level", self.logging.level.clone())
            .set("directory", self.logging.directory.to_string_lossy());

        ini.with_section(Some("defaults"))
            .set(
                "cached_interval_mins",
                self.defaults.cached_interval_mins.to_string(),
            )
            .set(
                "force_interval_mins",
                self.defaults.force_interval_mins.to_string(),
            )
            .set("quiet_hours", format_quiet_hours(self.defaults.quiet_hours));

        for account in &self.accounts {
            let section = account.section();
            let mut setter = ini.with_section(Some(section.as_str()));
            setter
                .set("brand", account.brand.as_str())
                .set("region", account.region.as_str())
                .set("username", account.username.clone())
                .set("password", account.password.clone());
            if let Some(pin) = &account.pin {
                setter.set("pin", pin.clone());
            }
            if let Some(mins) = account.cached_interval_mins {
                setter.set("cached_interval_mins", mins.to_string());
            }
            if let Some(mins) = account.force_interval_mins {
                setter.set("force_interval_mins", mins.to_string());
            }
            if let Some(quiet_hours) = account.quiet_hours {
                setter.set("quiet_hours", format_quiet_hours(quiet_hours));
            }
        }

        ini
    }
}

fn parse_account(section: &str, name: &str, props: &Properties) -> Result<AccountSettings, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid(section, "", section, "account name is empty"));
    }
    let required = |key: &str| {
        props
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::missing(section, key))
    };

    let brand_raw = required("brand")?;
    let brand: Brand = brand_raw
        .parse()
        .map_err(|e: String| ConfigError::invalid(section, "brand", brand_raw, e))?;
    let region_raw = required("region")?;
    let region: Region = region_raw
        .parse()
        .map_err(|e: String| ConfigError::invalid(section, "region", region_raw, e))?;

    let mut account = AccountSettings::new(
        name,
        brand,
        region,
        required("username")?,
        required("password")?,
    );
    account.pin = props
        .get("pin")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    account.legacy_id = props
        .get("id")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(v) = props.get("cached_interval_mins") {
        account.cached_interval_mins = Some(parse_interval_mins(section, "cached_interval_mins", v)?);
    }
    if let Some(v) = props.get("force_interval_mins") {
        account.force_interval_mins = Some(parse_interval_mins(section, "force_interval_mins", v)?);
    }
    if let Some(v) = props.get("quiet_hours") {
        account.quiet_hours = Some(parse_quiet_hours(section, "quiet_hours", v)?);
    }

    Ok(account)
}

// =============================================================================
// Value parsing
// =============================================================================

/// Interval keys are bounded at parse time; values set directly on the
/// structs are clamped to the same bound.
fn minutes(mins: u64) -> Duration {
    Duration::from_secs(mins.min(MAX_INTERVAL_MINS).saturating_mul(60))
}

pub(crate) fn parse_u64(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(section, key, value, "expected a whole number"))
}

pub(crate) fn parse_positive_u64(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    match parse_u64(section, key, value)? {
        0 => Err(ConfigError::invalid(section, key, value, "must be greater than zero")),
        n => Ok(n),
    }
}

/// A refresh interval in minutes, between 1 and [`MAX_INTERVAL_MINS`].
pub(crate) fn parse_interval_mins(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    match parse_positive_u64(section, key, value)? {
        n if n > MAX_INTERVAL_MINS => Err(ConfigError::invalid(
            section,
            key,
            value,
            format!("must be at most {} minutes (one year)", MAX_INTERVAL_MINS),
        )),
        n => Ok(n),
    }
}

pub(crate) fn parse_max_polls(section: &str, key: &str, value: &str) -> Result<u32, ConfigError> {
    let n = parse_positive_u64(section, key, value)?;
    u32::try_from(n).map_err(|_| ConfigError::invalid(section, key, value, "value too large"))
}

pub(crate) fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(section, key, value, "expected true or false")),
    }
}

pub(crate) fn parse_log_level(section: &str, key: &str, value: &str) -> Result<String, ConfigError> {
    let level = value.trim().to_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(ConfigError::invalid(
            section,
            key,
            value,
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ))
    }
}

/// Parse `HH:MM-HH:MM`, or `off` to disable quiet hours.
pub(crate) fn parse_quiet_hours(
    section: &str,
    key: &str,
    value: &str,
) -> Result<Option<QuietHours>, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "off" | "none" | "disabled" => Ok(None),
        trimmed => trimmed
            .parse::<QuietHours>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(section, key, value, e)),
    }
}

pub(crate) fn format_quiet_hours(quiet_hours: Option<QuietHours>) -> String {
    quiet_hours
        .map(|qh| qh.to_string())
        .unwrap_or_else(|| "off".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[general]
settle_delay_secs = 8
manual_force_bypasses_quiet_hours = yes

[defaults]
cached_interval_mins = 15
quiet_hours = 23:00-07:00

[account.family]
brand = kia
region = europe
username = Me@Example.com
password = hunter2
pin = 1234
force_interval_mins = 480
quiet_hours = off

[account.work]
brand = hyundai
region = us
username = work@example.com
password = secret
"#;

    #[test]
    fn test_parse_sample() {
        let config = ConfigFile::parse(SAMPLE).unwrap();
        assert_eq!(config.general.settle_delay_secs, 8);
        assert!(config.general.manual_force_bypasses_quiet_hours);
        assert_eq!(config.general.action_max_polls, DEFAULT_ACTION_MAX_POLLS);
        assert_eq!(config.defaults.cached_interval_mins, 15);
        assert_eq!(config.accounts.len(), 2);

        let family = config.account("family").unwrap();
        assert_eq!(family.brand, Brand::Kia);
        assert_eq!(family.pin.as_deref(), Some("1234"));
        assert_eq!(family.quiet_hours, Some(None));
    }

    #[test]
    fn test_policy_overrides() {
        let config = ConfigFile::parse(SAMPLE).unwrap();

        let family = config.policy_for(config.account("family").unwrap());
        assert_eq!(family.cached_interval, Duration::from_secs(15 * 60));
        assert_eq!(family.force_interval, Duration::from_secs(480 * 60));
        assert_eq!(family.quiet_hours, None);

        let work = config.policy_for(config.account("work").unwrap());
        assert_eq!(work.force_interval, DEFAULT_FORCE_INTERVAL);
        assert_eq!(work.quiet_hours, Some("23:00-07:00".parse().unwrap()));
    }

    #[test]
    fn test_coordinator_config_from_general() {
        let config = ConfigFile::parse(SAMPLE).unwrap();
        let coordinator = config.coordinator_config(config.account("work").unwrap());
        assert_eq!(coordinator.settle_delay, Duration::from_secs(8));
        assert!(coordinator.manual_force_bypasses_quiet_hours);
    }

    #[test]
    fn test_missing_password_is_reported() {
        let err = ConfigFile::parse("[account.x]\nbrand = kia\nregion = eu\nusername = a\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue { ref key, .. } if key == "password"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ConfigFile::parse("[defaults]\ncached_interval_mins = 0\n").is_err());
        assert!(ConfigFile::parse("[defaults]\nquiet_hours = late\n").is_err());
        assert!(ConfigFile::parse("[logging]\nlevel = loud\n").is_err());
        assert!(ConfigFile::parse("[account.x]\nbrand = tesla\nregion = eu\nusername = a\npassword = b\n").is_err());
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let err = ConfigFile::parse("[defaults]\ncached_interval_mins = 307445734561825861\n")
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "cached_interval_mins")
        );

        let account = "[account.x]\nbrand = kia\nregion = eu\nusername = a\npassword = b\n";
        assert!(ConfigFile::parse(&format!("{}force_interval_mins = 18446744073709551615\n", account)).is_err());

        let at_bound = ConfigFile::parse(&format!(
            "[defaults]\nforce_interval_mins = {}\n",
            MAX_INTERVAL_MINS
        ))
        .unwrap();
        assert_eq!(
            at_bound.default_policy().force_interval,
            Duration::from_secs(MAX_INTERVAL_MINS * 60)
        );
    }

    #[test]
    fn test_policy_clamps_interval_set_in_code() {
        let mut config = ConfigFile::default();
        config.defaults.cached_interval_mins = u64::MAX;
        let policy = config.default_policy();
        assert_eq!(policy.cached_interval, Duration::from_secs(MAX_INTERVAL_MINS * 60));
    }

    #[test]
    fn test_legacy_id_does_not_change_derived_id() {
        let config = ConfigFile::parse(
            "[account.old]\nbrand = kia\nregion = europe\nusername = me@example.com\npassword = x\nid = 1234-legacy\n",
        )
        .unwrap();
        let account = config.account("old").unwrap();
        assert_eq!(account.legacy_id.as_deref(), Some("1234-legacy"));
        assert_eq!(account.account_id(), account.account().id());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::parse(SAMPLE).unwrap();
        config.logging.directory = dir.path().join("logs");
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
