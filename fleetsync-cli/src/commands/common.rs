//! Common helpers shared across CLI commands.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use fleetsync::config::{AccountSettings, ConfigFile};
use fleetsync::RefreshPolicy;

use crate::error::CliError;

/// Load the config at `path`, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    if path.exists() {
        Ok(ConfigFile::load_from(path)?)
    } else {
        Ok(ConfigFile::default())
    }
}

/// Look up an `[account.<name>]` section.
pub fn resolve_account<'a>(
    config: &'a ConfigFile,
    name: &str,
) -> Result<&'a AccountSettings, CliError> {
    config.account(name).ok_or_else(|| {
        CliError::Config(format!(
            "No account named '{}'. Use 'fleetsync accounts' to list configured accounts.",
            name
        ))
    })
}

/// Policy for an account if one is named, otherwise the `[defaults]` policy.
pub fn resolve_policy(config: &ConfigFile, account: Option<&str>) -> Result<RefreshPolicy, CliError> {
    match account {
        Some(name) => Ok(config.policy_for(resolve_account(config, name)?)),
        None => Ok(config.default_policy()),
    }
}

/// Parse a local date-time given as `YYYY-MM-DD HH:MM[:SS]`, the same with a
/// `T` separator, or a bare `HH:MM` meaning today.
pub fn parse_datetime(s: &str) -> Result<DateTime<FixedOffset>, CliError> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return localize(s, dt);
        }
    }
    if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") {
        return localize(s, today().and_time(time));
    }
    Err(CliError::Config(format!(
        "Invalid time '{}'. Use 'YYYY-MM-DD HH:MM' or 'HH:MM'.",
        s
    )))
}

/// Attach the local UTC offset. An ambiguous fall-back time takes the
/// earlier offset; a time skipped by a spring-forward change is rejected.
fn localize(input: &str, naive: NaiveDateTime) -> Result<DateTime<FixedOffset>, CliError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| {
            CliError::Config(format!("Time '{}' does not exist in the local time zone.", input))
        })
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Render a duration as `2h 05m`, `12m 30s` or `45s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, mins, secs) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, mins)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(23, 15, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-05-01 23:15").unwrap().naive_local(), expected);
        assert_eq!(parse_datetime("2024-05-01T23:15:00").unwrap().naive_local(), expected);
        assert_eq!(parse_datetime("23:15").unwrap().time(), expected.time());
        assert!(parse_datetime("tomorrow").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(750)), "12m 30s");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 5 * 60)), "2h 05m");
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_resolve_policy_defaults_and_unknown_account() {
        let config = ConfigFile::default();
        let policy = resolve_policy(&config, None).unwrap();
        assert_eq!(policy.cached_interval, Duration::from_secs(30 * 60));
        assert!(matches!(
            resolve_policy(&config, Some("nobody")),
            Err(CliError::Config(_))
        ));
    }
}
