//! Quiet-hours policy.
//!
//! During quiet hours forced refreshes (which wake the vehicle and drain its
//! 12V battery) are suppressed. Cached refreshes are unaffected.
//!
//! # Window semantics
//!
//! ```text
//! start < end   quiet iff start <= now < end           (same day)
//! start > end   quiet iff now >= start || now < end    (wraps midnight)
//! start == end  always quiet
//! ```
//!
//! `start == end` is deliberately "always quiet" rather than "never quiet".
//! Disabling quiet hours is done by not configuring a window at all.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};

/// Whether `now` falls inside the quiet window `[start, end)`.
pub fn in_quiet_hours(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= now && now < end
    } else {
        // Covers the wrapping window and the degenerate start == end case,
        // where the condition holds for every `now`.
        now >= start || now < end
    }
}

/// A configured quiet window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build from whole hours, e.g. `QuietHours::from_hours(22, 6)`.
    ///
    /// Returns `None` for hours outside `0..24`.
    pub fn from_hours(start: u32, end: u32) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start, 0, 0)?,
            end: NaiveTime::from_hms_opt(end, 0, 0)?,
        })
    }

    /// Whether the window covers the whole day.
    pub fn is_always(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        in_quiet_hours(now, self.start, self.end)
    }

    /// The next moment after `now` at which quiet hours lift.
    ///
    /// Returns `None` when the window never lifts (`start == end`).
    pub fn lifts_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.is_always() {
            return None;
        }
        let today = now.date().and_time(self.end);
        if today > now {
            Some(today)
        } else {
            Some(today + chrono::Duration::days(1))
        }
    }
}

impl fmt::Display for QuietHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

impl FromStr for QuietHours {
    type Err = String;

    /// Parse `HH:MM-HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected HH:MM-HH:MM, got '{}'", s))?;
        let parse = |part: &str| {
            NaiveTime::parse_from_str(part.trim(), "%H:%M")
                .map_err(|e| format!("invalid time '{}': {}", part.trim(), e))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}
