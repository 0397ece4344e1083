//! Refresh strategy.
//!
//! Decides, for one account, which refresh to run now and when to look again.
//! Both timers are checked on every tick; there are no independent per-timer
//! loops.
//!
//! # Decision table
//!
//! ```text
//! force due && !quiet  ──► ForceWithFallback
//! cached due           ──► CachedOnly
//! otherwise            ──► None
//! ```
//!
//! A forced refresh that fails falls back to a cached fetch in the same
//! tick; that fallback is carried out by the coordinator.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use super::quiet_hours::QuietHours;

/// Shortest delay the strategy will ever ask the loop to sleep.
pub const MIN_CHECK_DELAY: Duration = Duration::from_secs(10);

/// What to fetch on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// Nothing is due.
    None,
    /// Read the API's cached state.
    CachedOnly,
    /// Wake the vehicles; fall back to cached state if that fails.
    ForceWithFallback,
}

impl RefreshAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshAction::None => "none",
            RefreshAction::CachedOnly => "cached",
            RefreshAction::ForceWithFallback => "force",
        }
    }
}

impl fmt::Display for RefreshAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshDecision {
    pub action: RefreshAction,

    /// How long to sleep before the next tick, assuming `action` succeeds.
    pub next_check: Duration,

    /// A forced refresh was due but quiet hours held it back.
    pub force_blocked: bool,
}

/// Intervals, quiet window and last-refresh bookkeeping for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub cached_interval: Duration,
    pub force_interval: Duration,
    pub quiet_hours: Option<QuietHours>,

    /// Completion time of the last successful cached (or forced) refresh.
    pub last_cached_at: Option<DateTime<FixedOffset>>,

    /// Completion time of the last successful forced refresh.
    pub last_force_at: Option<DateTime<FixedOffset>>,
}

impl RefreshSchedule {
    pub fn new(cached_interval: Duration, force_interval: Duration) -> Self {
        Self {
            cached_interval,
            force_interval,
            quiet_hours: None,
            last_cached_at: None,
            last_force_at: None,
        }
    }

    pub fn with_quiet_hours(mut self, quiet_hours: Option<QuietHours>) -> Self {
        self.quiet_hours = quiet_hours;
        self
    }

    /// Polling granularity of the loop.
    pub fn effective_interval(&self) -> Duration {
        self.cached_interval.min(self.force_interval)
    }

    /// Quiet hours are checked against the local time of day.
    pub fn in_quiet_hours(&self, now: DateTime<FixedOffset>) -> bool {
        self.quiet_hours
            .map(|qh| qh.contains(now.time()))
            .unwrap_or(false)
    }

    /// Record a successful cached fetch that completed at `at`.
    pub fn record_cached(&mut self, at: DateTime<FixedOffset>) {
        self.last_cached_at = Some(at);
    }

    /// Record a successful forced refresh that completed at `at`.
    ///
    /// Forced data is at least as fresh as cached data, so both timers restart.
    pub fn record_forced(&mut self, at: DateTime<FixedOffset>) {
        self.last_force_at = Some(at);
        self.last_cached_at = Some(at);
    }
}

/// Time since `last`, or `None` if it never happened.
///
/// Measured between absolute instants, so a change of UTC offset in between
/// does not count. A timestamp in the future (clock stepped backwards)
/// counts as zero.
fn elapsed_since(
    now: DateTime<FixedOffset>,
    last: Option<DateTime<FixedOffset>>,
) -> Option<Duration> {
    last.map(|last| (now - last).to_std().unwrap_or(Duration::ZERO))
}

fn is_due(elapsed: Option<Duration>, interval: Duration) -> bool {
    elapsed.map(|e| e >= interval).unwrap_or(true)
}

fn remaining(elapsed: Option<Duration>, interval: Duration) -> Duration {
    elapsed
        .map(|e| interval.saturating_sub(e))
        .unwrap_or(Duration::ZERO)
}

/// Decide what to refresh at `now` and when to check again.
pub fn decide(now: DateTime<FixedOffset>, schedule: &RefreshSchedule) -> RefreshDecision {
    let cached_elapsed = elapsed_since(now, schedule.last_cached_at);
    let force_elapsed = elapsed_since(now, schedule.last_force_at);

    let due_cached = is_due(cached_elapsed, schedule.cached_interval);
    let force_timer_due = is_due(force_elapsed, schedule.force_interval);
    let quiet = schedule.in_quiet_hours(now);
    let due_force = force_timer_due && !quiet;
    let force_blocked = force_timer_due && quiet;

    let action = if due_force {
        RefreshAction::ForceWithFallback
    } else if due_cached {
        RefreshAction::CachedOnly
    } else {
        RefreshAction::None
    };

    let cached_wait = match action {
        RefreshAction::CachedOnly | RefreshAction::ForceWithFallback => schedule.cached_interval,
        RefreshAction::None => remaining(cached_elapsed, schedule.cached_interval),
    };

    let force_wait = if action == RefreshAction::ForceWithFallback {
        Some(schedule.force_interval)
    } else if force_blocked {
        // Re-evaluate as soon as quiet hours lift. An always-quiet window
        // never lifts, leaving the cached timer in charge.
        schedule
            .quiet_hours
            .and_then(|qh| qh.lifts_after(now.naive_local()))
            .map(|lift| (lift - now.naive_local()).to_std().unwrap_or(Duration::ZERO))
    } else {
        Some(remaining(force_elapsed, schedule.force_interval))
    };

    let next_check = match force_wait {
        Some(force_wait) => cached_wait.min(force_wait),
        None => cached_wait,
    }
    .max(MIN_CHECK_DELAY);

    RefreshDecision {
        action,
        next_check,
        force_blocked,
    }
}
