//! Coordinator configuration.

use std::time::Duration;

use crate::schedule::{QuietHours, RefreshSchedule};

// =============================================================================
// Defaults
// =============================================================================

/// Default interval between cached refreshes.
pub const DEFAULT_CACHED_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default interval between forced refreshes.
pub const DEFAULT_FORCE_INTERVAL: Duration = Duration::from_secs(240 * 60);

/// Default quiet window start hour (local time).
pub const DEFAULT_QUIET_START_HOUR: u32 = 22;

/// Default quiet window end hour (local time).
pub const DEFAULT_QUIET_END_HOUR: u32 = 6;

/// Default wait between submitting an action and the first status poll.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Default wait between action status polls.
pub const DEFAULT_ACTION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of status polls before an action counts as timed out.
pub const DEFAULT_ACTION_MAX_POLLS: u32 = 12;

// =============================================================================
// Refresh policy
// =============================================================================

/// Per-account refresh intervals and quiet window.
///
/// Can be swapped at runtime with `Coordinator::update_policy`; the change is
/// picked up on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Interval between reads of the API's cached state.
    pub cached_interval: Duration,

    /// Interval between forced vehicle polls.
    pub force_interval: Duration,

    /// Window during which forced polls are suppressed. `None` disables it.
    pub quiet_hours: Option<QuietHours>,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            cached_interval: DEFAULT_CACHED_INTERVAL,
            force_interval: DEFAULT_FORCE_INTERVAL,
            quiet_hours: QuietHours::from_hours(DEFAULT_QUIET_START_HOUR, DEFAULT_QUIET_END_HOUR),
        }
    }
}

impl RefreshPolicy {
    pub fn new(cached_interval: Duration, force_interval: Duration) -> Self {
        Self {
            cached_interval,
            force_interval,
            quiet_hours: None,
        }
    }

    pub fn with_quiet_hours(mut self, quiet_hours: Option<QuietHours>) -> Self {
        self.quiet_hours = quiet_hours;
        self
    }

    /// Fresh schedule with no refresh history.
    pub fn schedule(&self) -> RefreshSchedule {
        RefreshSchedule::new(self.cached_interval, self.force_interval)
            .with_quiet_hours(self.quiet_hours)
    }

    /// Overwrite the intervals and window of `schedule`, keeping its history.
    pub fn apply_to(&self, schedule: &mut RefreshSchedule) {
        schedule.cached_interval = self.cached_interval;
        schedule.force_interval = self.force_interval;
        schedule.quiet_hours = self.quiet_hours;
    }
}

// =============================================================================
// Coordinator configuration
// =============================================================================

/// Settings for one [`Coordinator`](super::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Initial refresh policy.
    pub policy: RefreshPolicy,

    /// Wait after submitting an action before polling its status.
    pub settle_delay: Duration,

    /// Wait between status polls of a pending action.
    pub action_poll_interval: Duration,

    /// Status polls before giving up on an action.
    pub action_max_polls: u32,

    /// Whether manually requested forced refreshes ignore quiet hours.
    pub manual_force_bypasses_quiet_hours: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            policy: RefreshPolicy::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            action_poll_interval: DEFAULT_ACTION_POLL_INTERVAL,
            action_max_polls: DEFAULT_ACTION_MAX_POLLS,
            manual_force_bypasses_quiet_hours: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_action_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.action_poll_interval = interval;
        self.action_max_polls = max_polls;
        self
    }

    pub fn with_manual_force_bypass(mut self, bypass: bool) -> Self {
        self.manual_force_bypasses_quiet_hours = bypass;
        self
    }
}
