//! Refresh scheduling: quiet hours and the cached/forced refresh strategy.
//!
//! Everything in here is pure. The coordinator feeds in the current wall
//! clock and its bookkeeping, and gets back what to do and how long to sleep.

mod quiet_hours;
mod strategy;

pub use quiet_hours::{in_quiet_hours, QuietHours};
pub use strategy::{
    decide, RefreshAction, RefreshDecision, RefreshSchedule, MIN_CHECK_DELAY,
};
