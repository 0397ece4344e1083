//! Observable per-account state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;

use crate::model::AccountId;

/// What the refresh loop is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Idle,
    Refreshing,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::NotStarted => "not started",
            LoopState::Idle => "idle",
            LoopState::Refreshing => "refreshing",
            LoopState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of an account's coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    pub account_id: AccountId,
    pub label: String,
    pub loop_state: LoopState,

    /// Completion time of the last successful refresh.
    pub last_updated: Option<DateTime<FixedOffset>>,

    /// Error from the most recent refresh, cleared by the next success.
    pub last_error: Option<String>,

    pub needs_reconfiguration: bool,
    pub refreshes_completed: u64,

    /// Ticks dropped because a refresh was running or the account needs
    /// reconfiguration.
    pub ticks_skipped: u64,

    pub pending_actions: usize,
    pub vehicles: usize,
}

/// Mutable counters behind [`AccountStatus`].
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    last_updated: Mutex<Option<DateTime<FixedOffset>>>,
    last_error: Mutex<Option<String>>,
    needs_reconfiguration: AtomicBool,
    refreshes_completed: AtomicU64,
    ticks_skipped: AtomicU64,
}

impl StatusTracker {
    pub(crate) fn record_success(&self, at: DateTime<FixedOffset>) {
        *self.last_updated.lock() = Some(at);
        *self.last_error.lock() = None;
        self.refreshes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, error: &impl fmt::Display) {
        *self.last_error.lock() = Some(error.to_string());
    }

    pub(crate) fn record_skip(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_needs_reconfiguration(&self, value: bool) {
        self.needs_reconfiguration.store(value, Ordering::SeqCst);
    }

    pub(crate) fn needs_reconfiguration(&self) -> bool {
        self.needs_reconfiguration.load(Ordering::SeqCst)
    }

    pub(crate) fn last_updated(&self) -> Option<DateTime<FixedOffset>> {
        *self.last_updated.lock()
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub(crate) fn refreshes_completed(&self) -> u64 {
        self.refreshes_completed.load(Ordering::Relaxed)
    }

    pub(crate) fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::Relaxed)
    }
}
