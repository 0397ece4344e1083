//! Per-account update coordinator.
//!
//! A [`Coordinator`] owns one account's session, refresh schedule and latest
//! [`Fleet`]. It runs two independent flows:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Coordinator                            │
//! │                                                                  │
//! │  refresh loop                                                    │
//! │    tick ──► decide() ──► None ─────────────────────► sleep       │
//! │                 │                                                │
//! │                 ▼                                                │
//! │          single-flight guard ──► busy ──► tick dropped           │
//! │                 │                                                │
//! │                 ▼                                                │
//! │     cached fetch / forced polls (cached fallback)                │
//! │                 │                                                │
//! │                 ▼                                                │
//! │     reconcile ──► watch::send_replace(Arc<Fleet>) ──► sleep      │
//! │                                                                  │
//! │  commanded action                                                │
//! │    validate ──► reserve vehicle slot ──► send ──► return handle  │
//! │                                            │                     │
//! │                                            ▼                     │
//! │                           confirmation task (TaskTracker)        │
//! │                           settle, poll, one cached refresh       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Subscribers see each refresh as exactly one fleet replacement. Nothing is
//! published once the coordinator's cancellation token has fired.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = Coordinator::new(&account, api, CoordinatorConfig::default());
//! let mut fleet_rx = coordinator.subscribe();
//! coordinator.start();
//!
//! fleet_rx.changed().await?;
//! let handle = coordinator
//!     .submit_action(&vehicle_id, ActionKind::Lock, ActionParams::None)
//!     .await?;
//!
//! coordinator.shutdown().await;
//! ```

mod config;
mod confirm;
mod error;
mod guard;
mod status;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::api::VehicleApi;
use crate::clock::{Clock, SystemClock};
use crate::model::{
    Account, AccountId, ActionHandle, ActionKind, ActionParams, Credentials, Fleet,
    PendingAction, ReconcileReport, Vehicle, VehicleId,
};
use crate::schedule::{decide, RefreshAction, RefreshSchedule, MIN_CHECK_DELAY};
use crate::session::{AccountSession, SessionError};

pub use config::{
    CoordinatorConfig, RefreshPolicy, DEFAULT_ACTION_MAX_POLLS, DEFAULT_ACTION_POLL_INTERVAL,
    DEFAULT_CACHED_INTERVAL, DEFAULT_FORCE_INTERVAL, DEFAULT_QUIET_END_HOUR,
    DEFAULT_QUIET_START_HOUR, DEFAULT_SETTLE_DELAY,
};
pub use error::CoordinatorError;
pub use status::{AccountStatus, LoopState};

use guard::RefreshGuard;
use status::StatusTracker;

/// Result of one completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// The refresh that was run.
    pub action: RefreshAction,

    /// The forced pass was skipped or failed and a cached fetch was used.
    pub fell_back: bool,

    pub completed_at: DateTime<FixedOffset>,
    pub report: ReconcileReport,
}

// =============================================================================
// Shared state
// =============================================================================

/// State shared between the coordinator handle, its loop and its
/// confirmation tasks.
pub(crate) struct Inner {
    account_id: AccountId,
    label: String,
    session: AccountSession,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    schedule: Mutex<RefreshSchedule>,
    fleet_tx: watch::Sender<Arc<Fleet>>,
    guard: RefreshGuard,
    pending: DashMap<VehicleId, PendingAction>,
    status: StatusTracker,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Inner {
    async fn run(self: Arc<Self>) {
        info!(account = %self.account_id, label = %self.label, "Refresh loop started");

        loop {
            let delay = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                delay = self.tick() => delay,
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(account = %self.account_id, "Refresh loop stopped");
    }

    /// Run one loop iteration and return how long to sleep afterwards.
    async fn tick(&self) -> Duration {
        let schedule = self.schedule.lock().clone();

        if self.status.needs_reconfiguration() {
            self.status.record_skip();
            debug!(account = %self.account_id, "Tick skipped, account needs reconfiguration");
            return schedule.effective_interval();
        }

        let decision = decide(self.clock.now(), &schedule);
        debug!(
            account = %self.account_id,
            action = %decision.action,
            next_check_secs = decision.next_check.as_secs(),
            force_blocked = decision.force_blocked,
            "Tick"
        );

        if decision.action == RefreshAction::None {
            return decision.next_check;
        }

        // A dropped force stays due; retry it soon rather than a full interval later.
        let Some(_permit) = self.guard.try_acquire() else {
            self.status.record_skip();
            debug!(
                account = %self.account_id,
                action = %decision.action,
                "Refresh already running, tick dropped"
            );
            return match decision.action {
                RefreshAction::ForceWithFallback => MIN_CHECK_DELAY,
                _ => decision.next_check,
            };
        };

        match self.run_refresh(decision.action).await {
            Ok(_) => decide(self.clock.now(), &self.schedule.lock()).next_check,
            Err(_) => schedule.effective_interval(),
        }
    }

    /// Run a refresh. The caller must hold the refresh guard.
    async fn run_refresh(&self, action: RefreshAction) -> Result<RefreshOutcome, CoordinatorError> {
        let result = match action {
            RefreshAction::None => {
                return Ok(RefreshOutcome {
                    action,
                    fell_back: false,
                    completed_at: self.clock.now(),
                    report: ReconcileReport::default(),
                })
            }
            RefreshAction::CachedOnly => self.refresh_cached().await,
            RefreshAction::ForceWithFallback => self.refresh_forced().await,
        };

        match &result {
            Ok(outcome) => {
                self.status.record_success(outcome.completed_at);
                info!(
                    account = %self.account_id,
                    action = %outcome.action,
                    fell_back = outcome.fell_back,
                    added = outcome.report.added.len(),
                    updated = outcome.report.updated.len(),
                    removed = outcome.report.removed.len(),
                    "Refresh complete"
                );
            }
            Err(CoordinatorError::ShuttingDown) => {}
            Err(e) if e.needs_reconfiguration() => {
                self.status.record_failure(e);
                self.status.set_needs_reconfiguration(true);
                warn!(
                    account = %self.account_id,
                    error = %e,
                    "Authentication failed, account needs reconfiguration"
                );
            }
            Err(e) => {
                self.status.record_failure(e);
                warn!(account = %self.account_id, action = %action, error = %e, "Refresh failed");
            }
        }

        result
    }

    async fn refresh_cached(&self) -> Result<RefreshOutcome, CoordinatorError> {
        let vehicles = self.session.fetch_cached().await?;
        self.finish_cached(vehicles, RefreshAction::CachedOnly, false)
    }

    /// Force-poll every known vehicle, falling back to a cached fetch when
    /// the fleet is still unknown or any poll fails.
    async fn refresh_forced(&self) -> Result<RefreshOutcome, CoordinatorError> {
        let known = self.fleet_tx.borrow().ids();
        let mut polled: Vec<Vehicle> = Vec::with_capacity(known.len());
        let mut degraded = known.is_empty();

        for vehicle_id in &known {
            match self.session.fetch_forced(vehicle_id).await {
                Ok(vehicle) => polled.push(vehicle),
                Err(e) if e.is_authentication() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        account = %self.account_id,
                        vehicle = %vehicle_id,
                        error = %e,
                        "Forced poll failed, falling back to cached state"
                    );
                    degraded = true;
                    break;
                }
            }
        }

        if degraded {
            let mut vehicles = self.session.fetch_cached().await?;
            // Forced snapshots that did arrive are fresher than the cache.
            for vehicle in vehicles.iter_mut() {
                if let Some(pos) = polled.iter().position(|p| p.id == vehicle.id) {
                    *vehicle = polled.swap_remove(pos);
                }
            }
            return self.finish_cached(vehicles, RefreshAction::ForceWithFallback, true);
        }

        let completed_at = self.clock.now();
        let report = self.publish(|fleet| fleet.merge_forced(polled, completed_at))?;
        self.schedule.lock().record_forced(completed_at);
        Ok(RefreshOutcome {
            action: RefreshAction::ForceWithFallback,
            fell_back: false,
            completed_at,
            report,
        })
    }

    fn finish_cached(
        &self,
        vehicles: Vec<Vehicle>,
        action: RefreshAction,
        fell_back: bool,
    ) -> Result<RefreshOutcome, CoordinatorError> {
        let completed_at = self.clock.now();
        let report = self.publish(|fleet| fleet.reconcile(vehicles, completed_at))?;
        self.schedule.lock().record_cached(completed_at);
        Ok(RefreshOutcome {
            action,
            fell_back,
            completed_at,
            report,
        })
    }

    /// Replace the published fleet with one built from the current fleet.
    ///
    /// Only called while holding the refresh guard, so the read-modify-write
    /// cannot interleave with another refresh.
    fn publish<F>(&self, build: F) -> Result<ReconcileReport, CoordinatorError>
    where
        F: FnOnce(&Fleet) -> (Fleet, ReconcileReport),
    {
        if self.cancel.is_cancelled() {
            return Err(CoordinatorError::ShuttingDown);
        }
        let current = Arc::clone(&self.fleet_tx.borrow());
        let (fleet, report) = build(&current);
        self.fleet_tx.send_replace(Arc::new(fleet));
        Ok(report)
    }

    /// Cached refresh after an action. Waits for a running refresh instead
    /// of being dropped.
    async fn confirmation_refresh(&self) {
        let _permit = self.guard.acquire().await;
        if self.status.needs_reconfiguration() {
            return;
        }
        // Failures are logged and recorded by run_refresh.
        let _ = self.run_refresh(RefreshAction::CachedOnly).await;
    }

    fn reserve(
        &self,
        vehicle_id: &VehicleId,
        kind: ActionKind,
    ) -> Result<Reservation<'_>, CoordinatorError> {
        match self.pending.entry(vehicle_id.clone()) {
            Entry::Occupied(_) => Err(CoordinatorError::ActionInFlight(vehicle_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(PendingAction::new(vehicle_id.clone(), kind));
                Ok(Reservation {
                    pending: &self.pending,
                    vehicle_id: vehicle_id.clone(),
                    armed: true,
                })
            }
        }
    }
}

/// A claimed per-vehicle action slot, released on drop unless committed.
struct Reservation<'a> {
    pending: &'a DashMap<VehicleId, PendingAction>,
    vehicle_id: VehicleId,
    armed: bool,
}

impl Reservation<'_> {
    /// Hand the slot over to the confirmation task.
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.remove(&self.vehicle_id);
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Update coordinator for one account.
pub struct Coordinator {
    inner: Arc<Inner>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("account_id", &self.inner.account_id)
            .field("label", &self.inner.label)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator reading the system's local time.
    ///
    /// The refresh loop does not run until [`start`](Self::start).
    pub fn new(account: &Account, api: Arc<dyn VehicleApi>, config: CoordinatorConfig) -> Self {
        Self::with_clock(account, api, config, Arc::new(SystemClock))
    }

    /// Create a coordinator reading time from `clock`.
    pub fn with_clock(
        account: &Account,
        api: Arc<dyn VehicleApi>,
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let account_id = account.id();
        let session = AccountSession::new(account_id.clone(), account.credentials.clone(), api);
        let (fleet_tx, _) = watch::channel(Arc::new(Fleet::empty()));

        let inner = Inner {
            account_id,
            label: account.label(),
            session,
            clock,
            schedule: Mutex::new(config.policy.schedule()),
            config,
            fleet_tx,
            guard: RefreshGuard::default(),
            pending: DashMap::new(),
            status: StatusTracker::default(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };

        Self {
            inner: Arc::new(inner),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.inner.account_id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Spawn the refresh loop. The first tick runs immediately.
    ///
    /// Calling this more than once, or after shutdown, does nothing.
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            warn!(account = %self.inner.account_id, "Start ignored, coordinator is shut down");
            return;
        }
        let mut handle = self.loop_handle.lock();
        if handle.is_none() {
            *handle = Some(tokio::spawn(Arc::clone(&self.inner).run()));
        }
    }

    /// Stop the loop and wait for confirmation tasks to exit.
    ///
    /// In-flight confirmations are abandoned; nothing is published after
    /// this starts.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(account = %self.inner.account_id, error = %e, "Refresh loop ended abnormally");
            }
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!(account = %self.inner.account_id, "Coordinator stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Receive every fleet replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Fleet>> {
        self.inner.fleet_tx.subscribe()
    }

    /// The latest published fleet.
    pub fn fleet(&self) -> Arc<Fleet> {
        Arc::clone(&self.inner.fleet_tx.borrow())
    }

    pub fn vehicle(&self, vehicle_id: &VehicleId) -> Option<Arc<Vehicle>> {
        self.inner.fleet_tx.borrow().get(vehicle_id).cloned()
    }

    pub fn status(&self) -> AccountStatus {
        let inner = &self.inner;
        let loop_state = if inner.cancel.is_cancelled() {
            LoopState::Stopped
        } else if inner.guard.is_busy() {
            LoopState::Refreshing
        } else if self.loop_handle.lock().is_some() {
            LoopState::Idle
        } else {
            LoopState::NotStarted
        };

        AccountStatus {
            account_id: inner.account_id.clone(),
            label: inner.label.clone(),
            loop_state,
            last_updated: inner.status.last_updated(),
            last_error: inner.status.last_error(),
            needs_reconfiguration: inner.status.needs_reconfiguration(),
            refreshes_completed: inner.status.refreshes_completed(),
            ticks_skipped: inner.status.ticks_skipped(),
            pending_actions: inner.pending.len(),
            vehicles: inner.fleet_tx.borrow().len(),
        }
    }

    /// Actions awaiting confirmation.
    pub fn pending_actions(&self) -> Vec<PendingAction> {
        self.inner
            .pending
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Current schedule, including refresh history.
    pub fn schedule(&self) -> RefreshSchedule {
        self.inner.schedule.lock().clone()
    }

    pub fn policy(&self) -> RefreshPolicy {
        let schedule = self.inner.schedule.lock();
        RefreshPolicy {
            cached_interval: schedule.cached_interval,
            force_interval: schedule.force_interval,
            quiet_hours: schedule.quiet_hours,
        }
    }

    /// Replace the refresh policy. Takes effect on the next tick.
    pub fn update_policy(&self, policy: RefreshPolicy) {
        policy.apply_to(&mut self.inner.schedule.lock());
        info!(
            account = %self.inner.account_id,
            cached_interval_secs = policy.cached_interval.as_secs(),
            force_interval_secs = policy.force_interval.as_secs(),
            quiet_hours = ?policy.quiet_hours.map(|qh| qh.to_string()),
            "Refresh policy updated"
        );
    }

    /// Swap credentials and clear a pending reconfiguration.
    pub async fn update_credentials(&self, credentials: Credentials) {
        self.inner.session.update_credentials(credentials).await;
        self.inner.status.set_needs_reconfiguration(false);
    }

    /// Run a refresh now, regardless of the intervals.
    ///
    /// A forced request is refused during quiet hours unless
    /// `manual_force_bypasses_quiet_hours` is set.
    pub async fn request_refresh(&self, forced: bool) -> Result<RefreshOutcome, CoordinatorError> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(CoordinatorError::ShuttingDown);
        }
        if inner.status.needs_reconfiguration() {
            return Err(CoordinatorError::NeedsReconfiguration);
        }

        let action = if forced {
            let quiet = inner.schedule.lock().in_quiet_hours(inner.clock.now());
            if quiet && !inner.config.manual_force_bypasses_quiet_hours {
                return Err(CoordinatorError::QuietHours);
            }
            RefreshAction::ForceWithFallback
        } else {
            RefreshAction::CachedOnly
        };

        let _permit = inner
            .guard
            .try_acquire()
            .ok_or(CoordinatorError::RefreshInProgress)?;
        info!(account = %inner.account_id, action = %action, "Manual refresh");

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => Err(CoordinatorError::ShuttingDown),
            result = inner.run_refresh(action) => result,
        }
    }

    /// Send a command to one of this account's vehicles.
    ///
    /// Returns as soon as the API accepts the command. Confirmation and the
    /// follow-up refresh run in the background.
    pub async fn submit_action(
        &self,
        vehicle_id: &VehicleId,
        kind: ActionKind,
        params: ActionParams,
    ) -> Result<ActionHandle, CoordinatorError> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(CoordinatorError::ShuttingDown);
        }
        if inner.status.needs_reconfiguration() {
            return Err(CoordinatorError::NeedsReconfiguration);
        }

        let vehicle = self
            .vehicle(vehicle_id)
            .ok_or_else(|| CoordinatorError::UnknownVehicle(vehicle_id.clone()))?;
        if !vehicle.capabilities.supports(kind) {
            return Err(CoordinatorError::UnsupportedAction {
                vehicle_id: vehicle_id.clone(),
                kind,
            });
        }
        params
            .validate_for(kind)
            .map_err(CoordinatorError::InvalidParams)?;

        let reservation = inner.reserve(vehicle_id, kind)?;

        let sent = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return Err(CoordinatorError::ShuttingDown),
            sent = inner.session.send_action(vehicle_id, kind, &params) => sent,
        };

        let handle = match sent {
            Ok(handle) => handle,
            Err(SessionError::ActionRejected(reason)) => {
                warn!(
                    account = %inner.account_id,
                    vehicle = %vehicle_id,
                    action = %kind,
                    reason = %reason,
                    "Action rejected"
                );
                return Err(CoordinatorError::ActionRejected(reason));
            }
            Err(e) => {
                if e.is_authentication() {
                    inner.status.record_failure(&e);
                    inner.status.set_needs_reconfiguration(true);
                }
                return Err(e.into());
            }
        };

        if let Some(mut pending) = inner.pending.get_mut(vehicle_id) {
            pending.handle = Some(handle.clone());
        }
        reservation.commit();

        inner.tracker.spawn(confirm::confirm_action(
            Arc::clone(&self.inner),
            vehicle_id.clone(),
            kind,
            handle.clone(),
        ));

        info!(
            account = %inner.account_id,
            vehicle = %vehicle_id,
            action = %kind,
            handle = %handle,
            "Action submitted"
        );
        Ok(handle)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}
