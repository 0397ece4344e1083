//! In-memory vehicle API.
//!
//! Behaves like the real service closely enough to drive coordinators end to
//! end: tokens expire and can be revoked, forced polls refresh the cache
//! timestamp, and successful actions change the vehicle's telemetry.
//!
//! Failures, latency and action outcomes can be scripted, and every operation
//! is counted, which makes it the main test double for the coordinator.
//!
//! # Example
//!
//! ```
//! use fleetsync::api::{Operation, SimulatedVehicleApi};
//!
//! let api = SimulatedVehicleApi::new();
//! api.add_account("driver@example.com", "secret", Vec::new());
//! assert_eq!(api.calls(Operation::FetchCached), 0);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{ApiError, AuthToken, BoxFuture, VehicleApi};
use crate::model::{
    ActionHandle, ActionKind, ActionParams, ActionStatus, Credentials, Vehicle, VehicleId,
};

/// Default token lifetime handed out by the simulator.
const DEFAULT_TOKEN_LIFETIME: chrono::Duration = chrono::Duration::hours(1);

/// Remote operations, for counting and failure scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    FetchCached,
    FetchForced,
    SendAction,
    PollAction,
}

impl Operation {
    fn index(self) -> usize {
        match self {
            Operation::Authenticate => 0,
            Operation::FetchCached => 1,
            Operation::FetchForced => 2,
            Operation::SendAction => 3,
            Operation::PollAction => 4,
        }
    }
}

/// JSON layout for seeding the simulator from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetFixture {
    pub accounts: Vec<FixtureAccount>,
}

/// One account in a [`FleetFixture`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
}

#[derive(Debug)]
struct SimAccount {
    password: String,
    vehicles: BTreeMap<VehicleId, Vehicle>,
}

#[derive(Debug)]
struct SimAction {
    username: String,
    vehicle_id: VehicleId,
    kind: ActionKind,
    params: ActionParams,
    pending_polls: u32,
    outcome: ActionStatus,
    applied: bool,
}

#[derive(Debug, Default)]
struct SimState {
    accounts: HashMap<String, SimAccount>,
    tokens: HashMap<String, String>,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    action_script: VecDeque<(u32, ActionStatus)>,
    actions: HashMap<ActionHandle, SimAction>,
    next_id: u64,
}

impl SimState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn take_failure(&mut self, op: Operation) -> Option<ApiError> {
        self.failures.get_mut(&op).and_then(|queue| queue.pop_front())
    }

    fn username_for(&self, token: &AuthToken) -> Result<String, ApiError> {
        if !token.is_valid_at(Utc::now()) {
            return Err(ApiError::Unauthorized("token expired".to_string()));
        }
        self.tokens
            .get(&token.access_token)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("unknown token".to_string()))
    }

    fn vehicle_mut(
        &mut self,
        username: &str,
        vehicle_id: &VehicleId,
    ) -> Result<&mut Vehicle, ApiError> {
        self.accounts
            .get_mut(username)
            .and_then(|account| account.vehicles.get_mut(vehicle_id))
            .ok_or_else(|| ApiError::UnknownVehicle(vehicle_id.clone()))
    }
}

/// In-memory [`VehicleApi`] implementation.
pub struct SimulatedVehicleApi {
    state: Mutex<SimState>,
    latency: Duration,
    token_lifetime: chrono::Duration,
    calls: [AtomicUsize; 5],
}

impl std::fmt::Debug for SimulatedVehicleApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedVehicleApi")
            .field("latency", &self.latency)
            .field("accounts", &self.state.lock().accounts.len())
            .finish_non_exhaustive()
    }
}

impl Default for SimulatedVehicleApi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVehicleApi {
    /// Create an empty simulator with no latency.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            latency: Duration::ZERO,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            calls: Default::default(),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Issue tokens valid for `lifetime`.
    pub fn with_token_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Seed from a parsed fixture.
    pub fn from_fixture(fixture: FleetFixture) -> Self {
        let api = Self::new();
        for account in fixture.accounts {
            api.add_account(&account.username, &account.password, account.vehicles);
        }
        api
    }

    /// Seed from a JSON fixture file.
    pub fn from_fixture_file(path: &Path) -> Result<Self, std::io::Error> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: FleetFixture = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::from_fixture(fixture))
    }

    /// Register an account and its vehicles.
    pub fn add_account(&self, username: &str, password: &str, vehicles: Vec<Vehicle>) {
        let vehicles = vehicles.into_iter().map(|v| (v.id.clone(), v)).collect();
        self.state.lock().accounts.insert(
            normalize(username),
            SimAccount {
                password: password.to_string(),
                vehicles,
            },
        );
    }

    /// Replace the vehicles owned by an account (fleet change).
    pub fn set_vehicles(&self, username: &str, vehicles: Vec<Vehicle>) {
        if let Some(account) = self.state.lock().accounts.get_mut(&normalize(username)) {
            account.vehicles = vehicles.into_iter().map(|v| (v.id.clone(), v)).collect();
        }
    }

    /// Change an account's password, as if done through the vendor's app.
    pub fn set_password(&self, username: &str, password: &str) {
        if let Some(account) = self.state.lock().accounts.get_mut(&normalize(username)) {
            account.password = password.to_string();
        }
    }

    /// Make the next call of `op` fail with `error`. Calls queue up.
    pub fn fail_next(&self, op: Operation, error: ApiError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Invalidate every issued token.
    pub fn revoke_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    /// The next submitted action reports `Pending` for `pending_polls` polls,
    /// then `outcome`. Unscripted actions succeed on the first poll.
    pub fn script_action(&self, pending_polls: u32, outcome: ActionStatus) {
        self.state
            .lock()
            .action_script
            .push_back((pending_polls, outcome));
    }

    /// Number of times `op` was called, including failed calls.
    pub fn calls(&self, op: Operation) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Current server-side view of a vehicle.
    pub fn vehicle(&self, username: &str, vehicle_id: &VehicleId) -> Option<Vehicle> {
        self.state
            .lock()
            .accounts
            .get(&normalize(username))
            .and_then(|account| account.vehicles.get(vehicle_id).cloned())
    }

    async fn begin(&self, op: Operation) -> Result<(), ApiError> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.state.lock().take_failure(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

fn apply_action(vehicle: &mut Vehicle, kind: ActionKind, params: &ActionParams) {
    let telemetry = &mut vehicle.snapshot.telemetry;
    match kind {
        ActionKind::Lock => telemetry.is_locked = Some(true),
        ActionKind::Unlock => telemetry.is_locked = Some(false),
        ActionKind::StartClimate => telemetry.climate_on = Some(true),
        ActionKind::StopClimate => telemetry.climate_on = Some(false),
        ActionKind::StartCharge => telemetry.is_charging = Some(true),
        ActionKind::StopCharge => telemetry.is_charging = Some(false),
        ActionKind::OpenChargePort => telemetry.charge_port_open = Some(true),
        ActionKind::CloseChargePort => telemetry.charge_port_open = Some(false),
        ActionKind::SetChargeLimits => {
            if let ActionParams::ChargeLimits {
                ac_percent,
                dc_percent,
            } = params
            {
                telemetry.charge_limit_ac = Some(*ac_percent);
                telemetry.charge_limit_dc = Some(*dc_percent);
            }
        }
    }
    vehicle.snapshot.fetched_at = Utc::now();
}

impl VehicleApi for SimulatedVehicleApi {
    fn authenticate<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<AuthToken, ApiError>> {
        Box::pin(async move {
            self.begin(Operation::Authenticate).await?;
            let mut state = self.state.lock();
            let username = normalize(&credentials.username);
            let matches = state
                .accounts
                .get(&username)
                .map(|account| account.password == credentials.password)
                .unwrap_or(false);
            if !matches {
                return Err(ApiError::Unauthorized("invalid credentials".to_string()));
            }
            let access_token = state.next_id("token");
            state.tokens.insert(access_token.clone(), username);
            Ok(AuthToken::new(access_token, Utc::now() + self.token_lifetime))
        })
    }

    fn fetch_cached<'a>(
        &'a self,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<Vec<Vehicle>, ApiError>> {
        Box::pin(async move {
            self.begin(Operation::FetchCached).await?;
            let state = self.state.lock();
            let username = state.username_for(token)?;
            let vehicles = state
                .accounts
                .get(&username)
                .map(|account| {
                    account
                        .vehicles
                        .values()
                        .cloned()
                        .map(|mut v| {
                            v.snapshot.is_forced = false;
                            v
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(vehicles)
        })
    }

    fn fetch_forced<'a>(
        &'a self,
        token: &'a AuthToken,
        vehicle_id: &'a VehicleId,
    ) -> BoxFuture<'a, Result<Vehicle, ApiError>> {
        Box::pin(async move {
            self.begin(Operation::FetchForced).await?;
            let mut state = self.state.lock();
            let username = state.username_for(token)?;
            let vehicle = state.vehicle_mut(&username, vehicle_id)?;
            vehicle.snapshot.fetched_at = Utc::now();
            let mut polled = vehicle.clone();
            polled.snapshot.is_forced = true;
            Ok(polled)
        })
    }

    fn send_action<'a>(
        &'a self,
        token: &'a AuthToken,
        vehicle_id: &'a VehicleId,
        kind: ActionKind,
        params: &'a ActionParams,
    ) -> BoxFuture<'a, Result<ActionHandle, ApiError>> {
        Box::pin(async move {
            self.begin(Operation::SendAction).await?;
            let mut state = self.state.lock();
            let username = state.username_for(token)?;
            let vehicle = state.vehicle_mut(&username, vehicle_id)?;
            if !vehicle.capabilities.supports(kind) {
                return Err(ApiError::Rejected(format!(
                    "{} not supported by {}",
                    kind, vehicle_id
                )));
            }
            let (pending_polls, outcome) = state
                .action_script
                .pop_front()
                .unwrap_or((0, ActionStatus::Succeeded));
            let handle = ActionHandle::new(state.next_id("action"));
            state.actions.insert(
                handle.clone(),
                SimAction {
                    username,
                    vehicle_id: vehicle_id.clone(),
                    kind,
                    params: params.clone(),
                    pending_polls,
                    outcome,
                    applied: false,
                },
            );
            Ok(handle)
        })
    }

    fn poll_action<'a>(
        &'a self,
        token: &'a AuthToken,
        vehicle_id: &'a VehicleId,
        handle: &'a ActionHandle,
    ) -> BoxFuture<'a, Result<ActionStatus, ApiError>> {
        Box::pin(async move {
            self.begin(Operation::PollAction).await?;
            let mut state = self.state.lock();
            state.username_for(token)?;

            let action = state
                .actions
                .get_mut(handle)
                .filter(|action| &action.vehicle_id == vehicle_id)
                .ok_or_else(|| ApiError::Rejected(format!("unknown action {}", handle)))?;

            if action.pending_polls > 0 {
                action.pending_polls -= 1;
                return Ok(ActionStatus::Pending);
            }

            let outcome = action.outcome;
            if outcome == ActionStatus::Succeeded && !action.applied {
                action.applied = true;
                let (username, kind, params) =
                    (action.username.clone(), action.kind, action.params.clone());
                let vehicle = state.vehicle_mut(&username, vehicle_id)?;
                apply_action(vehicle, kind, &params);
            }
            Ok(outcome)
        })
    }
}
