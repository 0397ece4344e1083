//! Process-wide registry of account coordinators.
//!
//! Exactly one [`Coordinator`] per account. Writers (register, deregister,
//! shutdown) are serialized by an async mutex so a replacement can await the
//! old coordinator's shutdown without racing another writer. Readers go
//! through a read-write lock and never wait on network I/O.
//!
//! # Example
//!
//! ```ignore
//! let registry = Registry::new();
//! registry.register(Coordinator::new(&account, api, config)).await;
//!
//! let handle = registry
//!     .submit_action(&vehicle_id, ActionKind::Lock, ActionParams::None)
//!     .await?;
//!
//! registry.shutdown_all().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::coordinator::{AccountStatus, Coordinator, CoordinatorError, RefreshOutcome};
use crate::model::{AccountId, ActionHandle, ActionKind, ActionParams, Vehicle, VehicleId};

/// Errors from registry-level dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no coordinator registered for account {0}")]
    UnknownAccount(AccountId),

    #[error("no registered account owns vehicle {0}")]
    UnknownVehicle(VehicleId),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Maps account ids to their running coordinators.
#[derive(Default)]
pub struct Registry {
    coordinators: RwLock<HashMap<AccountId, Arc<Coordinator>>>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("accounts", &self.accounts())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install and start `coordinator` under its account id.
    ///
    /// A coordinator already registered for the same account is removed and
    /// fully shut down first.
    pub async fn register(&self, coordinator: Coordinator) -> Arc<Coordinator> {
        let _writer = self.writer.lock().await;
        let account_id = coordinator.account_id().clone();

        let previous = self.coordinators.write().remove(&account_id);
        if let Some(previous) = previous {
            info!(account = %account_id, "Replacing coordinator");
            previous.shutdown().await;
        }

        let coordinator = Arc::new(coordinator);
        self.coordinators
            .write()
            .insert(account_id.clone(), Arc::clone(&coordinator));
        coordinator.start();

        info!(account = %account_id, label = coordinator.label(), "Coordinator registered");
        coordinator
    }

    /// Remove and shut down an account's coordinator.
    ///
    /// Returns `false` if nothing was registered.
    pub async fn deregister(&self, account_id: &AccountId) -> bool {
        let _writer = self.writer.lock().await;
        let removed = self.coordinators.write().remove(account_id);
        match removed {
            Some(coordinator) => {
                coordinator.shutdown().await;
                info!(account = %account_id, "Coordinator deregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, account_id: &AccountId) -> Option<Arc<Coordinator>> {
        self.coordinators.read().get(account_id).cloned()
    }

    /// Find the coordinator owning `vehicle_id` and the vehicle's latest state.
    pub fn find_vehicle(&self, vehicle_id: &VehicleId) -> Option<(Arc<Coordinator>, Arc<Vehicle>)> {
        self.coordinators
            .read()
            .values()
            .find_map(|coordinator| {
                coordinator
                    .vehicle(vehicle_id)
                    .map(|vehicle| (Arc::clone(coordinator), vehicle))
            })
    }

    /// Route a command to whichever account owns the vehicle.
    pub async fn submit_action(
        &self,
        vehicle_id: &VehicleId,
        kind: ActionKind,
        params: ActionParams,
    ) -> Result<ActionHandle, RegistryError> {
        let (coordinator, _) = self
            .find_vehicle(vehicle_id)
            .ok_or_else(|| RegistryError::UnknownVehicle(vehicle_id.clone()))?;
        Ok(coordinator.submit_action(vehicle_id, kind, params).await?)
    }

    pub async fn request_refresh(
        &self,
        account_id: &AccountId,
        forced: bool,
    ) -> Result<RefreshOutcome, RegistryError> {
        let coordinator = self
            .get(account_id)
            .ok_or_else(|| RegistryError::UnknownAccount(account_id.clone()))?;
        Ok(coordinator.request_refresh(forced).await?)
    }

    /// Registered account ids, sorted.
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.coordinators.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Status of every account, sorted by account id.
    pub fn statuses(&self) -> Vec<AccountStatus> {
        let mut statuses: Vec<AccountStatus> = self
            .coordinators
            .read()
            .values()
            .map(|coordinator| coordinator.status())
            .collect();
        statuses.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        statuses
    }

    pub fn len(&self) -> usize {
        self.coordinators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.read().is_empty()
    }

    /// Shut down and remove every coordinator.
    pub async fn shutdown_all(&self) {
        let _writer = self.writer.lock().await;
        let drained: Vec<Arc<Coordinator>> = self
            .coordinators
            .write()
            .drain()
            .map(|(_, coordinator)| coordinator)
            .collect();

        let count = drained.len();
        futures::future::join_all(drained.iter().map(|c| c.shutdown())).await;
        info!(count, "All coordinators stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Operation, SimulatedVehicleApi};
    use crate::clock::AnchoredClock;
    use crate::coordinator::{CoordinatorConfig, LoopState};
    use crate::model::{Account, Brand, Credentials, Region, Snapshot, VehicleTelemetry};
    use chrono::{NaiveDate, Utc};
    use std::time::Duration;

    fn vehicle(id: &str) -> Vehicle {
        Vehicle::new(
            VehicleId::from(id),
            id,
            Snapshot::new(Utc::now(), false, VehicleTelemetry::default()),
        )
    }

    fn coordinator(api: &Arc<SimulatedVehicleApi>, username: &str) -> Coordinator {
        let anchor = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Coordinator::with_clock(
            &Account::new(
                Brand::Hyundai,
                Region::Europe,
                Credentials::new(username, "secret"),
            ),
            api.clone(),
            CoordinatorConfig::default(),
            Arc::new(AnchoredClock::new(anchor)),
        )
    }

    fn two_account_api() -> Arc<SimulatedVehicleApi> {
        let api = Arc::new(SimulatedVehicleApi::new());
        api.add_account("first@example.com", "secret", vec![vehicle("car-1")]);
        api.add_account("second@example.com", "secret", vec![vehicle("car-2")]);
        api
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_vehicle_across_accounts() {
        let api = two_account_api();
        let registry = Registry::new();
        registry.register(coordinator(&api, "first@example.com")).await;
        let second = registry.register(coordinator(&api, "second@example.com")).await;

        // Let both loops run their first tick.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (owner, vehicle) = registry.find_vehicle(&VehicleId::from("car-2")).unwrap();
        assert_eq!(owner.account_id(), second.account_id());
        assert_eq!(vehicle.id, VehicleId::from("car-2"));
        assert!(registry.find_vehicle(&VehicleId::from("car-9")).is_none());

        registry.shutdown_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_stops_previous_loop() {
        let api = two_account_api();
        let registry = Registry::new();
        let old = registry.register(coordinator(&api, "first@example.com")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let new = registry.register(coordinator(&api, "first@example.com")).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(old.status().loop_state, LoopState::Stopped);
        assert!(!new.is_shut_down());
        assert!(Arc::ptr_eq(
            &registry.get(new.account_id()).unwrap(),
            &new
        ));

        // Only the new loop keeps refreshing: a cached fetch on its first
        // tick, then a forced poll once the cached interval has passed.
        let fetches = || api.calls(Operation::FetchCached) + api.calls(Operation::FetchForced);
        let before = fetches();
        let old_refreshes = old.status().refreshes_completed;
        tokio::time::sleep(Duration::from_secs(31 * 60)).await;
        assert_eq!(fetches(), before + 2);
        assert_eq!(old.status().refreshes_completed, old_refreshes);

        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_errors() {
        let api = two_account_api();
        let registry = Registry::new();
        registry.register(coordinator(&api, "first@example.com")).await;

        assert_eq!(
            registry
                .submit_action(&VehicleId::from("car-9"), ActionKind::Lock, ActionParams::None)
                .await,
            Err(RegistryError::UnknownVehicle(VehicleId::from("car-9")))
        );

        let missing = AccountId::from_raw("acct-missing");
        assert_eq!(
            registry.request_refresh(&missing, false).await,
            Err(RegistryError::UnknownAccount(missing.clone()))
        );
        assert!(!registry.deregister(&missing).await);

        registry.shutdown_all().await;
    }
}
