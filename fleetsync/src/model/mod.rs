//! Domain model: accounts, vehicles, snapshots and commanded actions.

mod account;
mod action;
mod fleet;
mod snapshot;
mod vehicle;

pub use account::{Account, AccountId, Brand, Credentials, Region};
pub use action::{
    ActionHandle, ActionKind, ActionOutcome, ActionParams, ActionPhase, ActionStatus,
    ClimateParams, PendingAction, CHARGE_LIMIT_STEP, MAX_CHARGE_LIMIT, MIN_CHARGE_LIMIT,
};
pub use fleet::{Fleet, ReconcileReport};
pub use snapshot::{Snapshot, VehicleTelemetry};
pub use vehicle::{Capabilities, Vehicle, VehicleId};
