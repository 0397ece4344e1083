//! Vehicle API collaborator interface.
//!
//! The wire client for the connected-car service lives outside this crate.
//! It plugs in through [`VehicleApi`], which is dyn-compatible so a session
//! can hold an `Arc<dyn VehicleApi>`.
//!
//! [`SimulatedVehicleApi`] is an in-memory implementation used by the CLI's
//! demo mode and by tests.

mod error;
mod simulated;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::model::{ActionHandle, ActionKind, ActionParams, ActionStatus, Credentials, Vehicle, VehicleId};

pub use error::ApiError;
pub use simulated::{FleetFixture, Operation, SimulatedVehicleApi};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Access token issued by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    pub valid_until: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>, valid_until: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            valid_until,
        }
    }

    /// Whether the token can still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

/// Remote operations the coordinator needs from a vehicle API.
///
/// Every call may take seconds to tens of seconds and may fail transiently.
/// Implementations must be `Send + Sync`; they are shared by an account's
/// refresh loop and its action confirmation tasks.
pub trait VehicleApi: Send + Sync {
    /// Log in and obtain a token.
    fn authenticate<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<AuthToken, ApiError>>;

    /// Read every vehicle's state from the API's own cache.
    fn fetch_cached<'a>(
        &'a self,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<Vec<Vehicle>, ApiError>>;

    /// Wake one vehicle and read its current state.
    fn fetch_forced<'a>(
        &'a self,
        token: &'a AuthToken,
        vehicle_id: &'a VehicleId,
    ) -> BoxFuture<'a, Result<Vehicle, ApiError>>;

    /// Submit a command.
    fn send_action<'a>(
        &'a self,
        token: &'a AuthToken,
        vehicle_id: &'a VehicleId,
        kind: ActionKind,
        params: &'a ActionParams,
    ) -> BoxFuture<'a, Result<ActionHandle, ApiError>>;

    /// Check the status of a submitted command.
    fn poll_action<'a>(
        &'a self,
        token: &'a AuthToken,
        vehicle_id: &'a VehicleId,
        handle: &'a ActionHandle,
    ) -> BoxFuture<'a, Result<ActionStatus, ApiError>>;
}
