//! Coordinator error types.

use thiserror::Error;

use crate::model::{ActionKind, VehicleId};
use crate::session::SessionError;

/// Why a coordinator refused or failed a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// A refresh for this account is already running.
    #[error("a refresh is already in progress")]
    RefreshInProgress,

    /// Forced refreshes are suppressed during quiet hours.
    #[error("forced refresh blocked by quiet hours")]
    QuietHours,

    /// Authentication failed; new credentials are required.
    #[error("account needs reconfiguration")]
    NeedsReconfiguration,

    #[error("vehicle {0} is not part of this account")]
    UnknownVehicle(VehicleId),

    #[error("vehicle {vehicle_id} does not support {kind}")]
    UnsupportedAction {
        vehicle_id: VehicleId,
        kind: ActionKind,
    },

    #[error("invalid action parameters: {0}")]
    InvalidParams(String),

    /// The vehicle already has an action awaiting confirmation.
    #[error("vehicle {0} already has an action in flight")]
    ActionInFlight(VehicleId),

    #[error("action rejected: {0}")]
    ActionRejected(String),

    #[error("coordinator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CoordinatorError {
    /// Whether the error means credentials must be fixed before retrying.
    pub fn needs_reconfiguration(&self) -> bool {
        match self {
            CoordinatorError::NeedsReconfiguration => true,
            CoordinatorError::Session(e) => e.is_authentication(),
            _ => false,
        }
    }
}
