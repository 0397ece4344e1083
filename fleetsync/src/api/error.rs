//! Errors reported by a vehicle API client.

use thiserror::Error;

use crate::model::VehicleId;

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Connection, timeout or 5xx style failure. Worth retrying later.
    #[error("network error: {0}")]
    Network(String),

    /// The token or the credentials were refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The API refused a command (vehicle asleep, unsupported, rate limited).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The API does not know this vehicle under the account.
    #[error("unknown vehicle: {0}")]
    UnknownVehicle(VehicleId),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}
