//! Session error types.

use thiserror::Error;

use crate::api::ApiError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure of a session operation, classified for the coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Network-level failure. Retried on the next natural tick.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Credentials refused, even after one re-authentication.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The API refused the request itself.
    #[error("request rejected: {0}")]
    ActionRejected(String),
}

impl SessionError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, SessionError::Authentication(_))
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(msg) => SessionError::Transient(msg),
            ApiError::Unauthorized(msg) => SessionError::Authentication(msg),
            ApiError::Rejected(msg) => SessionError::ActionRejected(msg),
            ApiError::UnknownVehicle(id) => {
                SessionError::ActionRejected(format!("vehicle {} not found", id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VehicleId;

    #[test]
    fn test_api_error_classification() {
        assert_eq!(
            SessionError::from(ApiError::Network("timeout".into())),
            SessionError::Transient("timeout".into())
        );
        assert!(SessionError::from(ApiError::Unauthorized("x".into())).is_authentication());
        assert!(matches!(
            SessionError::from(ApiError::UnknownVehicle(VehicleId::from("v9"))),
            SessionError::ActionRejected(_)
        ));
    }
}
