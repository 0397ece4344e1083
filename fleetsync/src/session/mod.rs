//! Authenticated session for one account.
//!
//! [`AccountSession`] wraps a [`VehicleApi`] with the account's credentials
//! and token lifecycle:
//!
//! ```text
//!   call ──► ensure_authenticated ──► api op ──► Ok
//!                                        │
//!                                   Unauthorized
//!                                        │
//!                                        ▼
//!                     reauthenticate (once) ──► api op (once) ──► Ok / Err
//! ```
//!
//! Token acquisition is single-flight: the token slot is guarded by an async
//! mutex held across the login call, so concurrent callers wait for one
//! login instead of each starting their own.

mod error;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthToken, VehicleApi};
use crate::model::{
    AccountId, ActionHandle, ActionKind, ActionParams, ActionStatus, Credentials, Vehicle,
    VehicleId,
};

pub use error::{SessionError, SessionResult};

/// One account's connection to the vehicle API.
pub struct AccountSession {
    account_id: AccountId,
    credentials: RwLock<Credentials>,
    api: Arc<dyn VehicleApi>,
    token: Mutex<Option<AuthToken>>,
}

impl std::fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSession")
            .field("account_id", &self.account_id)
            .field("credentials", &*self.credentials.read())
            .finish_non_exhaustive()
    }
}

impl AccountSession {
    pub fn new(account_id: AccountId, credentials: Credentials, api: Arc<dyn VehicleApi>) -> Self {
        Self {
            account_id,
            credentials: RwLock::new(credentials),
            api,
            token: Mutex::new(None),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Return a usable token, logging in if there is none or it expired.
    pub async fn ensure_authenticated(&self) -> SessionResult<AuthToken> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.clone());
            }
            debug!(account = %self.account_id, "Token expired");
        }
        let token = self.login().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Replace a token the API refused.
    ///
    /// If another caller already swapped `stale` for a fresh token, that
    /// token is reused instead of logging in again.
    pub async fn reauthenticate(&self, stale: &AuthToken) -> SessionResult<AuthToken> {
        let mut slot = self.token.lock().await;
        if let Some(current) = slot.as_ref() {
            if current != stale && current.is_valid_at(Utc::now()) {
                return Ok(current.clone());
            }
        }
        *slot = None;
        let token = self.login().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Swap credentials and drop the cached token.
    pub async fn update_credentials(&self, credentials: Credentials) {
        *self.credentials.write() = credentials;
        *self.token.lock().await = None;
        info!(account = %self.account_id, "Credentials updated");
    }

    /// Whether a token is currently cached.
    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    pub async fn fetch_cached(&self) -> SessionResult<Vec<Vehicle>> {
        self.with_reauth("fetch_cached", |token| async move {
            self.api.fetch_cached(&token).await
        })
        .await
    }

    pub async fn fetch_forced(&self, vehicle_id: &VehicleId) -> SessionResult<Vehicle> {
        self.with_reauth("fetch_forced", |token| async move {
            self.api.fetch_forced(&token, vehicle_id).await
        })
        .await
    }

    pub async fn send_action(
        &self,
        vehicle_id: &VehicleId,
        kind: ActionKind,
        params: &ActionParams,
    ) -> SessionResult<ActionHandle> {
        self.with_reauth("send_action", |token| async move {
            self.api.send_action(&token, vehicle_id, kind, params).await
        })
        .await
    }

    pub async fn poll_action(
        &self,
        vehicle_id: &VehicleId,
        handle: &ActionHandle,
    ) -> SessionResult<ActionStatus> {
        self.with_reauth("poll_action", |token| async move {
            self.api.poll_action(&token, vehicle_id, handle).await
        })
        .await
    }

    async fn login(&self) -> SessionResult<AuthToken> {
        let credentials = self.credentials.read().clone();
        debug!(account = %self.account_id, "Authenticating");
        let token = self.api.authenticate(&credentials).await.map_err(|e| {
            warn!(account = %self.account_id, error = %e, "Authentication failed");
            SessionError::from(e)
        })?;
        info!(
            account = %self.account_id,
            valid_until = %token.valid_until,
            "Authenticated"
        );
        Ok(token)
    }

    /// Run `call` with a token, re-authenticating and retrying once on
    /// `Unauthorized`.
    async fn with_reauth<T, F, Fut>(&self, op: &'static str, call: F) -> SessionResult<T>
    where
        F: Fn(AuthToken) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self.ensure_authenticated().await?;
        match call(token.clone()).await {
            Err(e) if e.is_auth() => {
                warn!(account = %self.account_id, op, error = %e, "Token refused, re-authenticating");
                let fresh = self.reauthenticate(&token).await?;
                call(fresh).await.map_err(SessionError::from)
            }
            other => other.map_err(SessionError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Operation, SimulatedVehicleApi};
    use crate::model::{Snapshot, VehicleTelemetry};
    use std::time::Duration;

    fn vehicle(id: &str) -> Vehicle {
        Vehicle::new(
            VehicleId::from(id),
            id,
            Snapshot::new(Utc::now(), false, VehicleTelemetry::default()),
        )
    }

    fn setup() -> (Arc<SimulatedVehicleApi>, AccountSession) {
        let api = Arc::new(SimulatedVehicleApi::new());
        api.add_account("driver@example.com", "secret", vec![vehicle("v1")]);
        let session = AccountSession::new(
            AccountId::from_raw("acct-test"),
            Credentials::new("driver@example.com", "secret"),
            api.clone(),
        );
        (api, session)
    }

    #[tokio::test]
    async fn test_token_reused_between_calls() {
        let (api, session) = setup();
        session.fetch_cached().await.unwrap();
        session.fetch_cached().await.unwrap();
        assert_eq!(api.calls(Operation::Authenticate), 1);
        assert_eq!(api.calls(Operation::FetchCached), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_login_is_single_flight() {
        let api = Arc::new(SimulatedVehicleApi::new().with_latency(Duration::from_secs(2)));
        api.add_account("driver@example.com", "secret", vec![vehicle("v1")]);
        let session = Arc::new(AccountSession::new(
            AccountId::from_raw("acct-test"),
            Credentials::new("driver@example.com", "secret"),
            api.clone(),
        ));

        let a = session.clone();
        let b = session.clone();
        let (ra, rb) = tokio::join!(a.ensure_authenticated(), b.ensure_authenticated());
        assert_eq!(ra.unwrap(), rb.unwrap());
        assert_eq!(api.calls(Operation::Authenticate), 1);
    }

    #[tokio::test]
    async fn test_revoked_token_reauthenticates_once() {
        let (api, session) = setup();
        session.fetch_cached().await.unwrap();
        api.revoke_tokens();

        let vehicles = session.fetch_cached().await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(api.calls(Operation::Authenticate), 2);
        assert_eq!(api.calls(Operation::FetchCached), 3);
    }

    #[tokio::test]
    async fn test_persistent_auth_failure_surfaces() {
        let (api, session) = setup();
        session.fetch_cached().await.unwrap();
        api.revoke_tokens();
        api.set_password("driver@example.com", "rotated");

        let err = session.fetch_cached().await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(api.calls(Operation::Authenticate), 2);
    }

    #[tokio::test]
    async fn test_network_error_is_transient() {
        let (api, session) = setup();
        api.fail_next(Operation::FetchForced, ApiError::Network("timeout".into()));
        let err = session.fetch_forced(&VehicleId::from("v1")).await.unwrap_err();
        assert!(matches!(err, SessionError::Transient(_)));
        assert_eq!(api.calls(Operation::FetchForced), 1);
    }

    #[tokio::test]
    async fn test_update_credentials_drops_token() {
        let (api, session) = setup();
        session.ensure_authenticated().await.unwrap();
        assert!(session.has_token().await);

        api.set_password("driver@example.com", "rotated");
        session
            .update_credentials(Credentials::new("driver@example.com", "rotated"))
            .await;
        assert!(!session.has_token().await);

        session.fetch_cached().await.unwrap();
        assert_eq!(api.calls(Operation::Authenticate), 2);
    }

    #[tokio::test]
    async fn test_rejected_action_maps_to_action_rejected() {
        let (api, session) = setup();
        api.fail_next(Operation::SendAction, ApiError::Rejected("asleep".into()));
        let err = session
            .send_action(&VehicleId::from("v1"), ActionKind::Lock, &ActionParams::None)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::ActionRejected("asleep".into()));
    }
}
