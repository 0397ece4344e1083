//! Action confirmation task.
//!
//! ```text
//!  submit ──► settle_delay ──► poll ──► Pending ──► poll_interval ──► poll ...
//!                               │
//!          Succeeded / Failed / max polls / credentials rejected
//!                               │
//!                               ▼
//!                      one cached refresh ──► slot released
//! ```
//!
//! Every await point also watches the coordinator's cancellation token. A
//! cancelled task releases its slot and exits without refreshing. Rejected
//! credentials flag the account for reconfiguration, which also skips the
//! refresh.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::Inner;
use crate::model::{ActionHandle, ActionKind, ActionOutcome, ActionPhase, ActionStatus, VehicleId};

/// Removes the vehicle's pending action when the task ends, however it ends.
struct SlotRelease<'a> {
    inner: &'a Inner,
    vehicle_id: &'a VehicleId,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.inner.pending.remove(self.vehicle_id);
    }
}

pub(super) async fn confirm_action(
    inner: Arc<Inner>,
    vehicle_id: VehicleId,
    kind: ActionKind,
    handle: ActionHandle,
) -> ActionOutcome {
    let _slot = SlotRelease {
        inner: &inner,
        vehicle_id: &vehicle_id,
    };

    let outcome = tokio::select! {
        biased;
        _ = inner.cancel.cancelled() => ActionOutcome::Abandoned,
        outcome = poll_until_settled(&inner, &vehicle_id, &handle) => outcome,
    };

    match outcome {
        ActionOutcome::Abandoned => {
            debug!(
                account = %inner.account_id,
                vehicle = %vehicle_id,
                action = %kind,
                "Confirmation abandoned"
            );
            return outcome;
        }
        ActionOutcome::TimedOut => warn!(
            account = %inner.account_id,
            vehicle = %vehicle_id,
            action = %kind,
            polls = inner.config.action_max_polls,
            "Action not confirmed in time"
        ),
        ActionOutcome::Failed => warn!(
            account = %inner.account_id,
            vehicle = %vehicle_id,
            action = %kind,
            "Action failed"
        ),
        ActionOutcome::Succeeded => info!(
            account = %inner.account_id,
            vehicle = %vehicle_id,
            action = %kind,
            "Action confirmed"
        ),
    }

    // Pick up whatever the action changed, even when it failed or timed out.
    tokio::select! {
        biased;
        _ = inner.cancel.cancelled() => ActionOutcome::Abandoned,
        _ = inner.confirmation_refresh() => outcome,
    }
}

async fn poll_until_settled(
    inner: &Inner,
    vehicle_id: &VehicleId,
    handle: &ActionHandle,
) -> ActionOutcome {
    tokio::time::sleep(inner.config.settle_delay).await;
    if let Some(mut pending) = inner.pending.get_mut(vehicle_id) {
        pending.phase = ActionPhase::Confirming;
    }

    let max_polls = inner.config.action_max_polls;
    for attempt in 1..=max_polls {
        if let Some(mut pending) = inner.pending.get_mut(vehicle_id) {
            pending.polls = attempt;
        }

        match inner.session.poll_action(vehicle_id, handle).await {
            Ok(ActionStatus::Succeeded) => return ActionOutcome::Succeeded,
            Ok(ActionStatus::Failed) => return ActionOutcome::Failed,
            Ok(ActionStatus::Pending) => {
                debug!(vehicle = %vehicle_id, handle = %handle, attempt, "Action pending");
            }
            Err(e) if e.is_authentication() => {
                inner.status.record_failure(&e);
                inner.status.set_needs_reconfiguration(true);
                warn!(
                    account = %inner.account_id,
                    vehicle = %vehicle_id,
                    handle = %handle,
                    error = %e,
                    "Credentials rejected while confirming, account needs reconfiguration"
                );
                return ActionOutcome::Failed;
            }
            Err(e) => {
                warn!(vehicle = %vehicle_id, handle = %handle, attempt, error = %e, "Status poll failed");
            }
        }

        if attempt < max_polls {
            tokio::time::sleep(inner.config.action_poll_interval).await;
        }
    }
    ActionOutcome::TimedOut
}
