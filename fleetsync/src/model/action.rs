//! Commanded actions and their in-flight bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::vehicle::VehicleId;

/// Lowest charge limit the API accepts, in percent.
pub const MIN_CHARGE_LIMIT: u8 = 50;

/// Highest charge limit the API accepts, in percent.
pub const MAX_CHARGE_LIMIT: u8 = 100;

/// Charge limits must be a multiple of this step.
pub const CHARGE_LIMIT_STEP: u8 = 10;

/// A command that can be sent to a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Lock,
    Unlock,
    StartClimate,
    StopClimate,
    StartCharge,
    StopCharge,
    SetChargeLimits,
    OpenChargePort,
    CloseChargePort,
}

impl ActionKind {
    /// All known action kinds.
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::Lock,
            ActionKind::Unlock,
            ActionKind::StartClimate,
            ActionKind::StopClimate,
            ActionKind::StartCharge,
            ActionKind::StopCharge,
            ActionKind::SetChargeLimits,
            ActionKind::OpenChargePort,
            ActionKind::CloseChargePort,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Lock => "lock",
            ActionKind::Unlock => "unlock",
            ActionKind::StartClimate => "start_climate",
            ActionKind::StopClimate => "stop_climate",
            ActionKind::StartCharge => "start_charge",
            ActionKind::StopCharge => "stop_charge",
            ActionKind::SetChargeLimits => "set_charge_limits",
            ActionKind::OpenChargePort => "open_charge_port",
            ActionKind::CloseChargePort => "close_charge_port",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Climate start options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateParams {
    /// Target cabin temperature in °C.
    pub temperature_c: f32,
    pub defrost: bool,
    /// Steering wheel and rear window heating.
    pub heating: bool,
    /// Run time in minutes.
    pub duration_mins: u8,
}

impl Default for ClimateParams {
    fn default() -> Self {
        Self {
            temperature_c: 21.0,
            defrost: false,
            heating: false,
            duration_mins: 10,
        }
    }
}

/// Parameters accompanying an action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionParams {
    #[default]
    None,
    Climate(ClimateParams),
    ChargeLimits { ac_percent: u8, dc_percent: u8 },
}

impl ActionParams {
    /// Check that the parameters have the shape `kind` expects.
    ///
    /// Only structural checks live here; the remote API remains the
    /// authority on what a specific vehicle accepts.
    pub fn validate_for(&self, kind: ActionKind) -> Result<(), String> {
        match (kind, self) {
            (ActionKind::StartClimate, ActionParams::Climate(params)) => {
                if params.duration_mins == 0 {
                    return Err("climate duration must be at least one minute".to_string());
                }
                Ok(())
            }
            // The API falls back to the vehicle's stored climate preset.
            (ActionKind::StartClimate, ActionParams::None) => Ok(()),
            (
                ActionKind::SetChargeLimits,
                ActionParams::ChargeLimits {
                    ac_percent,
                    dc_percent,
                },
            ) => {
                validate_charge_limit("ac", *ac_percent)?;
                validate_charge_limit("dc", *dc_percent)
            }
            (ActionKind::SetChargeLimits, _) => {
                Err("set_charge_limits requires charge limit parameters".to_string())
            }
            (_, ActionParams::None) => Ok(()),
            (kind, params) => Err(format!(
                "{} does not take parameters, got {:?}",
                kind, params
            )),
        }
    }
}

fn validate_charge_limit(which: &str, percent: u8) -> Result<(), String> {
    if !(MIN_CHARGE_LIMIT..=MAX_CHARGE_LIMIT).contains(&percent)
        || percent % CHARGE_LIMIT_STEP != 0
    {
        return Err(format!(
            "{} charge limit {}% must be {}-{}% in steps of {}",
            which, percent, MIN_CHARGE_LIMIT, MAX_CHARGE_LIMIT, CHARGE_LIMIT_STEP
        ));
    }
    Ok(())
}

/// Opaque id the API returns for a submitted action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionHandle(String);

impl ActionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote status of a submitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

/// Where an in-flight action is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    /// Accepted by the API, waiting out the settle delay.
    InFlight,
    /// Polling the API for completion.
    Confirming,
}

/// How a confirmation task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    Failed,
    /// Still pending after the configured number of polls.
    TimedOut,
    /// The owning coordinator shut down first.
    Abandoned,
}

/// A commanded action being tracked until confirmed.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub vehicle_id: VehicleId,
    pub kind: ActionKind,
    pub handle: Option<ActionHandle>,
    pub submitted_at: tokio::time::Instant,
    pub phase: ActionPhase,
    pub polls: u32,
}

impl PendingAction {
    pub fn new(vehicle_id: VehicleId, kind: ActionKind) -> Self {
        Self {
            vehicle_id,
            kind,
            handle: None,
            submitted_at: tokio::time::Instant::now(),
            phase: ActionPhase::InFlight,
            polls: 0,
        }
    }
}
