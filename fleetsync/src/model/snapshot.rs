//! Point-in-time vehicle telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Telemetry fields the coordinator and its subscribers care about.
///
/// Anything the API reports beyond these lands in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    #[serde(default)]
    pub is_locked: Option<bool>,
    #[serde(default)]
    pub climate_on: Option<bool>,
    #[serde(default)]
    pub is_charging: Option<bool>,
    #[serde(default)]
    pub charge_port_open: Option<bool>,
    /// High-voltage battery state of charge in percent.
    #[serde(default)]
    pub battery_soc: Option<u8>,
    #[serde(default)]
    pub range_km: Option<f64>,
    #[serde(default)]
    pub odometer_km: Option<f64>,
    #[serde(default)]
    pub charge_limit_ac: Option<u8>,
    #[serde(default)]
    pub charge_limit_dc: Option<u8>,
    /// (latitude, longitude) in degrees.
    #[serde(default)]
    pub location: Option<(f64, f64)>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// An immutable copy of a vehicle's telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the API's cache captured this state (not local fetch time).
    pub fetched_at: DateTime<Utc>,

    /// Whether the data came from waking the vehicle rather than the API cache.
    pub is_forced: bool,

    pub telemetry: VehicleTelemetry,
}

impl Snapshot {
    pub fn new(fetched_at: DateTime<Utc>, is_forced: bool, telemetry: VehicleTelemetry) -> Self {
        Self {
            fetched_at,
            is_forced,
            telemetry,
        }
    }
}
