//! Vehicles and their capabilities.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::ActionKind;
use super::snapshot::Snapshot;

/// Opaque vehicle identifier assigned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The set of actions a vehicle supports.
///
/// Combustion vehicles have no charge controls, older models lack remote
/// climate, and so on. Commands outside this set are rejected locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<ActionKind>);

impl Capabilities {
    /// No remote actions at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every known action.
    pub fn all() -> Self {
        Self(ActionKind::all().iter().copied().collect())
    }

    /// Lock and climate only (typical combustion vehicle).
    pub fn combustion() -> Self {
        [
            ActionKind::Lock,
            ActionKind::Unlock,
            ActionKind::StartClimate,
            ActionKind::StopClimate,
        ]
        .into_iter()
        .collect()
    }

    pub fn supports(&self, kind: ActionKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn with(mut self, kind: ActionKind) -> Self {
        self.0.insert(kind);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ActionKind> for Capabilities {
    fn from_iter<I: IntoIterator<Item = ActionKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A vehicle with its latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub snapshot: Snapshot,
}

impl Vehicle {
    pub fn new(id: VehicleId, name: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            id,
            name: name.into(),
            model: String::new(),
            capabilities: Capabilities::all(),
            snapshot,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combustion_capabilities() {
        let caps = Capabilities::combustion();
        assert!(caps.supports(ActionKind::Lock));
        assert!(caps.supports(ActionKind::StartClimate));
        assert!(!caps.supports(ActionKind::StartCharge));
        assert!(!caps.supports(ActionKind::SetChargeLimits));
    }

    #[test]
    fn test_capabilities_all_and_none() {
        let all = Capabilities::all();
        for kind in ActionKind::all() {
            assert!(all.supports(*kind));
        }
        assert_eq!(Capabilities::none().iter().count(), 0);
        assert!(Capabilities::none()
            .with(ActionKind::Lock)
            .supports(ActionKind::Lock));
    }

    #[test]
    fn test_capabilities_serialize_as_list() {
        let caps = Capabilities::none()
            .with(ActionKind::Unlock)
            .with(ActionKind::Lock);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["lock","unlock"]"#);
    }
}
