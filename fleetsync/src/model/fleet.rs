//! Per-account vehicle set and reconciliation.
//!
//! A [`Fleet`] is immutable. Each refresh builds a new one and the coordinator
//! swaps it in as a whole, so subscribers always observe a consistent set.
//!
//! # Reconciliation
//!
//! Vehicles are matched by [`VehicleId`], never by position:
//!
//! ```text
//! old {A, B, C} + fetched {B', C, D}  ──►  new {B', C, D}
//!                                          removed: A
//!                                          updated: B
//!                                          unchanged: C (same Arc reused)
//!                                          added: D
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use super::vehicle::{Vehicle, VehicleId};

/// Summary of what a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<VehicleId>,
    pub updated: Vec<VehicleId>,
    pub unchanged: Vec<VehicleId>,
    pub removed: Vec<VehicleId>,
}

impl ReconcileReport {
    /// Whether the vehicle set or any vehicle's data changed.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

/// The latest known state of every vehicle under one account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fleet {
    vehicles: BTreeMap<VehicleId, Arc<Vehicle>>,
    refreshed_at: Option<DateTime<FixedOffset>>,
}

impl Fleet {
    /// An empty fleet that has never been refreshed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, id: &VehicleId) -> Option<&Arc<Vehicle>> {
        self.vehicles.get(id)
    }

    pub fn contains(&self, id: &VehicleId) -> bool {
        self.vehicles.contains_key(id)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Arc<Vehicle>> {
        self.vehicles.values()
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.keys().cloned().collect()
    }

    /// Local wall-clock time of the refresh that produced this fleet.
    pub fn refreshed_at(&self) -> Option<DateTime<FixedOffset>> {
        self.refreshed_at
    }

    /// Build the fleet that results from a full (cached) fetch.
    ///
    /// Vehicles missing from `fetched` are dropped. If the API lists the same
    /// id twice the last entry wins.
    pub fn reconcile(
        &self,
        fetched: Vec<Vehicle>,
        refreshed_at: DateTime<FixedOffset>,
    ) -> (Fleet, ReconcileReport) {
        let mut report = ReconcileReport::default();
        let mut incoming: BTreeMap<VehicleId, Vehicle> = BTreeMap::new();
        for vehicle in fetched {
            incoming.insert(vehicle.id.clone(), vehicle);
        }

        let mut vehicles = BTreeMap::new();
        for (id, vehicle) in incoming {
            let entry = self.merge_one(&id, vehicle, &mut report);
            vehicles.insert(id, entry);
        }

        report.removed = self
            .vehicles
            .keys()
            .filter(|id| !vehicles.contains_key(*id))
            .cloned()
            .collect();

        (
            Fleet {
                vehicles,
                refreshed_at: Some(refreshed_at),
            },
            report,
        )
    }

    /// Build the fleet that results from forced polls of some vehicles.
    ///
    /// Vehicles not mentioned keep their current entry; nothing is removed.
    pub fn merge_forced(
        &self,
        polled: Vec<Vehicle>,
        refreshed_at: DateTime<FixedOffset>,
    ) -> (Fleet, ReconcileReport) {
        let mut report = ReconcileReport::default();
        let mut vehicles = self.vehicles.clone();
        for vehicle in polled {
            let id = vehicle.id.clone();
            let entry = self.merge_one(&id, vehicle, &mut report);
            vehicles.insert(id, entry);
        }

        (
            Fleet {
                vehicles,
                refreshed_at: Some(refreshed_at),
            },
            report,
        )
    }

    fn merge_one(
        &self,
        id: &VehicleId,
        vehicle: Vehicle,
        report: &mut ReconcileReport,
    ) -> Arc<Vehicle> {
        match self.vehicles.get(id) {
            Some(existing) if **existing == vehicle => {
                report.unchanged.push(id.clone());
                Arc::clone(existing)
            }
            Some(_) => {
                report.updated.push(id.clone());
                Arc::new(vehicle)
            }
            None => {
                report.added.push(id.clone());
                Arc::new(vehicle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::{Snapshot, VehicleTelemetry};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<FixedOffset> {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
            .fixed_offset()
    }

    fn vehicle(id: &str, soc: u8) -> Vehicle {
        let telemetry = VehicleTelemetry {
            battery_soc: Some(soc),
            ..Default::default()
        };
        let fetched_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Vehicle::new(
            VehicleId::from(id),
            id.to_uppercase(),
            Snapshot::new(fetched_at, false, telemetry),
        )
    }

    fn ids(fleet: &Fleet) -> Vec<&str> {
        fleet.vehicles().map(|v| v.id.as_str()).collect()
    }

    #[test]
    fn test_reconcile_adds_updates_and_drops_by_id() {
        let (old, _) = Fleet::empty().reconcile(
            vec![vehicle("a", 10), vehicle("b", 20), vehicle("c", 30)],
            at(10),
        );

        let (new, report) = old.reconcile(
            vec![vehicle("b", 25), vehicle("c", 30), vehicle("d", 40)],
            at(11),
        );

        assert_eq!(ids(&new), vec!["b", "c", "d"]);
        assert_eq!(report.added, vec![VehicleId::from("d")]);
        assert_eq!(report.updated, vec![VehicleId::from("b")]);
        assert_eq!(report.unchanged, vec![VehicleId::from("c")]);
        assert_eq!(report.removed, vec![VehicleId::from("a")]);
        assert_eq!(
            new.get(&VehicleId::from("b")).unwrap().snapshot.telemetry.battery_soc,
            Some(25)
        );
        assert_eq!(new.refreshed_at(), Some(at(11)));
    }

    #[test]
    fn test_reconcile_reuses_unchanged_arcs() {
        let (old, _) = Fleet::empty().reconcile(vec![vehicle("c", 30)], at(10));
        let (new, report) = old.reconcile(vec![vehicle("c", 30)], at(11));

        assert!(!report.has_changes());
        assert!(Arc::ptr_eq(
            old.get(&VehicleId::from("c")).unwrap(),
            new.get(&VehicleId::from("c")).unwrap()
        ));
    }

    #[test]
    fn test_reconcile_deduplicates_by_id() {
        let (fleet, report) =
            Fleet::empty().reconcile(vec![vehicle("d", 40), vehicle("d", 41)], at(10));
        assert_eq!(fleet.len(), 1);
        assert_eq!(report.added.len(), 1);
        assert_eq!(
            fleet.get(&VehicleId::from("d")).unwrap().snapshot.telemetry.battery_soc,
            Some(41)
        );
    }

    #[test]
    fn test_merge_forced_keeps_other_vehicles() {
        let (old, _) =
            Fleet::empty().reconcile(vec![vehicle("a", 10), vehicle("b", 20)], at(10));
        let (new, report) = old.merge_forced(vec![vehicle("a", 11)], at(11));

        assert_eq!(ids(&new), vec!["a", "b"]);
        assert_eq!(report.updated, vec![VehicleId::from("a")]);
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_empty_fleet() {
        let fleet = Fleet::empty();
        assert!(fleet.is_empty());
        assert_eq!(fleet.refreshed_at(), None);
        assert!(!fleet.contains(&VehicleId::from("a")));
    }
}
