//! Integration tests for coordinators and the registry.
//!
//! These drive complete accounts against the simulated vehicle API with
//! tokio's paused clock:
//! - the refresh loop across a quiet-hours night
//! - fleet reconciliation when vehicles come and go
//! - action dispatch by vehicle id across accounts
//! - failure isolation between accounts
//! - wiring from a config file and a fixture file
//!
//! Run with: `cargo test --test coordinator_integration`

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use fleetsync::api::{Operation, SimulatedVehicleApi};
use fleetsync::config::ConfigFile;
use fleetsync::clock::AnchoredClock;
use fleetsync::model::{
    Account, ActionKind, ActionParams, Brand, Credentials, Region, Snapshot, Vehicle,
    VehicleId, VehicleTelemetry,
};
use fleetsync::schedule::QuietHours;
use fleetsync::{Coordinator, CoordinatorConfig, LoopState, RefreshPolicy, Registry};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn vehicle(id: &str, soc: u8) -> Vehicle {
    let telemetry = VehicleTelemetry {
        battery_soc: Some(soc),
        ..VehicleTelemetry::default()
    };
    Vehicle::new(VehicleId::from(id), id, Snapshot::new(Utc::now(), false, telemetry))
}

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn account(username: &str) -> Account {
    Account::new(Brand::Kia, Region::Europe, Credentials::new(username, "secret"))
}

fn coordinator(
    api: &Arc<SimulatedVehicleApi>,
    username: &str,
    policy: RefreshPolicy,
    now: NaiveDateTime,
) -> Coordinator {
    Coordinator::with_clock(
        &account(username),
        api.clone(),
        CoordinatorConfig::default().with_policy(policy),
        Arc::new(AnchoredClock::new(now)),
    )
}

fn standard_policy() -> RefreshPolicy {
    RefreshPolicy::new(Duration::from_secs(30 * 60), Duration::from_secs(240 * 60))
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Starting at 23:00 inside a 22:00-07:00 window, the loop keeps doing cached
/// refreshes every 30 minutes and wakes the vehicle right after 07:00.
#[tokio::test(start_paused = true)]
async fn test_quiet_night_defers_forced_poll_until_morning() {
    let api = Arc::new(SimulatedVehicleApi::new());
    api.add_account("night@example.com", "secret", vec![vehicle("ev", 60)]);
    let policy = standard_policy().with_quiet_hours(QuietHours::from_hours(22, 7));
    let coordinator = coordinator(&api, "night@example.com", policy, at(1, 23, 0));

    coordinator.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.calls(Operation::FetchCached), 1);
    assert_eq!(api.calls(Operation::FetchForced), 0);

    // 06:59: still only cached refreshes, one per half hour.
    tokio::time::sleep(Duration::from_secs(7 * 3600 + 58 * 60)).await;
    assert_eq!(api.calls(Operation::FetchForced), 0);
    assert!(api.calls(Operation::FetchCached) >= 15);

    // 07:01: quiet hours lifted, the vehicle was woken.
    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(api.calls(Operation::FetchForced), 1);
    assert!(coordinator.schedule().last_force_at.is_some());

    coordinator.shutdown().await;
}

/// Old fleet {A, B, C}, new fetch {B, C, D}: A is dropped, D is added once,
/// and subscribers see a single replacement.
#[tokio::test(start_paused = true)]
async fn test_fleet_change_is_reconciled_by_id() {
    let api = Arc::new(SimulatedVehicleApi::new());
    api.add_account(
        "fleet@example.com",
        "secret",
        vec![vehicle("A", 10), vehicle("B", 20), vehicle("C", 30)],
    );
    let coordinator = coordinator(&api, "fleet@example.com", standard_policy(), at(1, 12, 0));
    coordinator.request_refresh(false).await.unwrap();

    let mut rx = coordinator.subscribe();
    api.set_vehicles(
        "fleet@example.com",
        vec![vehicle("B", 21), vehicle("C", 31), vehicle("D", 40), vehicle("D", 41)],
    );
    let outcome = coordinator.request_refresh(false).await.unwrap();

    assert!(rx.has_changed().unwrap());
    let fleet = rx.borrow_and_update().clone();
    assert!(!rx.has_changed().unwrap());

    assert_eq!(
        fleet.ids(),
        vec![VehicleId::from("B"), VehicleId::from("C"), VehicleId::from("D")]
    );
    assert_eq!(outcome.report.removed, vec![VehicleId::from("A")]);
    assert_eq!(outcome.report.added, vec![VehicleId::from("D")]);
    assert_eq!(
        fleet
            .get(&VehicleId::from("B"))
            .unwrap()
            .snapshot
            .telemetry
            .battery_soc,
        Some(21)
    );
}

/// A vehicle owned by the second account is found and commanded through the
/// registry, and only that account refreshes afterwards.
#[tokio::test(start_paused = true)]
async fn test_registry_dispatches_action_to_owner() {
    let api = Arc::new(SimulatedVehicleApi::new());
    api.add_account("first@example.com", "secret", vec![vehicle("first-car", 50)]);
    api.add_account("second@example.com", "secret", vec![vehicle("second-car", 70)]);

    let registry = Registry::new();
    let first = registry
        .register(coordinator(&api, "first@example.com", standard_policy(), at(1, 12, 0)))
        .await;
    let second = registry
        .register(coordinator(&api, "second@example.com", standard_policy(), at(1, 12, 0)))
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let target = VehicleId::from("second-car");
    let (owner, _) = registry.find_vehicle(&target).unwrap();
    assert_eq!(owner.account_id(), second.account_id());

    let first_refreshes = first.status().refreshes_completed;
    registry
        .submit_action(&target, ActionKind::Unlock, ActionParams::None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let unlocked = second.vehicle(&target).unwrap();
    assert_eq!(unlocked.snapshot.telemetry.is_locked, Some(false));
    assert_eq!(first.status().refreshes_completed, first_refreshes);
    assert_eq!(second.status().pending_actions, 0);

    registry.shutdown_all().await;
    assert!(first.is_shut_down());
    assert!(second.is_shut_down());
}

/// One account losing its credentials does not stop another account's loop.
#[tokio::test(start_paused = true)]
async fn test_auth_failure_is_isolated_per_account() {
    let api = Arc::new(SimulatedVehicleApi::new());
    api.add_account("broken@example.com", "secret", vec![vehicle("b1", 10)]);
    api.add_account("healthy@example.com", "secret", vec![vehicle("h1", 90)]);
    api.set_password("broken@example.com", "changed-elsewhere");

    let registry = Registry::new();
    let broken = registry
        .register(coordinator(&api, "broken@example.com", standard_policy(), at(1, 12, 0)))
        .await;
    let healthy = registry
        .register(coordinator(&api, "healthy@example.com", standard_policy(), at(1, 12, 0)))
        .await;

    tokio::time::sleep(Duration::from_secs(61 * 60)).await;

    let broken_status = broken.status();
    assert!(broken_status.needs_reconfiguration);
    assert!(broken_status.ticks_skipped >= 1);
    assert_eq!(broken_status.refreshes_completed, 0);
    assert!(broken.fleet().is_empty());

    let healthy_status = healthy.status();
    assert!(!healthy_status.needs_reconfiguration);
    assert!(healthy_status.refreshes_completed >= 3);
    assert_eq!(healthy.fleet().len(), 1);

    broken
        .update_credentials(Credentials::new("broken@example.com", "changed-elsewhere"))
        .await;
    broken.request_refresh(false).await.unwrap();
    assert_eq!(broken.fleet().len(), 1);

    registry.shutdown_all().await;
}

/// Accounts and policies from an INI file, vehicles from a JSON fixture.
#[tokio::test(start_paused = true)]
async fn test_config_and_fixture_files_drive_registry() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.ini");
    let fixture_path = dir.path().join("fleet.json");

    std::fs::write(
        &config_path,
        "[defaults]\n\
         cached_interval_mins = 15\n\
         quiet_hours = off\n\
         \n\
         [account.family]\n\
         brand = hyundai\n\
         region = canada\n\
         username = Family@Example.com\n\
         password = pw\n\
         force_interval_mins = 60\n",
    )
    .unwrap();
    std::fs::write(
        &fixture_path,
        r#"{"accounts": [{"username": "family@example.com", "password": "pw", "vehicles": [
            {"id": "ioniq", "name": "Ioniq 5", "model": "Ioniq 5",
             "snapshot": {"fetched_at": "2024-05-01T08:00:00Z", "is_forced": false,
                          "telemetry": {"battery_soc": 55}}}]}]}"#,
    )
    .unwrap();

    let config = ConfigFile::load_from(&config_path).unwrap();
    let api = Arc::new(SimulatedVehicleApi::from_fixture_file(&fixture_path).unwrap());
    let settings = config.account("family").unwrap();
    let policy = config.policy_for(settings);
    assert_eq!(policy.cached_interval, Duration::from_secs(15 * 60));
    assert_eq!(policy.force_interval, Duration::from_secs(60 * 60));
    assert_eq!(policy.quiet_hours, None);

    let registry = Registry::new();
    let coordinator = registry
        .register(Coordinator::with_clock(
            &settings.account(),
            api.clone(),
            config.coordinator_config(settings),
            Arc::new(AnchoredClock::new(at(1, 3, 0))),
        ))
        .await;
    assert_eq!(coordinator.account_id(), &settings.account_id());

    // No quiet window: the first tick wakes the vehicle even at 03:00,
    // falling back to a cached read because the fleet is still unknown.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.calls(Operation::FetchCached), 1);
    assert_eq!(coordinator.status().loop_state, LoopState::Idle);
    assert!(registry.find_vehicle(&VehicleId::from("ioniq")).is_some());

    // The fallback left the force timer due, so the next tick (03:15) wakes
    // the now-known vehicle. The following wake is not before 04:15.
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(api.calls(Operation::FetchForced), 1);
    assert!(coordinator.schedule().last_force_at.is_some());

    registry.shutdown_all().await;
    assert_eq!(coordinator.status().loop_state, LoopState::Stopped);
}
