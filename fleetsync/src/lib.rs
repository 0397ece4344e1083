//! fleetsync - Freshness-aware vehicle telemetry polling
//!
//! This library keeps a consistent, rate-limited view of every vehicle owned
//! by a set of connected-car accounts. Each account gets a [`Coordinator`]
//! that decides when to read the API's cached state, when to wake the vehicle
//! for a forced poll, and how to confirm commanded actions (lock, climate,
//! charge) with a follow-up refresh.
//!
//! # Architecture
//!
//! ```text
//!  Registry ──► Coordinator (one per account) ──► AccountSession ──► VehicleApi
//!                  │        ▲
//!                  │        └── RefreshStrategy + QuietHours (pure)
//!                  ▼
//!           watch::Receiver<Arc<Fleet>>  (subscribers)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fleetsync::{Coordinator, CoordinatorConfig, Registry};
//!
//! let registry = Registry::new();
//! let coordinator = Coordinator::new(account, api, CoordinatorConfig::default());
//! registry.register(coordinator).await;
//!
//! // Dispatch by vehicle only
//! registry.submit_action(&vehicle_id, ActionKind::Lock, ActionParams::None).await?;
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod model;
pub mod registry;
pub mod schedule;
pub mod session;

pub use coordinator::{
    AccountStatus, Coordinator, CoordinatorConfig, CoordinatorError, LoopState, RefreshOutcome,
    RefreshPolicy,
};
pub use registry::{Registry, RegistryError};

/// Crate version, reported by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
