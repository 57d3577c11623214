//! healthgrid-aggregator — per-instance global health for HealthGrid.
//!
//! Consumes raw health check results and derives one tri-state value per
//! instance, publishing an event only when that value changes.
//!
//! # Architecture
//!
//! ```text
//! probe executors ──┐
//!                   ├─→ AggregatorHandle ──mpsc──→ HealthAggregator task
//! lifecycle mgmt ───┘                                 ├── Registry
//!                                                     │   ├── definitions: app → {check}
//!                                                     │   └── states: instance → {check → result?}
//!                                                     └── EventNotifier (on transition)
//! ```
//!
//! # Global health
//!
//! - every check reported alive → healthy
//! - otherwise, any check not yet reported → unknown
//! - otherwise → unhealthy
//!
//! Instance state is seeded from the application's checks on its first
//! report and is not back-filled when checks are added later. Updates for
//! checks the application does not have are dropped with a warning and
//! counted in [`RegistryStats::discarded_updates`].

pub mod aggregator;
pub mod error;
pub mod notifier;
pub mod registry;

pub use aggregator::{AggregatorHandle, AggregatorMessage, HealthAggregator};
pub use error::{AggregatorError, AggregatorResult};
pub use notifier::{BroadcastNotifier, EventNotifier, LogNotifier};
pub use registry::{global_health, CheckStatuses, Registry, RegistryStats, UpdateOutcome};
