//! healthgrid-core — shared types and configuration for HealthGrid.
//!
//! Defines the keys that identify application versions and their instances,
//! health check definitions and probe results, the tri-state
//! [`GlobalHealth`] value, and the inbound/outbound event types exchanged
//! with the health aggregator.

pub mod config;
pub mod types;

pub use config::{AggregatorConfig, ConfigError, RemovalPurge};
pub use types::*;
