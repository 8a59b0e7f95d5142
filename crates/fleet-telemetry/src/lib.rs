//! Fleet telemetry - REST client for recorded telemetry
//!
//! Supplies historical ranges to playback sessions through
//! [`fleet_core::TelemetryRangeSource`].

pub mod client;

pub use client::{TelemetryApiClient, TelemetryApiError};
