//! Tracking thresholds shared by every consumer of fleet state.
//!
//! These are fixed for the process. Anything that needs to know whether a
//! vehicle is "still being tracked" must go through [`INACTIVITY_TIMEOUT_MS`]
//! (usually via [`crate::fleet::is_live`]) so that all views agree.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A vehicle is active while its last sample is younger than this (milliseconds).
pub const INACTIVITY_TIMEOUT_MS: i64 = 30_000;

/// Cap on the per-vehicle trail of distinct positions.
pub const MAX_RECENT_POSITIONS: usize = 50;

/// Cap on the geofence event log.
pub const MAX_GEOFENCE_EVENTS: usize = 50;

/// Planar distance (degrees) beyond which a marker snaps instead of tweening.
/// 0.01 deg is roughly 1.1 km of latitude.
pub const TELEPORT_THRESHOLD_DEG: f64 = 0.01;

/// Tween length for marker moves below the teleport threshold.
pub const ANIMATION_DURATION_MS: u64 = 1_000;

/// QoS requested when a subscriber does not specify one.
pub const DEFAULT_QOS: u8 = 1;

/// Configuration for marker smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingRules {
    /// Snap distance in planar degrees
    pub teleport_threshold_deg: f64,
    /// Tween duration
    pub animation_duration: Duration,
}

impl Default for SmoothingRules {
    fn default() -> Self {
        Self {
            teleport_threshold_deg: TELEPORT_THRESHOLD_DEG,
            animation_duration: Duration::from_millis(ANIMATION_DURATION_MS),
        }
    }
}
