//! A simulated vehicle: location samples plus the geofence and alert
//! messages a real unit would emit along the way.

use chrono::{DateTime, Utc};
use fleet_core::{haversine_distance, AlertMessage, GeoEvent, GeoEventType, LocationSample};
use serde_json::{Map, Value};

use crate::sim::paths::TrackPath;

/// Circular geofence used to generate ENTRY/EXIT crossings.
#[derive(Debug, Clone)]
pub struct CircularFence {
    pub name: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
}

impl CircularFence {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        haversine_distance(self.center_lat, self.center_lon, lat, lon) <= self.radius_m
    }
}

/// Messages produced by one simulation step.
#[derive(Debug, Clone)]
pub struct SimStep {
    pub location: LocationSample,
    pub geoevent: Option<GeoEvent>,
    pub alert: Option<AlertMessage>,
}

pub struct SimulatedVehicle<P: TrackPath> {
    vehicle_id: String,
    path: P,
    fence: Option<CircularFence>,
    inside_fence: Option<bool>,
    battery_start: f64,
    battery_drain_per_sec: f64,
    low_battery_threshold: f64,
    low_battery_alerted: bool,
}

impl<P: TrackPath> SimulatedVehicle<P> {
    pub fn new(vehicle_id: impl Into<String>, path: P) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            path,
            fence: None,
            inside_fence: None,
            battery_start: 100.0,
            battery_drain_per_sec: 0.05,
            low_battery_threshold: 20.0,
            low_battery_alerted: false,
        }
    }

    pub fn with_fence(mut self, fence: CircularFence) -> Self {
        self.fence = Some(fence);
        self
    }

    pub fn with_battery(mut self, start: f64, drain_per_sec: f64, low_threshold: f64) -> Self {
        self.battery_start = start;
        self.battery_drain_per_sec = drain_per_sec;
        self.low_battery_threshold = low_threshold;
        self
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn battery_at(&self, elapsed_secs: f64) -> f64 {
        (self.battery_start - self.battery_drain_per_sec * elapsed_secs).clamp(0.0, 100.0)
    }

    /// Advance to `elapsed_secs` and build the messages for that instant.
    pub fn step(&mut self, elapsed_secs: f64, now: DateTime<Utc>) -> SimStep {
        let (latitude, longitude, altitude) = self.path.position(elapsed_secs);
        let battery_level = self.battery_at(elapsed_secs);

        let mut additional_fields = Map::new();
        additional_fields.insert("simulated".to_string(), Value::Bool(true));

        let location = LocationSample {
            vehicle_id: self.vehicle_id.clone(),
            latitude,
            longitude,
            altitude,
            speed: self.path.speed_mps(),
            heading: self.path.heading(elapsed_secs),
            battery_level,
            satellite_count: 12,
            timestamp: now,
            additional_fields,
        };

        let geoevent = self.fence_crossing(latitude, longitude, now);

        let alert = if !self.low_battery_alerted && battery_level < self.low_battery_threshold {
            self.low_battery_alerted = true;
            Some(AlertMessage {
                vehicle_id: self.vehicle_id.clone(),
                alert_type: "LOW_BATTERY".to_string(),
                message: format!("Battery at {:.0}%", battery_level),
                timestamp: now,
                priority: "HIGH".to_string(),
            })
        } else {
            None
        };

        SimStep {
            location,
            geoevent,
            alert,
        }
    }

    /// A crossing needs a previous inside/outside observation; the first
    /// step only establishes it.
    fn fence_crossing(&mut self, latitude: f64, longitude: f64, now: DateTime<Utc>) -> Option<GeoEvent> {
        let fence = self.fence.as_ref()?;
        let inside = fence.contains(latitude, longitude);
        let previous = self.inside_fence.replace(inside)?;
        if previous == inside {
            return None;
        }
        Some(GeoEvent {
            vehicle_id: self.vehicle_id.clone(),
            event_type: if inside {
                GeoEventType::Entry
            } else {
                GeoEventType::Exit
            },
            geofence_name: fence.name.clone(),
            latitude,
            longitude,
            timestamp: now,
        })
    }
}
