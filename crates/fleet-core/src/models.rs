//! Wire and domain models for fleet tracking.
//!
//! Field names follow the camelCase JSON emitted by vehicles and the
//! telemetry API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::timestamp::deserialize_utc;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Live position report published on a `.../location` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub battery_level: f64,
    pub satellite_count: u32,
    #[serde(deserialize_with = "deserialize_utc")]
    pub timestamp: DateTime<Utc>,
    /// Anything else the vehicle attached to the report
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub additional_fields: Map<String, Value>,
}

impl LocationSample {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeoEventType {
    Entry,
    Exit,
}

/// Geofence boundary crossing published on a `.../geoevent` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoEvent {
    pub vehicle_id: String,
    pub event_type: GeoEventType,
    pub geofence_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(deserialize_with = "deserialize_utc")]
    pub timestamp: DateTime<Utc>,
}

/// Alert published on a `.../alert` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    pub vehicle_id: String,
    pub alert_type: String,
    pub message: String,
    #[serde(deserialize_with = "deserialize_utc")]
    pub timestamp: DateTime<Utc>,
    pub priority: String,
}

/// The three message kinds carried by the pub/sub transport.
///
/// The kind is encoded as the last topic segment, e.g. `fleet/DRONE-1/location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Location,
    GeoEvent,
    Alert,
}

impl MessageKind {
    pub const ALL: [MessageKind; 3] = [MessageKind::Location, MessageKind::GeoEvent, MessageKind::Alert];

    /// Topic suffix for this kind.
    pub fn suffix(self) -> &'static str {
        match self {
            MessageKind::Location => "location",
            MessageKind::GeoEvent => "geoevent",
            MessageKind::Alert => "alert",
        }
    }

    /// Classify a topic by its final segment. Returns `None` unless exactly
    /// one kind matches.
    pub fn classify(topic: &str) -> Option<Self> {
        let last = topic.rsplit('/').next()?;
        let mut matches = Self::ALL.into_iter().filter(|kind| kind.suffix() == last);
        let kind = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Normalized playback sample built from a telemetry range query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPoint {
    pub id: String,
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub battery_level: f64,
    /// Always UTC; see [`crate::timestamp::parse_utc_timestamp`]
    pub timestamp: DateTime<Utc>,
}

impl TelemetryPoint {
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_by_last_segment() {
        assert_eq!(MessageKind::classify("fleet/D1/location"), Some(MessageKind::Location));
        assert_eq!(MessageKind::classify("fleet/D1/geoevent"), Some(MessageKind::GeoEvent));
        assert_eq!(MessageKind::classify("a/b/c/alert"), Some(MessageKind::Alert));
        assert_eq!(MessageKind::classify("location"), Some(MessageKind::Location));
    }

    #[test]
    fn test_classify_rejects_unknown_suffix() {
        assert_eq!(MessageKind::classify("fleet/D1/status"), None);
        assert_eq!(MessageKind::classify("fleet/location/extra"), None);
        assert_eq!(MessageKind::classify("fleet/D1/location/"), None);
        assert_eq!(MessageKind::classify(""), None);
    }

    #[test]
    fn test_location_sample_keeps_extra_fields() {
        let sample: LocationSample = serde_json::from_value(json!({
            "vehicleId": "D1",
            "latitude": 33.68,
            "longitude": -117.82,
            "altitude": 50.0,
            "speed": 10.0,
            "heading": 90.0,
            "batteryLevel": 87.5,
            "satelliteCount": 12,
            "timestamp": "2024-05-01T12:00:00Z",
            "missionId": "M-7"
        }))
        .unwrap();

        assert_eq!(sample.vehicle_id, "D1");
        assert_eq!(sample.additional_fields.get("missionId"), Some(&json!("M-7")));
    }

    #[test]
    fn test_geo_event_type_is_uppercase_on_wire() {
        let event: GeoEvent = serde_json::from_value(json!({
            "vehicleId": "D1",
            "eventType": "EXIT",
            "geofenceName": "Depot",
            "latitude": 1.0,
            "longitude": 2.0,
            "timestamp": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.event_type, GeoEventType::Exit);
    }
}
