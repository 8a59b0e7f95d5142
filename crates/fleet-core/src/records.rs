//! API-shaped telemetry records and their normalization into [`TelemetryPoint`]s.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::TelemetryPoint;
use crate::timestamp::parse_utc_timestamp;

/// One row of `GET /telemetry/vehicle/{id}/range`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, alias = "droneId")]
    pub vehicle_id: Option<String>,
    /// Often naive (no offset) even though it is UTC
    pub timestamp: String,
    pub location: RecordLocation,
    #[serde(default)]
    pub metrics: RecordMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetrics {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub battery_level: f64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub signal_strength: Option<f64>,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Flatten API records into playback samples for `vehicle_id`.
///
/// Records whose timestamp cannot be parsed are dropped with a warning.
/// Output order follows input order; sorting is the track's job.
pub fn normalize_records(vehicle_id: &str, records: Vec<TelemetryRecord>) -> Vec<TelemetryPoint> {
    records
        .into_iter()
        .filter_map(|record| {
            let timestamp = match parse_utc_timestamp(&record.timestamp) {
                Ok(timestamp) => timestamp,
                Err(err) => {
                    tracing::warn!(
                        vehicle_id = %vehicle_id,
                        record_id = %record.id,
                        error = %err,
                        "dropping telemetry record"
                    );
                    return None;
                }
            };
            Some(TelemetryPoint {
                id: record.id,
                vehicle_id: record.vehicle_id.unwrap_or_else(|| vehicle_id.to_string()),
                latitude: record.location.latitude,
                longitude: record.location.longitude,
                altitude: record.location.altitude,
                speed: record.metrics.speed,
                heading: record.metrics.heading,
                battery_level: record.metrics.battery_level,
                timestamp,
            })
        })
        .collect()
}
