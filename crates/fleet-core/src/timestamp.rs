//! UTC timestamp parsing.
//!
//! The telemetry API emits naive strings such as `2024-05-01T12:00:00` that
//! are UTC despite lacking an offset. Reading them as local time would shift
//! every playback alignment by the host's UTC offset, so anything without an
//! explicit offset is treated as UTC here.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unparseable timestamp '{0}'")]
pub struct TimestampError(pub String);

/// Parse an ISO-8601 timestamp, assuming UTC when no offset is present.
pub fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = raw.trim();

    if has_explicit_offset(trimmed) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(parsed.with_timezone(&Utc));
        }
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Ok(parsed.with_timezone(&Utc));
        }
        return Err(TimestampError(raw.to_string()));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TimestampError(raw.to_string()))
}

/// Whether the time portion carries `Z` or a `+hh:mm`/`-hh:mm` offset.
fn has_explicit_offset(value: &str) -> bool {
    if value.ends_with('Z') || value.ends_with('z') {
        return true;
    }
    // Skip the date part so its hyphens are not mistaken for an offset sign.
    let time_part = match value.get(10..) {
        Some(rest) => rest,
        None => return false,
    };
    time_part.contains('+') || time_part.contains('-')
}

/// Serde adapter for fields that go through [`parse_utc_timestamp`].
pub fn deserialize_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_timestamp(&raw).map_err(serde::de::Error::custom)
}
