//! Topic layout: `{prefix}/{vehicle_id}/{kind}`.

use fleet_core::MessageKind;

/// Topic a vehicle publishes `kind` messages on.
pub fn topic_for(prefix: &str, vehicle_id: &str, kind: MessageKind) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), vehicle_id, kind.suffix())
}

/// Single-level wildcard filter matching `kind` messages from every vehicle.
pub fn subscription_filter(prefix: &str, kind: MessageKind) -> String {
    format!("{}/+/{}", prefix.trim_end_matches('/'), kind.suffix())
}
