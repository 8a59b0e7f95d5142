//! Connects dispatcher observers to the shared state.

use fleet_transport::{MessageDispatcher, Subscription};
use std::sync::Arc;
use std::time::Instant;

use crate::state::AppState;

/// Register the location, geofence and alert observers that keep `state`
/// current. The returned subscriptions unregister them.
pub fn wire_dispatcher(state: &Arc<AppState>, dispatcher: &MessageDispatcher) -> Vec<Subscription> {
    let locations = {
        let state = Arc::clone(state);
        dispatcher.on_location(move |sample| {
            state.apply_location(sample.clone(), Instant::now());
        })
    };

    let geoevents = {
        let state = Arc::clone(state);
        dispatcher.on_geoevent(move |event| {
            tracing::info!(
                vehicle_id = %event.vehicle_id,
                geofence = %event.geofence_name,
                event_type = ?event.event_type,
                "geofence crossing"
            );
            state.record_geoevent(event.clone());
        })
    };

    let alerts = {
        let state = Arc::clone(state);
        dispatcher.on_alert(move |alert| state.record_alert(alert))
    };

    vec![locations, geoevents, alerts]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use chrono::Utc;
    use fleet_core::{SourceError, TelemetryRangeSource, TelemetryRecord};
    use serde_json::json;

    struct NoSource;

    #[async_trait]
    impl TelemetryRangeSource for NoSource {
        async fn fetch_range(&self, _: &str, _: &str, _: &str) -> Result<Vec<TelemetryRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn state() -> Arc<AppState> {
        let config = Config::from_lookup(|key| {
            (key == "FLEET_BROKER_URL").then(|| "mqtt://localhost".to_string())
        })
        .unwrap();
        Arc::new(AppState::new(config, Arc::new(NoSource)))
    }

    #[test]
    fn dispatched_messages_reach_state() {
        let state = state();
        let dispatcher = Arc::clone(state.dispatcher());
        let subscriptions = wire_dispatcher(&state, &dispatcher);
        let now = Utc::now().to_rfc3339();

        let location = json!({
            "vehicleId": "D1", "latitude": 33.0, "longitude": -117.0, "altitude": 10.0,
            "speed": 1.0, "heading": 0.0, "batteryLevel": 50.0, "satelliteCount": 9,
            "timestamp": now
        });
        let geoevent = json!({
            "vehicleId": "D1", "eventType": "EXIT", "geofenceName": "Depot",
            "latitude": 33.0, "longitude": -117.0, "timestamp": now
        });
        let alert = json!({
            "vehicleId": "D1", "alertType": "LOW_BATTERY", "message": "12%",
            "timestamp": now, "priority": "HIGH"
        });

        dispatcher.handle("fleet/D1/location", location.to_string().as_bytes());
        dispatcher.handle("fleet/D1/geoevent", geoevent.to_string().as_bytes());
        dispatcher.handle("fleet/D1/alert", alert.to_string().as_bytes());
        dispatcher.handle("fleet/D1/location", br#"{"vehicleId":"D1","latitude":1}"#);

        assert_eq!(state.fleet_counts(Utc::now()).vehicles, 1);
        assert_eq!(state.geofence_counters().total_received, 1);
        assert_eq!(state.alerts_received(), 1);
        assert_eq!(dispatcher.stats().rejected, 1);

        for subscription in subscriptions {
            assert!(subscription.unregister());
        }
    }
}
