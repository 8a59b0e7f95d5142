//! Marker smoothing frame clock.
//!
//! Advances every animating marker once per frame and broadcasts the moved
//! positions. Frames with nothing moving are not sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub async fn run_smoothing_loop(state: Arc<AppState>, frame_interval: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!(?frame_interval, "smoothing loop started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("smoothing loop shutting down");
                break;
            }
            tick = ticker.tick() => {
                let frames = state.marker_frame(tick.into_std());
                if frames.is_empty() {
                    continue;
                }
                // No receivers is fine; nobody is watching the map.
                let _ = state.tx.send(Arc::new(frames));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use chrono::Utc;
    use fleet_core::{LocationSample, SourceError, TelemetryRangeSource, TelemetryRecord};
    use serde_json::Map;

    struct NoSource;

    #[async_trait]
    impl TelemetryRangeSource for NoSource {
        async fn fetch_range(&self, _: &str, _: &str, _: &str) -> Result<Vec<TelemetryRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn sample(latitude: f64) -> LocationSample {
        LocationSample {
            vehicle_id: "D1".to_string(),
            latitude,
            longitude: -117.0,
            altitude: 0.0,
            speed: 0.0,
            heading: 0.0,
            battery_level: 100.0,
            satellite_count: 8,
            timestamp: Utc::now(),
            additional_fields: Map::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn broadcasts_frames_until_settled() {
        let config = Config::from_lookup(|key| {
            (key == "FLEET_BROKER_URL").then(|| "mqtt://localhost".to_string())
        })
        .unwrap();
        let state = Arc::new(AppState::new(config, Arc::new(NoSource)));
        let mut rx = state.tx.subscribe();

        let now = tokio::time::Instant::now().into_std();
        state.apply_location(sample(33.0), now);
        state.apply_location(sample(33.002), now);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_smoothing_loop(
            state.clone(),
            Duration::from_millis(100),
            shutdown.clone(),
        ));

        let mut last = None;
        for _ in 0..11 {
            let batch = rx.recv().await.unwrap();
            assert_eq!(batch.len(), 1);
            last = Some(batch[0].clone());
        }
        let last = last.unwrap();
        assert!((last.position.latitude - 33.002).abs() < 1e-9);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
