//! Playback telemetry synchronizer.
//!
//! A session loads one vehicle's telemetry for a time window exactly once,
//! then follows the video player's clock, reporting a new sample only when
//! the closest one actually changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::align::TelemetryTrack;
use crate::models::TelemetryPoint;
use crate::records::{normalize_records, TelemetryRecord};

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches historical telemetry for a vehicle and window.
#[async_trait]
pub trait TelemetryRangeSource: Send + Sync {
    async fn fetch_range(
        &self,
        vehicle_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TelemetryRecord>, SourceError>;
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to load telemetry for {vehicle_id}: {source}")]
    Fetch {
        vehicle_id: String,
        #[source]
        source: SourceError,
    },
}

/// ISO-8601 bounds passed through to the range query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackWindow {
    pub start: String,
    pub end: String,
}

impl PlaybackWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoadState {
    NotLoaded,
    /// A load was started. Seen through `&mut self` this means the previous
    /// load future was dropped before finishing.
    Loading,
    Loaded(TelemetryTrack),
    Failed(String),
}

/// Serializable status for the player UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackView {
    pub vehicle_id: String,
    pub loading: bool,
    pub error: Option<String>,
    pub index: Option<usize>,
    pub total: usize,
    pub current: Option<TelemetryPoint>,
}

pub struct PlaybackSession {
    source: Arc<dyn TelemetryRangeSource>,
    vehicle_id: String,
    window: PlaybackWindow,
    load: LoadState,
    selected: Option<usize>,
}

impl PlaybackSession {
    pub fn new(
        source: Arc<dyn TelemetryRangeSource>,
        vehicle_id: impl Into<String>,
        window: PlaybackWindow,
    ) -> Self {
        Self {
            source,
            vehicle_id: vehicle_id.into(),
            window,
            load: LoadState::NotLoaded,
            selected: None,
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn window(&self) -> &PlaybackWindow {
        &self.window
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    /// Fetch, normalize and sort the window's samples. Returns the sample count.
    ///
    /// Failures are kept as a user-visible error string; nothing retries.
    pub async fn load_range(&mut self) -> Result<usize, PlaybackError> {
        self.load = LoadState::Loading;
        self.selected = None;

        let records = match self
            .source
            .fetch_range(&self.vehicle_id, &self.window.start, &self.window.end)
            .await
        {
            Ok(records) => records,
            Err(source) => {
                let err = PlaybackError::Fetch {
                    vehicle_id: self.vehicle_id.clone(),
                    source,
                };
                tracing::warn!(vehicle_id = %self.vehicle_id, error = %err, "playback range load failed");
                self.load = LoadState::Failed(err.to_string());
                return Err(err);
            }
        };

        let track = TelemetryTrack::from_points(normalize_records(&self.vehicle_id, records));
        let count = track.len();
        tracing::debug!(
            vehicle_id = %self.vehicle_id,
            samples = count,
            start = %self.window.start,
            end = %self.window.end,
            "playback range loaded"
        );
        self.load = LoadState::Loaded(track);
        Ok(count)
    }

    /// Align to `video_elapsed_secs`. Returns the newly selected sample, or
    /// `None` when nothing is loaded or the selection did not change.
    pub fn sync_to(&mut self, video_elapsed_secs: f64) -> Option<&TelemetryPoint> {
        let LoadState::Loaded(track) = &self.load else {
            return None;
        };
        let index = track.closest_to_video_time(video_elapsed_secs)?;
        if self.selected == Some(index) {
            return None;
        }
        self.selected = Some(index);
        track.get(index)
    }

    /// Handle a player `timeupdate`. Nothing happens until the duration is
    /// known (`duration_secs > 0`); the first such tick triggers the load.
    pub async fn on_timeupdate(
        &mut self,
        current_secs: f64,
        duration_secs: f64,
    ) -> Option<&TelemetryPoint> {
        if !(duration_secs > 0.0) {
            return None;
        }
        if matches!(self.load, LoadState::NotLoaded | LoadState::Loading) {
            // The error is already captured in the load state.
            let _ = self.load_range().await;
        }
        self.sync_to(current_secs)
    }

    pub fn current(&self) -> Option<&TelemetryPoint> {
        match (&self.load, self.selected) {
            (LoadState::Loaded(track), Some(index)) => track.get(index),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.load {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn points(&self) -> &[TelemetryPoint] {
        match &self.load {
            LoadState::Loaded(track) => track.points(),
            _ => &[],
        }
    }

    pub fn view(&self) -> PlaybackView {
        PlaybackView {
            vehicle_id: self.vehicle_id.clone(),
            loading: matches!(self.load, LoadState::Loading),
            error: self.error().map(str::to_string),
            index: self.selected,
            total: self.points().len(),
            current: self.current().cloned(),
        }
    }
}
