//! In-memory state for the live map and playback sessions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fleet_core::{
    AlertMessage, FleetSnapshotEntry, FleetStore, GeoEvent, GeofenceCounters, GeofenceEventLog,
    LocationSample, MarkerFrame, MarkerLayer, PlaybackSession, PlaybackWindow,
    TelemetryRangeSource,
};
use fleet_transport::{ConnectionStatus, MessageDispatcher, TransportClient};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast;

use crate::cache::{prune_cache, CacheEntry};
use crate::config::Config;

/// Smoothed marker positions produced by one frame.
pub type MarkerBatch = Arc<Vec<MarkerFrame>>;

const MARKER_CHANNEL_CAPACITY: usize = 256;

pub type SharedSession = Arc<tokio::sync::Mutex<PlaybackSession>>;

/// A playback session and the last time a request reached it.
struct PlaybackSlot {
    session: SharedSession,
    touched_at: DateTime<Utc>,
}

impl CacheEntry for PlaybackSlot {
    fn touched_at(&self) -> DateTime<Utc> {
        self.touched_at
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FleetCounts {
    pub vehicles: usize,
    pub active: usize,
}

/// Application state shared by the HTTP handlers, dispatcher observers and loops.
pub struct AppState {
    config: Config,
    fleet: Mutex<FleetStore>,
    geofence_log: Mutex<GeofenceEventLog>,
    markers: Mutex<MarkerLayer>,
    sessions: DashMap<String, PlaybackSlot>,
    range_source: Arc<dyn TelemetryRangeSource>,
    dispatcher: Arc<MessageDispatcher>,
    transport: OnceLock<TransportClient>,
    alerts_received: AtomicU64,
    pub tx: broadcast::Sender<MarkerBatch>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new(config: Config, range_source: Arc<dyn TelemetryRangeSource>) -> Self {
        let (tx, _) = broadcast::channel(MARKER_CHANNEL_CAPACITY);
        Self {
            config,
            fleet: Mutex::new(FleetStore::new()),
            geofence_log: Mutex::new(GeofenceEventLog::default()),
            markers: Mutex::new(MarkerLayer::default()),
            sessions: DashMap::new(),
            range_source,
            dispatcher: Arc::new(MessageDispatcher::new()),
            transport: OnceLock::new(),
            alerts_received: AtomicU64::new(0),
            tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    /// Remember the live transport so health checks can report on it.
    pub fn attach_transport(&self, transport: TransportClient) {
        if self.transport.set(transport).is_err() {
            tracing::warn!("transport already attached; ignoring");
        }
    }

    pub fn transport_status(&self) -> Option<ConnectionStatus> {
        self.transport.get().map(TransportClient::status)
    }

    // --- live fleet -------------------------------------------------------

    /// Store the sample and retarget the vehicle's marker.
    pub fn apply_location(&self, sample: LocationSample, now: Instant) {
        let vehicle_id = sample.vehicle_id.clone();
        let position = sample.position();
        lock(&self.fleet).apply_location(sample);
        lock(&self.markers).set_target(&vehicle_id, position, now);
    }

    pub fn fleet_snapshot(&self, now: DateTime<Utc>) -> Vec<FleetSnapshotEntry> {
        lock(&self.fleet).snapshot(now)
    }

    pub fn active_fleet(&self, now: DateTime<Utc>) -> Vec<FleetSnapshotEntry> {
        let fleet = lock(&self.fleet);
        let mut active: Vec<FleetSnapshotEntry> = fleet
            .active(now)
            .into_iter()
            .map(|entry| entry.snapshot(now))
            .collect();
        active.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        active
    }

    pub fn fleet_counts(&self, now: DateTime<Utc>) -> FleetCounts {
        let fleet = lock(&self.fleet);
        FleetCounts {
            vehicles: fleet.len(),
            active: fleet.active(now).len(),
        }
    }

    /// Operator removal of one vehicle. Its marker goes with it.
    pub fn remove_vehicle(&self, vehicle_id: &str) -> bool {
        let removed = lock(&self.fleet).remove(vehicle_id).is_some();
        lock(&self.markers).remove(vehicle_id);
        removed
    }

    pub fn clear_fleet(&self) -> usize {
        let cleared = lock(&self.fleet).clear();
        lock(&self.markers).clear();
        cleared
    }

    // --- markers ----------------------------------------------------------

    pub fn marker_frame(&self, now: Instant) -> Vec<MarkerFrame> {
        lock(&self.markers).frame(now)
    }

    pub fn marker_positions(&self, now: Instant) -> Vec<MarkerFrame> {
        lock(&self.markers).positions(now)
    }

    // --- geofence events --------------------------------------------------

    pub fn record_geoevent(&self, event: GeoEvent) {
        lock(&self.geofence_log).record(event);
    }

    pub fn geoevents(&self, vehicle_id: Option<&str>) -> Vec<GeoEvent> {
        let log = lock(&self.geofence_log);
        match vehicle_id {
            Some(vehicle_id) => log.by_vehicle(vehicle_id).into_iter().cloned().collect(),
            None => log.events().cloned().collect(),
        }
    }

    pub fn geofence_counters(&self) -> GeofenceCounters {
        lock(&self.geofence_log).counters()
    }

    pub fn mark_geoevents_read(&self) -> GeofenceCounters {
        let mut log = lock(&self.geofence_log);
        log.mark_read();
        log.counters()
    }

    // --- alerts -----------------------------------------------------------

    pub fn record_alert(&self, alert: &AlertMessage) {
        self.alerts_received.fetch_add(1, Ordering::Relaxed);
        let urgent = matches!(alert.priority.to_ascii_uppercase().as_str(), "HIGH" | "CRITICAL");
        if urgent {
            tracing::warn!(
                vehicle_id = %alert.vehicle_id,
                alert_type = %alert.alert_type,
                priority = %alert.priority,
                message = %alert.message,
                "vehicle alert"
            );
        } else {
            tracing::info!(
                vehicle_id = %alert.vehicle_id,
                alert_type = %alert.alert_type,
                priority = %alert.priority,
                "vehicle alert"
            );
        }
    }

    pub fn alerts_received(&self) -> u64 {
        self.alerts_received.load(Ordering::Relaxed)
    }

    // --- playback sessions ------------------------------------------------

    pub fn open_playback(&self, vehicle_id: &str, window: PlaybackWindow) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = PlaybackSession::new(Arc::clone(&self.range_source), vehicle_id, window);
        self.sessions.insert(
            session_id.clone(),
            PlaybackSlot {
                session: Arc::new(tokio::sync::Mutex::new(session)),
                touched_at: Utc::now(),
            },
        );
        tracing::debug!(session_id = %session_id, vehicle_id = %vehicle_id, "playback session opened");
        session_id
    }

    /// Look up a session and mark it as in use.
    pub fn playback(&self, session_id: &str) -> Option<SharedSession> {
        let mut slot = self.sessions.get_mut(session_id)?;
        slot.touched_at = Utc::now();
        Some(Arc::clone(&slot.session))
    }

    /// Discard a session and its loaded samples.
    pub fn close_playback(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn playback_count(&self) -> usize {
        self.sessions.len()
    }

    /// Discard sessions left idle past the configured TTL, then the least
    /// recently used beyond the session cap. Returns how many were dropped.
    pub fn prune_playback(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        prune_cache(
            &self.sessions,
            self.config.playback_max_sessions,
            self.config.playback_session_ttl,
            now,
        );
        before.saturating_sub(self.sessions.len())
    }
}
