//! Fleet state store.
//!
//! Keeps the last known sample per vehicle plus a short trail of distinct
//! positions. Liveness is derived from the sample timestamp at read time and
//! never stored, so two reads at different instants may disagree without any
//! write in between. Inactive vehicles are kept until an operator removes them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use crate::models::{LatLng, LocationSample};
use crate::rules::{INACTIVITY_TIMEOUT_MS, MAX_RECENT_POSITIONS};

/// Shared liveness predicate: `now - last_update < INACTIVITY_TIMEOUT_MS`.
pub fn is_live(last_update: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_update) < Duration::milliseconds(INACTIVITY_TIMEOUT_MS)
}

/// Last known state of a single vehicle.
#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub vehicle_id: String,
    pub last_location: LocationSample,
    /// Device-reported time of `last_location`
    pub last_update: DateTime<Utc>,
    recent_positions: VecDeque<LatLng>,
}

impl FleetEntry {
    fn from_sample(sample: LocationSample) -> Self {
        let mut recent_positions = VecDeque::with_capacity(MAX_RECENT_POSITIONS);
        recent_positions.push_back(sample.position());
        Self {
            vehicle_id: sample.vehicle_id.clone(),
            last_update: sample.timestamp,
            last_location: sample,
            recent_positions,
        }
    }

    fn update(&mut self, sample: LocationSample) {
        let position = sample.position();
        if self.recent_positions.back() != Some(&position) {
            self.recent_positions.push_back(position);
            while self.recent_positions.len() > MAX_RECENT_POSITIONS {
                self.recent_positions.pop_front();
            }
        }
        self.last_update = sample.timestamp;
        self.last_location = sample;
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        is_live(self.last_update, now)
    }

    /// Distinct positions, oldest first.
    pub fn recent_positions(&self) -> &VecDeque<LatLng> {
        &self.recent_positions
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> FleetSnapshotEntry {
        FleetSnapshotEntry {
            vehicle_id: self.vehicle_id.clone(),
            last_location: self.last_location.clone(),
            last_update: self.last_update,
            is_active: self.is_active(now),
            recent_positions: self.recent_positions.iter().copied().collect(),
        }
    }
}

/// Serializable view of a [`FleetEntry`] with liveness evaluated at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSnapshotEntry {
    pub vehicle_id: String,
    pub last_location: LocationSample,
    pub last_update: DateTime<Utc>,
    pub is_active: bool,
    pub recent_positions: Vec<LatLng>,
}

/// Keyed map from vehicle id to last known state.
#[derive(Debug, Default)]
pub struct FleetStore {
    entries: HashMap<String, FleetEntry>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the entry for `sample.vehicle_id`.
    ///
    /// The latest *received* sample always wins, even if its timestamp is
    /// older than the one it replaces.
    pub fn apply_location(&mut self, sample: LocationSample) -> &FleetEntry {
        match self.entries.entry(sample.vehicle_id.clone()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.update(sample);
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(FleetEntry::from_sample(sample)),
        }
    }

    pub fn remove(&mut self, vehicle_id: &str) -> Option<FleetEntry> {
        self.entries.remove(vehicle_id)
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Entries whose liveness predicate holds at `now`.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<&FleetEntry> {
        self.entries
            .values()
            .filter(|entry| entry.is_active(now))
            .collect()
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&FleetEntry> {
        self.entries.get(vehicle_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &FleetEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted by vehicle id.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<FleetSnapshotEntry> {
        let mut snapshot: Vec<FleetSnapshotEntry> =
            self.entries.values().map(|entry| entry.snapshot(now)).collect();
        snapshot.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Map;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sample(vehicle_id: &str, lat: f64, lon: f64, timestamp: DateTime<Utc>) -> LocationSample {
        LocationSample {
            vehicle_id: vehicle_id.to_string(),
            latitude: lat,
            longitude: lon,
            altitude: 50.0,
            speed: 5.0,
            heading: 0.0,
            battery_level: 90.0,
            satellite_count: 10,
            timestamp,
            additional_fields: Map::new(),
        }
    }

    #[test]
    fn test_first_sample_creates_entry() {
        let mut store = FleetStore::new();
        let entry = store.apply_location(sample("D1", 1.0, 2.0, base_time()));
        assert_eq!(entry.vehicle_id, "D1");
        assert_eq!(entry.recent_positions().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_position_is_not_appended() {
        let mut store = FleetStore::new();
        store.apply_location(sample("D1", 1.0, 2.0, base_time()));
        store.apply_location(sample("D1", 1.0, 2.0, base_time() + Duration::seconds(1)));
        store.apply_location(sample("D1", 1.0, 2.0, base_time() + Duration::seconds(2)));

        let entry = store.get("D1").unwrap();
        assert_eq!(entry.recent_positions().len(), 1);
        assert_eq!(entry.last_update, base_time() + Duration::seconds(2));
    }

    #[test]
    fn test_recent_positions_are_capped_and_ordered() {
        let mut store = FleetStore::new();
        let total = MAX_RECENT_POSITIONS + 17;
        for i in 0..total {
            store.apply_location(sample(
                "D1",
                i as f64 * 0.001,
                0.0,
                base_time() + Duration::seconds(i as i64),
            ));
        }

        let positions = store.get("D1").unwrap().recent_positions();
        assert_eq!(positions.len(), MAX_RECENT_POSITIONS);
        let expected_first = (total - MAX_RECENT_POSITIONS) as f64 * 0.001;
        assert_eq!(positions.front().unwrap().latitude, expected_first);
        assert_eq!(positions.back().unwrap().latitude, (total - 1) as f64 * 0.001);
        assert!(positions
            .iter()
            .zip(positions.iter().skip(1))
            .all(|(a, b)| a.latitude < b.latitude));
    }

    #[test]
    fn test_returning_to_earlier_position_is_recorded() {
        let mut store = FleetStore::new();
        store.apply_location(sample("D1", 1.0, 1.0, base_time()));
        store.apply_location(sample("D1", 2.0, 2.0, base_time()));
        store.apply_location(sample("D1", 1.0, 1.0, base_time()));
        assert_eq!(store.get("D1").unwrap().recent_positions().len(), 3);
    }

    #[test]
    fn test_active_boundary() {
        let mut store = FleetStore::new();
        store.apply_location(sample("D1", 1.0, 1.0, base_time()));

        let just_inside = base_time() + Duration::milliseconds(INACTIVITY_TIMEOUT_MS - 1);
        let exactly = base_time() + Duration::milliseconds(INACTIVITY_TIMEOUT_MS);
        let just_outside = base_time() + Duration::milliseconds(INACTIVITY_TIMEOUT_MS + 1);

        assert_eq!(store.active(just_inside).len(), 1);
        assert!(store.active(exactly).is_empty());
        assert!(store.active(just_outside).is_empty());
        // Liveness is advisory: the entry is still there.
        assert!(store.get("D1").is_some());
    }

    #[test]
    fn test_out_of_order_sample_still_replaces_current() {
        let mut store = FleetStore::new();
        store.apply_location(sample("D1", 1.0, 1.0, base_time()));
        store.apply_location(sample("D1", 2.0, 2.0, base_time() - Duration::seconds(60)));

        let entry = store.get("D1").unwrap();
        assert_eq!(entry.last_location.latitude, 2.0);
        assert_eq!(entry.last_update, base_time() - Duration::seconds(60));
        assert!(!entry.is_active(base_time()));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = FleetStore::new();
        store.apply_location(sample("D1", 1.0, 1.0, base_time()));
        store.apply_location(sample("D2", 1.0, 1.0, base_time()));
        store.apply_location(sample("D3", 1.0, 1.0, base_time()));

        assert!(store.remove("D2").is_some());
        assert!(store.remove("D2").is_none());
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_evaluates_liveness_per_entry() {
        let mut store = FleetStore::new();
        store.apply_location(sample("B", 1.0, 1.0, base_time()));
        store.apply_location(sample("A", 1.0, 1.0, base_time() - Duration::minutes(5)));

        let snapshot = store.snapshot(base_time());
        assert_eq!(snapshot[0].vehicle_id, "A");
        assert!(!snapshot[0].is_active);
        assert!(snapshot[1].is_active);
    }
}
