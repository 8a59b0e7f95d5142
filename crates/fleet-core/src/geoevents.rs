//! Bounded log of geofence boundary crossings.
//!
//! The log is capped but the counters are not: `total_received` only ever
//! grows, so "anything new since I last looked" can be answered by comparing
//! totals instead of inspecting the (truncated) log.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::models::GeoEvent;
use crate::rules::MAX_GEOFENCE_EVENTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceCounters {
    pub unread_count: u64,
    pub total_received: u64,
    pub retained: usize,
}

/// Newest-first ring buffer of [`GeoEvent`]s.
#[derive(Debug)]
pub struct GeofenceEventLog {
    events: VecDeque<GeoEvent>,
    capacity: usize,
    unread_count: u64,
    total_received: u64,
}

impl Default for GeofenceEventLog {
    fn default() -> Self {
        Self::new(MAX_GEOFENCE_EVENTS)
    }
}

impl GeofenceEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            unread_count: 0,
            total_received: 0,
        }
    }

    /// Prepend `event`, evicting the oldest entries beyond capacity.
    pub fn record(&mut self, event: GeoEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
        self.unread_count += 1;
        self.total_received += 1;
    }

    /// Reset the unread counter. Events and totals are untouched.
    pub fn mark_read(&mut self) {
        self.unread_count = 0;
    }

    /// Events for one vehicle among those still retained, newest first.
    pub fn by_vehicle(&self, vehicle_id: &str) -> Vec<&GeoEvent> {
        self.events
            .iter()
            .filter(|event| event.vehicle_id == vehicle_id)
            .collect()
    }

    /// Retained events, newest first.
    pub fn events(&self) -> impl Iterator<Item = &GeoEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    pub fn counters(&self) -> GeofenceCounters {
        GeofenceCounters {
            unread_count: self.unread_count,
            total_received: self.total_received,
            retained: self.events.len(),
        }
    }
}
