//! Fail-closed translation of raw publishes into domain messages.
//!
//! `handle` never returns an error: payloads that are not JSON, topics that
//! do not name exactly one known kind, and messages missing required fields
//! are logged and dropped. Everything else is fanned out to the observers of
//! its kind.

use fleet_core::{AlertMessage, GeoEvent, LocationSample, MessageKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::client::TransportClient;
use crate::observers::{NotifyReport, ObserverRegistry, Subscription};

/// Why a message was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownTopic,
    InvalidJson(String),
    InvalidPayload { kind: MessageKind, detail: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownTopic => f.write_str("topic does not match a known message kind"),
            RejectReason::InvalidJson(detail) => write!(f, "payload is not valid JSON: {}", detail),
            RejectReason::InvalidPayload { kind, detail } => {
                write!(f, "invalid {} payload: {}", kind, detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered {
        kind: MessageKind,
        subscribers: usize,
        faulted: usize,
    },
    Rejected(RejectReason),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub delivered: u64,
    pub rejected: u64,
    pub observer_faults: u64,
}

pub struct MessageDispatcher {
    locations: ObserverRegistry<LocationSample>,
    geoevents: ObserverRegistry<GeoEvent>,
    alerts: ObserverRegistry<AlertMessage>,
    delivered: AtomicU64,
    rejected: AtomicU64,
    observer_faults: AtomicU64,
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self {
            locations: ObserverRegistry::new("location"),
            geoevents: ObserverRegistry::new("geoevent"),
            alerts: ObserverRegistry::new("alert"),
            delivered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            observer_faults: AtomicU64::new(0),
        }
    }

    pub fn on_location<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&LocationSample) + Send + Sync + 'static,
    {
        self.locations.register(observer)
    }

    pub fn on_geoevent<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&GeoEvent) + Send + Sync + 'static,
    {
        self.geoevents.register(observer)
    }

    pub fn on_alert<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&AlertMessage) + Send + Sync + 'static,
    {
        self.alerts.register(observer)
    }

    /// Route every message the client receives through this dispatcher.
    pub fn attach(self: &Arc<Self>, client: &TransportClient) -> Subscription {
        let dispatcher = Arc::clone(self);
        client.on_message(move |message| {
            dispatcher.handle(&message.topic, &message.payload);
        })
    }

    pub fn handle(&self, topic: &str, raw: &[u8]) -> DispatchOutcome {
        let outcome = self.route(topic, raw);
        match &outcome {
            DispatchOutcome::Delivered { faulted, .. } => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.observer_faults.fetch_add(*faulted as u64, Ordering::Relaxed);
            }
            DispatchOutcome::Rejected(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(topic = %topic, reason = %reason, "dropping message");
            }
        }
        outcome
    }

    fn route(&self, topic: &str, raw: &[u8]) -> DispatchOutcome {
        let Some(kind) = MessageKind::classify(topic) else {
            return DispatchOutcome::Rejected(RejectReason::UnknownTopic);
        };

        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => return DispatchOutcome::Rejected(RejectReason::InvalidJson(err.to_string())),
        };

        let report = match kind {
            MessageKind::Location => decode(kind, value).map(|sample| self.locations.notify(&sample)),
            MessageKind::GeoEvent => decode(kind, value).map(|event| self.geoevents.notify(&event)),
            MessageKind::Alert => decode(kind, value).map(|alert| self.alerts.notify(&alert)),
        };

        match report {
            Ok(NotifyReport { delivered, faulted }) => DispatchOutcome::Delivered {
                kind,
                subscribers: delivered,
                faulted,
            },
            Err(reason) => DispatchOutcome::Rejected(reason),
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            observer_faults: self.observer_faults.load(Ordering::Relaxed),
        }
    }
}

/// Structural validation: required fields present with the right primitive types.
fn decode<T: DeserializeOwned>(kind: MessageKind, value: Value) -> Result<T, RejectReason> {
    if !value.is_object() {
        return Err(RejectReason::InvalidPayload {
            kind,
            detail: "expected a JSON object".to_string(),
        });
    }
    serde_json::from_value(value).map_err(|err| RejectReason::InvalidPayload {
        kind,
        detail: err.to_string(),
    })
}
