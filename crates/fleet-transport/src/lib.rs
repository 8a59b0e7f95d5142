//! Fleet transport - pub/sub plumbing for live telemetry
//!
//! [`TransportClient`] owns the broker connection and knows nothing about the
//! payloads. [`MessageDispatcher`] turns raw publishes into typed domain
//! messages and fans them out to observers.

mod backoff;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod observers;
pub mod options;
pub mod topic;

pub use client::{ConnectionStatus, DisconnectReason, IncomingMessage, Payload, TransportClient};
pub use dispatcher::{DispatchOutcome, DispatcherStats, MessageDispatcher, RejectReason};
pub use error::TransportError;
pub use observers::{NotifyReport, ObserverRegistry, ObserverToken, Subscription};
pub use options::{QosLevel, SubscribeOptions, TransportOptions};
pub use topic::{subscription_filter, topic_for};
