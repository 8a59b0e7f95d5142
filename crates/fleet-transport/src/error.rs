use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by [`crate::TransportClient`].
///
/// Cloneable so the same error can be returned to a caller and handed to
/// every error observer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport not initialized: connect() has not succeeded")]
    NotInitialized,

    #[error("invalid broker URL '{0}'")]
    InvalidBrokerUrl(String),

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("client request failed: {0}")]
    Client(String),

    #[error("payload serialization failed: {0}")]
    Serialize(String),
}
