//! Connection and subscription options.

use fleet_core::rules::DEFAULT_QOS;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TransportError;

const DEFAULT_PORT: u16 = 1883;

/// Delivery guarantee requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosLevel {
    /// 0: fire and forget
    AtMostOnce,
    /// 1: acknowledged, may duplicate
    AtLeastOnce,
    /// 2: four-way handshake
    ExactlyOnce,
}

impl Default for QosLevel {
    fn default() -> Self {
        // DEFAULT_QOS is a valid level.
        Self::from_level(DEFAULT_QOS).unwrap_or(QosLevel::AtLeastOnce)
    }
}

impl QosLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(QosLevel::AtMostOnce),
            1 => Some(QosLevel::AtLeastOnce),
            2 => Some(QosLevel::ExactlyOnce),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl From<QosLevel> for QoS {
    fn from(level: QosLevel) -> Self {
        match level {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
            QosLevel::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

impl From<QoS> for QosLevel {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => QosLevel::AtMostOnce,
            QoS::AtLeastOnce => QosLevel::AtLeastOnce,
            QoS::ExactlyOnce => QosLevel::ExactlyOnce,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub qos: QosLevel,
}

impl SubscribeOptions {
    pub fn qos(qos: QosLevel) -> Self {
        Self { qos }
    }
}

/// Everything needed to open the broker connection.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// Upper bound on waiting for the first CONNACK
    pub connect_timeout: Duration,
    /// Pause between event-loop polls after the link drops
    pub repoll_delay: Duration,
    pub repoll_delay_max: Duration,
    /// Capacity of the request channel between client and event loop
    pub channel_capacity: usize,
}

impl TransportOptions {
    /// Build options from `mqtt://host:port`, `tcp://host:port` or `host[:port]`.
    pub fn from_url(url: &str, client_id: impl Into<String>) -> Result<Self, TransportError> {
        let (host, port) = parse_broker_url(url)?;
        Ok(Self {
            host: host.to_string(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            repoll_delay: Duration::from_millis(500),
            repoll_delay_max: Duration::from_secs(30),
            channel_capacity: 100,
        })
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Split a broker URL into host and port.
fn parse_broker_url(url: &str) -> Result<(&str, u16), TransportError> {
    let trimmed = url.trim();
    let stripped = trimmed
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://")
        .trim_end_matches('/');

    let parts: Vec<&str> = stripped.split(':').collect();
    let (host, port) = match parts.as_slice() {
        [host] => (*host, DEFAULT_PORT),
        [host, port] => {
            let port = port
                .parse::<u16>()
                .map_err(|_| TransportError::InvalidBrokerUrl(url.to_string()))?;
            (*host, port)
        }
        _ => return Err(TransportError::InvalidBrokerUrl(url.to_string())),
    };

    if host.is_empty() {
        return Err(TransportError::InvalidBrokerUrl(url.to_string()));
    }
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_without_scheme() {
        let (host, port) = parse_broker_url("broker.example.com:8883").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("tcp://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_missing_broker_url_is_rejected() {
        assert!(TransportOptions::from_url("", "c").is_err());
        assert!(TransportOptions::from_url("   ", "c").is_err());
        assert!(TransportOptions::from_url("mqtt://", "c").is_err());
        assert!(TransportOptions::from_url("mqtt://host:notaport", "c").is_err());
        assert!(TransportOptions::from_url("a:b:c", "c").is_err());
    }

    #[test]
    fn test_default_qos_is_at_least_once() {
        assert_eq!(SubscribeOptions::default().qos, QosLevel::AtLeastOnce);
        assert_eq!(QosLevel::from_level(3), None);
        assert_eq!(QosLevel::from_level(2).map(QosLevel::level), Some(2));
    }
}
