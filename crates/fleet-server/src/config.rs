//! Server configuration from environment.

use fleet_core::rules::DEFAULT_QOS;
use fleet_transport::QosLevel;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("FLEET_BROKER_URL is required")]
    MissingBrokerUrl,
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub broker_url: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub default_qos: QosLevel,
    pub telemetry_api_url: String,
    pub telemetry_api_token: Option<String>,
    /// Marker smoothing frame clock
    pub frame_interval: Duration,
    /// `None` keeps the range cache in memory only
    pub range_cache_path: Option<PathBuf>,
    pub range_cache_max_entries: usize,
    pub range_cache_max_age: Duration,
    /// Playback sessions idle longer than this are discarded
    pub playback_session_ttl: Duration,
    pub playback_max_sessions: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let broker_url = get("FLEET_BROKER_URL").ok_or(ConfigError::MissingBrokerUrl)?;

        let default_qos = match get("FLEET_DEFAULT_QOS") {
            Some(raw) => raw
                .parse::<u8>()
                .ok()
                .and_then(QosLevel::from_level)
                .ok_or(ConfigError::Invalid {
                    key: "FLEET_DEFAULT_QOS",
                    value: raw,
                })?,
            None => QosLevel::from_level(DEFAULT_QOS).unwrap_or_default(),
        };

        Ok(Self {
            server_port: parse_or(get("FLEET_PORT"), "FLEET_PORT", 3000)?,
            broker_url,
            client_id: get("FLEET_CLIENT_ID").unwrap_or_else(|| "fleet-server".to_string()),
            topic_prefix: get("FLEET_TOPIC_PREFIX").unwrap_or_else(|| "fleet".to_string()),
            default_qos,
            telemetry_api_url: get("TELEMETRY_API_URL")
                .unwrap_or_else(|| "http://localhost:8080/api".to_string()),
            telemetry_api_token: get("TELEMETRY_API_TOKEN"),
            frame_interval: Duration::from_millis(parse_or(
                get("FLEET_FRAME_INTERVAL_MS"),
                "FLEET_FRAME_INTERVAL_MS",
                16u64,
            )?
            .max(1)),
            range_cache_path: match lookup("FLEET_RANGE_CACHE_PATH") {
                // Explicitly blank disables persistence.
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(PathBuf::from(value.trim())),
                None => Some(PathBuf::from("data/range_cache.json")),
            },
            range_cache_max_entries: parse_or(
                get("FLEET_RANGE_CACHE_MAX_ENTRIES"),
                "FLEET_RANGE_CACHE_MAX_ENTRIES",
                32,
            )?,
            range_cache_max_age: Duration::from_secs(parse_or(
                get("FLEET_RANGE_CACHE_MAX_AGE_SECS"),
                "FLEET_RANGE_CACHE_MAX_AGE_SECS",
                3600,
            )?),
            playback_session_ttl: Duration::from_secs(parse_or(
                get("FLEET_PLAYBACK_SESSION_TTL_SECS"),
                "FLEET_PLAYBACK_SESSION_TTL_SECS",
                1800,
            )?),
            playback_max_sessions: parse_or(
                get("FLEET_PLAYBACK_MAX_SESSIONS"),
                "FLEET_PLAYBACK_MAX_SESSIONS",
                256,
            )?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_broker_url_is_fatal() {
        assert_eq!(config_from(&[]).unwrap_err(), ConfigError::MissingBrokerUrl);
        assert_eq!(
            config_from(&[("FLEET_BROKER_URL", "  ")]).unwrap_err(),
            ConfigError::MissingBrokerUrl
        );
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("FLEET_BROKER_URL", "mqtt://broker:1883")]).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.client_id, "fleet-server");
        assert_eq!(config.topic_prefix, "fleet");
        assert_eq!(config.default_qos, QosLevel::AtLeastOnce);
        assert_eq!(config.frame_interval, Duration::from_millis(16));
        assert_eq!(config.range_cache_path, Some(PathBuf::from("data/range_cache.json")));
        assert_eq!(config.range_cache_max_entries, 32);
        assert_eq!(config.playback_session_ttl, Duration::from_secs(1800));
        assert_eq!(config.playback_max_sessions, 256);
        assert!(config.telemetry_api_token.is_none());
    }

    #[test]
    fn overrides_and_validation() {
        let config = config_from(&[
            ("FLEET_BROKER_URL", "broker"),
            ("FLEET_PORT", "8088"),
            ("FLEET_DEFAULT_QOS", "2"),
            ("FLEET_RANGE_CACHE_PATH", ""),
        ])
        .unwrap();
        assert_eq!(config.server_port, 8088);
        assert_eq!(config.default_qos, QosLevel::ExactlyOnce);
        assert!(config.range_cache_path.is_none());

        assert!(matches!(
            config_from(&[("FLEET_BROKER_URL", "broker"), ("FLEET_DEFAULT_QOS", "3")]),
            Err(ConfigError::Invalid { key: "FLEET_DEFAULT_QOS", .. })
        ));
        assert!(matches!(
            config_from(&[("FLEET_BROKER_URL", "broker"), ("FLEET_PORT", "http")]),
            Err(ConfigError::Invalid { key: "FLEET_PORT", .. })
        ));
    }
}
