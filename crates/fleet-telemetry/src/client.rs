//! Telemetry API HTTP client.

use async_trait::async_trait;
use fleet_core::{SourceError, TelemetryRangeSource, TelemetryRecord};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryApiError {
    #[error("telemetry request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telemetry API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode telemetry response: {0}")]
    Decode(String),
    #[error("invalid telemetry API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// HTTP client for the telemetry service.
#[derive(Clone)]
pub struct TelemetryApiClient {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl TelemetryApiClient {
    /// `base_url` is the API root, e.g. `http://localhost:8080/api`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TelemetryApiError> {
        let raw = base_url.into();
        let base_url = Url::parse(raw.trim_end_matches('/')).map_err(|err| TelemetryApiError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TelemetryApiError::InvalidUrl {
                url: raw,
                reason: "not a base URL".to_string(),
            });
        }

        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            base_url,
            auth_token: token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// The vehicle id is one percent-encoded path segment.
    fn range_url(&self, vehicle_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["telemetry", "vehicle", vehicle_id, "range"]);
        }
        url
    }

    /// `GET /telemetry/vehicle/{id}/range?startDate=&endDate=`
    pub async fn fetch_vehicle_range(
        &self,
        vehicle_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TelemetryRecord>, TelemetryApiError> {
        let url = self.range_url(vehicle_id);
        let mut request = self
            .client
            .get(url)
            .query(&[("startDate", start), ("endDate", end)]);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryApiError::Status { status, body });
        }

        let body = response.bytes().await?;
        let records: Vec<TelemetryRecord> =
            serde_json::from_slice(&body).map_err(|err| TelemetryApiError::Decode(err.to_string()))?;

        tracing::debug!(
            vehicle_id = %vehicle_id,
            records = records.len(),
            start = %start,
            end = %end,
            "fetched telemetry range"
        );
        Ok(records)
    }
}

#[async_trait]
impl TelemetryRangeSource for TelemetryApiClient {
    async fn fetch_range(
        &self,
        vehicle_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TelemetryRecord>, SourceError> {
        Ok(self.fetch_vehicle_range(vehicle_id, start, end).await?)
    }
}
