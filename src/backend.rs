use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::auth::BearerToken;
use crate::config::BackendConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::types::{Coordinates, ParkingSpot, ReportKind};

/// Transport-level failures talking to the spots backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Credential rejected by backend")]
    Unauthorized,

    #[error("Backend refused the request")]
    Forbidden,

    #[error("Rate limited by backend")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Network timeout")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unreadable response: {0}")]
    Decode(String),
}

/// A spot report on its way to the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotReport {
    pub kind: ReportKind,
    pub coordinates: Coordinates,
}

/// Spots backend contract. Every call carries the caller's token.
#[async_trait]
pub trait SpotsBackend: Send + Sync {
    async fn nearby_spots(
        &self,
        token: &BearerToken,
        around: Coordinates,
    ) -> Result<Vec<ParkingSpot>, BackendError>;

    async fn submit_report(
        &self,
        token: &BearerToken,
        report: &SpotReport,
    ) -> Result<(), BackendError>;

    async fn confirm_spot(&self, token: &BearerToken, spot_id: i64) -> Result<(), BackendError>;

    async fn flag_spot(&self, token: &BearerToken, spot_id: i64) -> Result<(), BackendError>;
}

#[derive(Serialize)]
struct ReportSpotBody {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize)]
struct ParkingEventBody {
    #[serde(rename = "type")]
    kind: ReportKind,
    latitude: f64,
    longitude: f64,
}

/// HTTP client for the spots backend
///
/// # Endpoints
/// - `GET  /nearby-spots?latitude=<f>&longitude=<f>`
/// - `POST /report-spot {latitude, longitude}` (manual reports)
/// - `POST /parking-event {type: "parked", latitude, longitude}` (detected parks)
/// - `POST /confirm-spot/<id>`, `POST /report-fake/<id>`
///
/// The token goes in the `Authorization` header, bare unless an
/// `auth_scheme` is configured.
pub struct HttpSpotsBackend {
    client: reqwest::Client,
    base_url: String,
    auth_scheme: Option<String>,
}

impl HttpSpotsBackend {
    pub fn new(config: &BackendConfig) -> TrackerResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| TrackerError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpSpotsBackend {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorization(&self, token: &BearerToken) -> String {
        match &self.auth_scheme {
            Some(scheme) => format!("{} {}", scheme, token.as_str()),
            None => token.as_str().to_string(),
        }
    }

    async fn send(
        &self,
        token: &BearerToken,
        request: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .send()
            .await
            .map_err(classify)?;

        check_status(response.status())?;
        Ok(response)
    }
}

fn classify(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout
    } else if error.is_decode() {
        BackendError::Decode(error.to_string())
    } else {
        BackendError::Network(error.to_string())
    }
}

fn check_status(status: StatusCode) -> Result<(), BackendError> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized,
        StatusCode::FORBIDDEN => BackendError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited,
        other => BackendError::Http(other.as_u16()),
    })
}

#[async_trait]
impl SpotsBackend for HttpSpotsBackend {
    async fn nearby_spots(
        &self,
        token: &BearerToken,
        around: Coordinates,
    ) -> Result<Vec<ParkingSpot>, BackendError> {
        let request = self.client.get(self.url("nearby-spots")).query(&[
            ("latitude", around.latitude),
            ("longitude", around.longitude),
        ]);

        let response = self.send(token, request).await?;
        let body = response.text().await.map_err(classify)?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn submit_report(
        &self,
        token: &BearerToken,
        report: &SpotReport,
    ) -> Result<(), BackendError> {
        let Coordinates {
            latitude,
            longitude,
        } = report.coordinates;

        let request = match report.kind {
            ReportKind::Manual => self
                .client
                .post(self.url("report-spot"))
                .json(&ReportSpotBody {
                    latitude,
                    longitude,
                }),
            ReportKind::Parked => self
                .client
                .post(self.url("parking-event"))
                .json(&ParkingEventBody {
                    kind: ReportKind::Parked,
                    latitude,
                    longitude,
                }),
        };

        self.send(token, request).await?;
        Ok(())
    }

    async fn confirm_spot(&self, token: &BearerToken, spot_id: i64) -> Result<(), BackendError> {
        let request = self.client.post(self.url(&format!("confirm-spot/{}", spot_id)));
        self.send(token, request).await?;
        Ok(())
    }

    async fn flag_spot(&self, token: &BearerToken, spot_id: i64) -> Result<(), BackendError> {
        let request = self.client.post(self.url(&format!("report-fake/{}", spot_id)));
        self.send(token, request).await?;
        Ok(())
    }
}
