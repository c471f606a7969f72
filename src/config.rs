use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{TrackerError, TrackerResult};

/// Widest averaging window the detector accepts
pub const MAX_DETECTOR_WINDOW: usize = 64;

/// Speed thresholds for park detection (m/s, as reported by the location provider)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Speed the vehicle must have exceeded before a stop counts as parking
    pub high_speed_threshold: f64,
    /// Speed below which the vehicle is considered stopped
    pub low_speed_threshold: f64,
    /// Samples averaged on each side of the comparison (1 = two-sample edge)
    pub window: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            high_speed_threshold: 5.0,
            low_speed_threshold: 1.0,
            window: 1,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if !self.high_speed_threshold.is_finite() || !self.low_speed_threshold.is_finite() {
            return Err(TrackerError::InvalidConfig(
                "speed thresholds must be finite".to_string(),
            ));
        }
        if self.low_speed_threshold >= self.high_speed_threshold {
            return Err(TrackerError::InvalidConfig(format!(
                "low speed threshold ({}) must be below high speed threshold ({})",
                self.low_speed_threshold, self.high_speed_threshold
            )));
        }
        if self.window == 0 {
            return Err(TrackerError::InvalidConfig(
                "detector window must be at least 1 sample".to_string(),
            ));
        }
        if self.window > MAX_DETECTOR_WINDOW {
            return Err(TrackerError::InvalidConfig(format!(
                "detector window ({}) must not exceed {} samples",
                self.window, MAX_DETECTOR_WINDOW
            )));
        }
        Ok(())
    }
}

/// Requested fix quality for a location watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    High,
    Balanced,
    Low,
}

/// Parameters handed to the location provider when subscribing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub accuracy: Accuracy,
    /// Minimum movement between delivered fixes
    pub min_distance_m: f64,
    /// Minimum time between delivered fixes
    pub min_interval_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            min_distance_m: 10.0,
            min_interval_ms: 1000,
        }
    }
}

impl WatchOptions {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Spots backend endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Upper bound for every backend call
    pub timeout_secs: u64,
    /// Prefix for the Authorization header value; `None` sends the bare token
    pub auth_scheme: Option<String>,
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 10,
            auth_scheme: None,
            user_agent: format!("parking_tracker_rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(TrackerError::InvalidConfig("base_url is empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level tracker configuration
///
/// Every section falls back to its defaults, so a config file only needs
/// the values a deployment wants to change:
///
/// ```json
/// { "detector": { "high_speed_threshold": 6.5 }, "backend": { "base_url": "https://parking.example" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub detector: DetectorConfig,
    pub watch: WatchOptions,
    pub backend: BackendConfig,
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: TrackerConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        self.detector.validate()?;
        self.backend.validate()
    }
}
