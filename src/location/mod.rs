//! Location intake: the provider contract and the normalized sample stream.
//!
//! A [`LocationProvider`] is whatever actually produces fixes (the device,
//! a replayed log, a test script). [`LocationSampleSource`] wraps one and
//! turns its raw fixes into [`LocationSample`]s.

mod feed;
mod termux;

pub use feed::FixFeed;
pub use termux::TermuxLocationProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::WatchOptions;
use crate::error::{TrackerError, TrackerResult};
use crate::types::{Coordinates, LocationSample};

pub type WatchId = u64;

/// One item on a watch channel: a fix or the provider's failure
pub type FixUpdate = TrackerResult<RawFix>;
pub type FixReceiver = mpsc::UnboundedReceiver<FixUpdate>;

/// Fix as delivered by a provider, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, speed: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            accuracy: None,
            timestamp: None,
        }
    }

    /// Missing, NaN or negative speed (platform "unknown" sentinel) becomes 0.
    pub fn normalize(self) -> TrackerResult<LocationSample> {
        let coordinates = Coordinates::new(self.latitude, self.longitude);
        if !coordinates.is_valid() {
            return Err(TrackerError::LocationUnavailable(format!(
                "invalid coordinates ({}, {})",
                self.latitude, self.longitude
            )));
        }

        let speed = match self.speed {
            Some(s) if s.is_finite() && s > 0.0 => s,
            _ => 0.0,
        };

        Ok(LocationSample {
            coordinates,
            speed,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// Device location contract
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Single-shot fix
    async fn current_fix(&self) -> TrackerResult<RawFix>;

    /// Start a continuous watch; fixes arrive on the returned channel
    fn watch(&self, options: &WatchOptions) -> TrackerResult<(WatchId, FixReceiver)>;

    /// Stop a watch. Must not deliver anything for `id` once it returns.
    fn clear_watch(&self, id: WatchId);
}

/// Normalizing wrapper around a [`LocationProvider`]
#[derive(Clone)]
pub struct LocationSampleSource {
    provider: Arc<dyn LocationProvider>,
}

impl LocationSampleSource {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self { provider }
    }

    pub async fn get_once(&self) -> TrackerResult<LocationSample> {
        self.provider.current_fix().await?.normalize()
    }

    pub fn watch(&self, options: &WatchOptions) -> TrackerResult<Subscription> {
        let (id, updates) = self.provider.watch(options)?;
        log::debug!("Location watch {} opened", id);
        Ok(Subscription { id, updates })
    }

    /// Clear the watch and drop anything still queued on it
    pub fn cancel(&self, subscription: Subscription) {
        self.provider.clear_watch(subscription.id);
        log::debug!("Location watch {} cleared", subscription.id);
    }
}

/// Live watch handle; owns the receiving end of the provider's channel
pub struct Subscription {
    id: WatchId,
    updates: FixReceiver,
}

impl Subscription {
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Next usable sample.
    ///
    /// Fixes with unusable coordinates are skipped. A provider failure is
    /// returned as an error; `None` means the provider closed the watch.
    pub async fn next(&mut self) -> Option<TrackerResult<LocationSample>> {
        loop {
            match self.updates.recv().await? {
                Ok(fix) => match fix.normalize() {
                    Ok(sample) => return Some(Ok(sample)),
                    Err(e) => log::warn!("Dropping fix on watch {}: {}", self.id, e),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
