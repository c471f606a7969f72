use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Credentials;
use crate::backend::{BackendError, SpotsBackend};
use crate::error::{TrackerError, TrackerResult};
use crate::types::{Coordinates, ParkingSpot};

/// Latest snapshot of spots around a position
///
/// Each successful refresh replaces the whole set; a failed one leaves the
/// previous snapshot untouched.
pub struct NearbySpotsCache {
    backend: Arc<dyn SpotsBackend>,
    credentials: Credentials,
    timeout: Duration,
    spots: Vec<ParkingSpot>,
    centre: Option<Coordinates>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl NearbySpotsCache {
    pub fn new(
        backend: Arc<dyn SpotsBackend>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            credentials,
            timeout,
            spots: Vec::new(),
            centre: None,
            refreshed_at: None,
        }
    }

    pub async fn refresh(
        &mut self,
        latitude: f64,
        longitude: f64,
    ) -> TrackerResult<&[ParkingSpot]> {
        let token = self.credentials.bearer()?;
        let around = Coordinates::new(latitude, longitude);

        let request = self.backend.nearby_spots(&token, around);
        let fetched = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(spots)) => spots,
            Ok(Err(BackendError::Unauthorized)) => return Err(TrackerError::AuthRequired),
            Ok(Err(e)) => {
                log::warn!("Nearby spot refresh failed: {}", e);
                return Err(TrackerError::FetchFailed(e.to_string()));
            }
            Err(_) => {
                log::warn!("Nearby spot refresh timed out after {:?}", self.timeout);
                return Err(TrackerError::FetchFailed(BackendError::Timeout.to_string()));
            }
        };

        log::debug!(
            "Fetched {} spots around ({:.6}, {:.6})",
            fetched.len(),
            latitude,
            longitude
        );
        self.spots = fetched;
        self.centre = Some(around);
        self.refreshed_at = Some(Utc::now());
        Ok(&self.spots)
    }

    pub fn spots(&self) -> &[ParkingSpot] {
        &self.spots
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Position of the last successful refresh
    pub fn centre(&self) -> Option<Coordinates> {
        self.centre
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Closest cached spot to `position`
    pub fn nearest(&self, position: Coordinates) -> Option<&ParkingSpot> {
        self.spots.iter().min_by(|a, b| {
            let da = position.distance_m(&a.coordinates());
            let db = position.distance_m(&b.coordinates());
            da.total_cmp(&db)
        })
    }
}
