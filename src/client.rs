use std::sync::Arc;

use crate::auth::Credentials;
use crate::backend::{HttpSpotsBackend, SpotsBackend};
use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::location::{LocationProvider, LocationSampleSource};
use crate::nearby::NearbySpotsCache;
use crate::reporter::SpotReporter;
use crate::session::{SampleOutcome, SessionStatus, TrackingSession};
use crate::types::{Coordinates, ParkingSpot, ReportKind};

/// One client instance: the signed-in user's view of nearby spots, their
/// manual reports, and at most one drive-tracking session.
pub struct ParkingClient {
    source: LocationSampleSource,
    credentials: Credentials,
    reporter: SpotReporter,
    nearby: NearbySpotsCache,
    session: TrackingSession,
}

impl ParkingClient {
    pub fn new(
        config: TrackerConfig,
        provider: Arc<dyn LocationProvider>,
        backend: Arc<dyn SpotsBackend>,
        credentials: Credentials,
    ) -> TrackerResult<Self> {
        config.validate()?;

        let timeout = config.backend.timeout();
        let source = LocationSampleSource::new(provider);
        let reporter = SpotReporter::new(backend.clone(), credentials.clone(), timeout);
        let nearby = NearbySpotsCache::new(backend, credentials.clone(), timeout);
        let session = TrackingSession::new(
            source.clone(),
            reporter.clone(),
            config.detector,
            config.watch,
        );

        Ok(ParkingClient {
            source,
            credentials,
            reporter,
            nearby,
            session,
        })
    }

    /// Client talking to the HTTP backend named in `config`
    pub fn connect(
        config: TrackerConfig,
        provider: Arc<dyn LocationProvider>,
        credentials: Credentials,
    ) -> TrackerResult<Self> {
        let backend = Arc::new(HttpSpotsBackend::new(&config.backend)?);
        Self::new(config, provider, backend, credentials)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        self.credentials.set(token);
    }

    /// Drop the credential. A running session keeps tracking, but its
    /// park report will fail with `AuthRequired`.
    pub fn sign_out(&self) {
        self.credentials.revoke();
    }

    /// Latest known position
    pub fn region(&self) -> Option<Coordinates> {
        self.session.current_region()
    }

    pub fn nearby_spots(&self) -> &[ParkingSpot] {
        self.nearby.spots()
    }

    pub fn nearest_spot(&self) -> Option<&ParkingSpot> {
        let here = self.region()?;
        self.nearby.nearest(here)
    }

    /// Take a single fix, centre on it and load the spots around it
    pub async fn locate(&mut self) -> TrackerResult<&[ParkingSpot]> {
        let sample = self.source.get_once().await?;
        self.session.recenter(sample.coordinates);
        self.nearby
            .refresh(sample.coordinates.latitude, sample.coordinates.longitude)
            .await
    }

    pub async fn refresh_nearby(&mut self) -> TrackerResult<&[ParkingSpot]> {
        let here = self.region().ok_or_else(|| {
            TrackerError::LocationUnavailable("no known position".to_string())
        })?;
        self.nearby.refresh(here.latitude, here.longitude).await
    }

    /// Centre on an explicit position and load the spots around it
    pub async fn refresh_nearby_at(
        &mut self,
        coordinates: Coordinates,
    ) -> TrackerResult<&[ParkingSpot]> {
        self.session.recenter(coordinates);
        self.nearby
            .refresh(coordinates.latitude, coordinates.longitude)
            .await
    }

    /// Report a free spot at the current position.
    ///
    /// The nearby list is refreshed afterwards; a failed refresh is logged
    /// and does not fail the report.
    pub async fn report_spot_here(&mut self) -> TrackerResult<Coordinates> {
        let here = self.region().ok_or_else(|| {
            TrackerError::LocationUnavailable("no known position".to_string())
        })?;
        self.report_spot_at(here).await?;
        Ok(here)
    }

    pub async fn report_spot_at(&mut self, coordinates: Coordinates) -> TrackerResult<()> {
        self.reporter.report(coordinates, ReportKind::Manual).await?;

        if let Err(e) = self
            .nearby
            .refresh(coordinates.latitude, coordinates.longitude)
            .await
        {
            log::warn!("Spot reported but nearby refresh failed: {}", e);
        }
        Ok(())
    }

    pub async fn confirm_spot(&self, spot_id: i64) -> TrackerResult<()> {
        self.reporter.confirm(spot_id).await
    }

    pub async fn flag_spot(&self, spot_id: i64) -> TrackerResult<()> {
        self.reporter.flag_fake(spot_id).await
    }

    pub fn start_tracking(&mut self) -> TrackerResult<()> {
        self.session.start()
    }

    pub fn stop_tracking(&mut self) {
        self.session.stop();
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_active()
    }

    pub fn tracking_status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Next tracking event; see [`TrackingSession::next_event`]
    pub async fn next_event(&mut self) -> Option<TrackerResult<SampleOutcome>> {
        self.session.next_event().await
    }
}
