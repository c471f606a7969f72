use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::auth::Credentials;
use crate::backend::{BackendError, SpotReport, SpotsBackend};
use crate::error::{TrackerError, TrackerResult};
use crate::types::{Coordinates, ReportKind};

/// Turns a coordinate into a report on the spots backend
///
/// Shared by the manual "report spot" action and automatic park reports.
/// No retries: a failed report is returned to the caller as `ReportFailed`.
#[derive(Clone)]
pub struct SpotReporter {
    backend: Arc<dyn SpotsBackend>,
    credentials: Credentials,
    timeout: Duration,
}

impl SpotReporter {
    pub fn new(
        backend: Arc<dyn SpotsBackend>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            credentials,
            timeout,
        }
    }

    pub async fn report(&self, coordinates: Coordinates, kind: ReportKind) -> TrackerResult<()> {
        let token = self.credentials.bearer()?;
        let report = SpotReport { kind, coordinates };

        self.bounded(self.backend.submit_report(&token, &report)).await?;
        log::info!(
            "Reported {:?} spot at ({:.6}, {:.6})",
            kind,
            coordinates.latitude,
            coordinates.longitude
        );
        Ok(())
    }

    /// Dispatch a report without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_report(
        &self,
        coordinates: Coordinates,
        kind: ReportKind,
    ) -> JoinHandle<TrackerResult<()>> {
        let reporter = self.clone();
        tokio::spawn(async move {
            let result = reporter.report(coordinates, kind).await;
            if let Err(e) = &result {
                log::warn!("{:?} report failed: {}", kind, e);
            }
            result
        })
    }

    /// Confirm that a reported spot is real
    pub async fn confirm(&self, spot_id: i64) -> TrackerResult<()> {
        let token = self.credentials.bearer()?;
        self.bounded(self.backend.confirm_spot(&token, spot_id)).await
    }

    /// Flag a reported spot as fake
    pub async fn flag_fake(&self, spot_id: i64) -> TrackerResult<()> {
        let token = self.credentials.bearer()?;
        self.bounded(self.backend.flag_spot(&token, spot_id)).await
    }

    async fn bounded<F>(&self, call: F) -> TrackerResult<()>
    where
        F: Future<Output = Result<(), BackendError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(BackendError::Unauthorized)) => Err(TrackerError::AuthRequired),
            Ok(Err(e)) => Err(TrackerError::ReportFailed(e.to_string())),
            Err(_) => Err(TrackerError::ReportFailed(BackendError::Timeout.to_string())),
        }
    }
}
