use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::{DetectorConfig, WatchOptions};
use crate::detector::ParkingDetector;
use crate::error::{TrackerError, TrackerResult};
use crate::location::{LocationSampleSource, Subscription};
use crate::reporter::SpotReporter;
use crate::speed_history::SpeedHistory;
use crate::types::{Coordinates, LocationSample, ParkedEvent, ReportKind};

/// Tracking session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Not watching location
    Idle,
    /// Watching location, detector armed
    Active,
    /// Park detected, tearing down the watch
    StoppingAfterParked,
}

/// What processing one sample led to
#[derive(Debug)]
pub enum SampleOutcome {
    /// Session was not active; nothing changed
    Ignored,
    /// Sample consumed, still driving
    Tracking,
    /// Park detected. The session is already idle; `report` resolves once
    /// the backend has answered.
    Parked {
        event: ParkedEvent,
        report: JoinHandle<TrackerResult<()>>,
    },
}

/// Drive-tracking session: owns the location watch and the detector
///
/// Samples are pulled with [`TrackingSession::next_event`]. Both that and
/// [`TrackingSession::stop`] take `&mut self`, and `stop` clears the watch
/// and drops its receiver before returning, so nothing delivered after a
/// stop is ever processed.
pub struct TrackingSession {
    source: LocationSampleSource,
    reporter: SpotReporter,
    detector_config: DetectorConfig,
    watch_options: WatchOptions,
    status: SessionStatus,
    subscription: Option<Subscription>,
    detector: Option<ParkingDetector>,
    speed_history: SpeedHistory,
    current_region: Option<Coordinates>,
    samples_seen: u64,
}

impl TrackingSession {
    pub fn new(
        source: LocationSampleSource,
        reporter: SpotReporter,
        detector_config: DetectorConfig,
        watch_options: WatchOptions,
    ) -> Self {
        let speed_history = SpeedHistory::new(detector_config.window);
        TrackingSession {
            source,
            reporter,
            detector_config,
            watch_options,
            status: SessionStatus::Idle,
            subscription: None,
            detector: None,
            speed_history,
            current_region: None,
            samples_seen: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Latest known position, kept across sessions for map centring
    pub fn current_region(&self) -> Option<Coordinates> {
        self.current_region
    }

    /// Move the known position without a tracking sample (e.g. a one-off fix)
    pub fn recenter(&mut self, coordinates: Coordinates) {
        self.current_region = Some(coordinates);
    }

    /// Samples processed by the current (or last) session
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Begin watching location (Idle → Active)
    pub fn start(&mut self) -> TrackerResult<()> {
        if self.status == SessionStatus::Active {
            return Err(TrackerError::AlreadyTracking);
        }

        let subscription = self.source.watch(&self.watch_options)?;

        self.speed_history = SpeedHistory::new(self.detector_config.window);
        self.detector = Some(ParkingDetector::new(self.detector_config.clone()));
        self.subscription = Some(subscription);
        self.samples_seen = 0;
        self.status = SessionStatus::Active;

        log::info!(
            "Drive tracking started (high {:.1} m/s, low {:.1} m/s, window {})",
            self.detector_config.high_speed_threshold,
            self.detector_config.low_speed_threshold,
            self.detector_config.window
        );
        Ok(())
    }

    /// Stop tracking from any state. Idempotent.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.source.cancel(subscription);
        }
        self.detector = None;

        if self.status != SessionStatus::Idle {
            log::info!("Drive tracking stopped after {} samples", self.samples_seen);
        }
        self.status = SessionStatus::Idle;
    }

    /// Process one sample while active.
    ///
    /// On a detected park the watch is cleared, the report is dispatched
    /// without waiting for it, and the session goes idle whether or not the
    /// report later succeeds.
    ///
    /// Samples that do not complete a park need no runtime, but the park
    /// report is spawned onto the current tokio runtime, so a park detected
    /// outside one panics.
    pub fn on_sample(&mut self, sample: LocationSample) -> SampleOutcome {
        if self.status != SessionStatus::Active {
            return SampleOutcome::Ignored;
        }
        let Some(detector) = self.detector.as_mut() else {
            return SampleOutcome::Ignored;
        };

        self.samples_seen += 1;
        self.current_region = Some(sample.coordinates);

        let Some(event) = detector.observe(&sample, &mut self.speed_history) else {
            return SampleOutcome::Tracking;
        };

        self.status = SessionStatus::StoppingAfterParked;
        if let Some(subscription) = self.subscription.take() {
            self.source.cancel(subscription);
        }
        self.detector = None;

        let report = self
            .reporter
            .spawn_report(event.coordinates, ReportKind::Parked);

        self.status = SessionStatus::Idle;
        log::info!(
            "Drive tracking finished: parked after {} samples",
            self.samples_seen
        );

        SampleOutcome::Parked { event, report }
    }

    /// Wait for the next sample and process it.
    ///
    /// Returns `None` when not tracking or when the provider closed the
    /// watch. A provider failure stops the session and is returned once;
    /// tracking resumes only through another `start`.
    pub async fn next_event(&mut self) -> Option<TrackerResult<SampleOutcome>> {
        let subscription = self.subscription.as_mut()?;
        let update = subscription.next().await;

        match update {
            Some(Ok(sample)) => Some(Ok(self.on_sample(sample))),
            Some(Err(e)) => {
                log::warn!("Location watch failed: {}", e);
                self.stop();
                Some(Err(e))
            }
            None => {
                log::warn!("Location watch closed by provider");
                self.stop();
                None
            }
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop();
    }
}
