// Parking Tracker Library
// Nearby-spot discovery, spot reporting and automatic park detection from location samples

pub mod auth;
pub mod backend;
pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod location;
pub mod nearby;
pub mod reporter;
pub mod session;
pub mod speed_history;
pub mod types;

pub use auth::{BearerToken, Credentials};
pub use backend::{BackendError, HttpSpotsBackend, SpotReport, SpotsBackend};
pub use client::ParkingClient;
pub use config::{
    Accuracy, BackendConfig, DetectorConfig, TrackerConfig, WatchOptions, MAX_DETECTOR_WINDOW,
};
pub use detector::{DetectorState, ParkingDetector};
pub use error::{TrackerError, TrackerResult};
pub use location::{
    FixFeed, LocationProvider, LocationSampleSource, RawFix, Subscription, TermuxLocationProvider,
};
pub use nearby::NearbySpotsCache;
pub use reporter::SpotReporter;
pub use session::{SampleOutcome, SessionStatus, TrackingSession};
pub use speed_history::SpeedHistory;
pub use types::{Coordinates, LocationSample, ParkedEvent, ParkingSpot, ReportKind};
