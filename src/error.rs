use thiserror::Error;

/// Parking tracker error types
///
/// Every variant is recoverable; callers decide whether to retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Report failed: {0}")]
    ReportFailed(String),

    #[error("Fetching nearby spots failed: {0}")]
    FetchFailed(String),

    #[error("Tracking session already active")]
    AlreadyTracking,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TrackerError {
    /// True for conditions that need a new credential before retrying
    pub fn needs_sign_in(&self) -> bool {
        matches!(self, TrackerError::AuthRequired)
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
