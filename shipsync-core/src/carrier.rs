use async_trait::async_trait;

/// Latest status reported by the carrier for one parcel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingStatus {
    Latest(String),
    NoData,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Tracking number is empty")]
    InvalidTrackingNumber,
    #[error("Carrier request timed out: {0}")]
    Timeout(String),
    #[error("Carrier transport error: {0}")]
    Transport(String),
    #[error("Carrier returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Unparseable carrier response: {0}")]
    Parse(String),
    #[error("Carrier circuit [{0}] is open")]
    CircuitOpen(String),
}

impl TrackingError {
    /// Whether the failure says something about the carrier's health, as
    /// opposed to this particular parcel.
    pub fn is_carrier_fault(&self) -> bool {
        match self {
            TrackingError::Timeout(_) | TrackingError::Transport(_) => true,
            TrackingError::Http { status, .. } => *status >= 500 || *status == 429,
            TrackingError::InvalidTrackingNumber
            | TrackingError::Parse(_)
            | TrackingError::CircuitOpen(_) => false,
        }
    }
}

#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Fetch the newest status for a parcel.
    async fn fetch_status(&self, tracking_number: &str) -> Result<TrackingStatus, TrackingError>;
}
