use thiserror::Error;

/// Errors delivered on the manager's error channel.
///
/// These travel by value to subscribers; nothing in the feed returns them
/// across the subscriber boundary as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("telemetry endpoint is not configured")]
    MissingEndpoint,

    #[error("invalid telemetry endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Socket-level failure or unexpected close; a reconnect is pending.
    #[error("telemetry connection error: {0}")]
    Transient(String),

    /// Reconnect ceiling reached. Data on screen is stale until the next explicit connect.
    #[error("telemetry connection lost after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("a telemetry feed is already installed for this process")]
    AlreadyInstalled,

    #[error("no async runtime available for the telemetry transport")]
    NoRuntime,
}

impl FeedError {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FeedError::Transient(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(
            self,
            FeedError::MissingEndpoint | FeedError::InvalidEndpoint { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open websocket: {0}")]
    Open(String),
}

impl From<TransportError> for FeedError {
    fn from(e: TransportError) -> Self {
        FeedError::Transient(e.to_string())
    }
}
