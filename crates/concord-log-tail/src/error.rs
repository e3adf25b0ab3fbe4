use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TailError>;

/// Why a refresh of the log reader did not produce new state
#[derive(Debug, Error)]
pub enum TailError {
    #[error(transparent)]
    Client(#[from] concord_client::Error),

    #[error("Log request timed out after {0:?}")]
    Timeout(Duration),

    /// Another refresh of the same reader has not finished yet
    #[error("A log refresh is already in progress")]
    RefreshInFlight,

    /// The reader was reset or retargeted while the fetch was running
    #[error("Log refresh was superseded by a reset")]
    Superseded,

    /// Polling was stopped while the fetch was running
    #[error("Log refresh was cancelled")]
    Cancelled,
}

impl TailError {
    /// Missing or malformed `Content-Range`; retrying will not help
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_protocol_violation())
    }
}
