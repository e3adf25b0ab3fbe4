//! Error taxonomy of the Concord client
//!
//! - [`Error::Transport`]: the request never produced a response
//! - [`Error::Request`]: the server answered with an error, or with a
//!   success that breaks the log protocol (no `Content-Range`)
//! - [`Error::Range`]: the `Content-Range` header could not be parsed
//! - [`Error::Decode`]: a JSON body did not match the expected shape
//! - [`Error::Config`]: the client could not be built from its configuration
//!
//! None of these are retried at this layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A `Content-Range` header that does not match `bytes <low>-<high>/<length>`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RangeParseError {
    message: String,
}

impl RangeParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error response from the server
///
/// `details`, `instance_id` and `level` are passed through from Concord's
/// JSON error envelope when the server sends one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub status: Option<u16>,
    pub message: String,
    pub details: Option<String>,
    pub instance_id: Option<String>,
    pub level: Option<String>,
}

impl RequestError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            ..Self::default()
        }
    }

    /// A successful response that lacks the `Content-Range` header
    pub fn missing_range(status: u16) -> Self {
        Self::new(status, "Range header is missing")
    }

    /// The server answered 2xx but the response broke the log protocol
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error while performing a request")]
    Transport(#[source] reqwest::Error),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Range(#[from] RangeParseError),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl Error {
    /// Malformed or missing `Content-Range`; fatal for the fetch, never retried
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Self::Range(_) => true,
            Self::Request(e) => e.is_protocol_violation(),
            _ => false,
        }
    }

    /// The request did not complete within the client timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// HTTP status of an error response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(e) => e.status,
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
