//! Error types for the Musicdex client.

use thiserror::Error;

/// Errors that can occur when talking to the Musicdex API.
#[derive(Error, Debug)]
pub enum MusicdexError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error response
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// The operation needs a logged-in session
    #[error("Authentication required")]
    AuthRequired,

    /// Invalid server URL
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse server response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Server is offline or unreachable
    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),

    /// An in-flight fetch was cancelled by an invalidation of its key
    #[error("Fetch for {key} was cancelled")]
    Cancelled { key: String },
}

impl MusicdexError {
    /// Whether this error came from a superseded fetch rather than the server.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MusicdexError::Cancelled { .. })
    }

    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            MusicdexError::ServerUnreachable(e.to_string())
        } else {
            MusicdexError::Request(e)
        }
    }
}

/// Result type for Musicdex client operations.
pub type Result<T> = std::result::Result<T, MusicdexError>;
