//! Error types for the relay's HTTP surface.
//!
//! Turn processing reports failures through `anyhow`; this enum covers the
//! request-level failures that map onto an HTTP status.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Request-level error, mappable to an HTTP status code.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, stale or mismatched request signature
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Request headers or fields that cannot be interpreted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Body that is not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure on our side
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this is an authentication error.
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::InvalidInput(_) | Self::Json(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}
