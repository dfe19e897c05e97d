use thiserror::Error;

use crate::validation::ValidationError;

/// Error types for the relay client
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Active session already exists")]
    SessionConflict,

    #[error("Tunnel returned internal error. Please try again later")]
    ServerInternal,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    ConnectionFailed(String),

    #[error("Error reading from tunnel server: {0}")]
    ReadFailure(String),

    #[error("Error writing to tunnel server: {0}")]
    WriteFailure(String),

    #[error("Received invalid payload from tunnel server: {0}")]
    InvalidPayload(String),

    #[error("Local service error: {0}")]
    LocalService(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("missing project ID")]
    MissingProjectId,

    #[error("missing CLI secret")]
    MissingCliSecret,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Authentication rejections are reported to the user, not treated as crashes
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::Unauthorized | RelayError::SessionConflict | RelayError::ServerInternal
        )
    }

    /// Credential lookups that failed because nothing was configured
    pub fn is_missing_credential(&self) -> bool {
        matches!(
            self,
            RelayError::MissingProjectId | RelayError::MissingCliSecret
        )
    }
}

/// Type alias for Results using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
