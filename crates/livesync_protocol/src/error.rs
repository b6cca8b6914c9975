//! Error types for the livesync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding push payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload or its embedded message is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload decoded, but not into the expected shape.
    #[error("invalid payload structure: {0}")]
    InvalidStructure(String),

    /// A record did not carry a usable key.
    #[error("record has no usable `{0}` key")]
    MissingKey(String),
}

impl ProtocolError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }
}
