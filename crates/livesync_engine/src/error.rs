//! Error types for the sync engine.

use livesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while starting or running a sync manager.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Push mode was selected without a channel name.
    #[error("push mode requires a channel name")]
    MissingChannelName,

    /// Push mode was selected without an event namespace.
    #[error("push mode requires an event namespace")]
    MissingEventNamespace,

    /// Serialized settings could not be parsed.
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// A push payload could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The push transport failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The local store rejected a mutation.
    #[error("store error: {0}")]
    Store(String),

    /// No timer runtime is available.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if this error is a caller configuration mistake.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::MissingChannelName
                | SyncError::MissingEventNamespace
                | SyncError::InvalidSettings(_)
        )
    }
}
