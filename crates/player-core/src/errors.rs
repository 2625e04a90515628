//! Player error types.
//!
//! Every error maps to a stable numeric code that is carried in state-update
//! events and snapshot results, and to a bounded label for metrics. Internal
//! details are logged but not exposed through `client_message`.

use crate::pipeline::PipelineError;
use common::types::{StreamId, StreamIdError};
use thiserror::Error;

/// Result code meaning "no error" in state updates and snapshot results.
pub const SUCCESS_CODE: i32 = 0;

/// Player error type.
///
/// Maps to result codes:
/// - `InvalidStreamId`: 1001, `InvalidKeyLength`: 1002 (validation)
/// - `SessionNotFound`: 1003
/// - `CapacityExceeded`: 1004 (validation)
/// - Connectivity (`ConnectFailed`, `ReconnectExhausted`): 2001-2002
/// - `SnapshotFailed`: 3001
/// - `Pipeline`: 4001
/// - Config, `ShuttingDown`, Internal: 5001-5003
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Stream ID failed format validation.
    #[error("Invalid stream id: {0}")]
    InvalidStreamId(#[from] StreamIdError),

    /// Decryption key is not 16, 24 or 32 bytes.
    #[error("Invalid decryption key length: {len} bytes")]
    InvalidKeyLength { len: usize },

    /// No session exists for the stream.
    #[error("Session not found: {0}")]
    SessionNotFound(StreamId),

    /// Session registry is full.
    #[error("Session capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },

    /// A connect attempt failed (absorbed by the reconnection controller).
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Reconnection ceiling reached.
    #[error("Reconnect attempts exhausted")]
    ReconnectExhausted,

    /// Snapshot capture failed.
    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),

    /// Media pipeline reported an error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The manager is shutting down and no longer accepts sessions.
    #[error("Player is shutting down")]
    ShuttingDown,

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlayerError {
    /// Returns the numeric result code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            PlayerError::InvalidStreamId(_) => 1001,
            PlayerError::InvalidKeyLength { .. } => 1002,
            PlayerError::SessionNotFound(_) => 1003,
            PlayerError::CapacityExceeded { .. } => 1004,
            PlayerError::ConnectFailed(_) => 2001,
            PlayerError::ReconnectExhausted => 2002,
            PlayerError::SnapshotFailed(_) => 3001,
            PlayerError::Pipeline(_) => 4001,
            PlayerError::Config(_) => 5001,
            PlayerError::ShuttingDown => 5002,
            PlayerError::Internal(_) => 5003,
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            PlayerError::InvalidStreamId(_) => "invalid_stream_id",
            PlayerError::InvalidKeyLength { .. } => "invalid_key_length",
            PlayerError::SessionNotFound(_) => "session_not_found",
            PlayerError::CapacityExceeded { .. } => "capacity_exceeded",
            PlayerError::ConnectFailed(_) => "connect_failed",
            PlayerError::ReconnectExhausted => "reconnect_exhausted",
            PlayerError::SnapshotFailed(_) => "snapshot_failed",
            PlayerError::Pipeline(_) => "pipeline",
            PlayerError::Config(_) => "config",
            PlayerError::ShuttingDown => "shutting_down",
            PlayerError::Internal(_) => "internal",
        }
    }

    /// Returns a caller-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            PlayerError::InvalidStreamId(e) => format!("Invalid stream id: {e}"),
            PlayerError::InvalidKeyLength { .. } => {
                "Decryption key must be 16, 24 or 32 bytes".to_string()
            }
            PlayerError::SessionNotFound(_) => "No active session for stream".to_string(),
            PlayerError::CapacityExceeded { .. } => "Too many active streams".to_string(),
            PlayerError::ConnectFailed(_) | PlayerError::Pipeline(_) => {
                "Stream connection failed".to_string()
            }
            PlayerError::ReconnectExhausted => "Stream could not be recovered".to_string(),
            PlayerError::SnapshotFailed(_) => "Snapshot could not be captured".to_string(),
            PlayerError::ShuttingDown => "Player is shutting down".to_string(),
            PlayerError::Config(_) | PlayerError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Whether the error is a synchronous validation failure that leaves
    /// all state untouched.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlayerError::InvalidStreamId(_)
                | PlayerError::InvalidKeyLength { .. }
                | PlayerError::CapacityExceeded { .. }
        )
    }
}
