//! Error types for the dart counter
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal errors (connection termination), internal faults, and
/// game errors that are reported back to the requesting client.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed command input (empty player list, out-of-range points)
    #[error("{0}")]
    Validation(String),

    /// No session with the given code
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Command not allowed in the session's current state
    #[error("{0}")]
    InvalidState(String),

    /// Client acted on a stale snapshot
    #[error("Version conflict: expected {expected}, session is at {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// Could not find a free session code
    #[error("Could not generate a unique session code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },

    /// Store already holds a session with this code
    #[error("Duplicate session code: {0}")]
    DuplicateCode(String),

    /// Game command sent before creating or joining a session
    #[error("Not in session")]
    NotInSession,
}

impl AppError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::ChannelSend
    }
}
