//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
/// Game commands act on the session the connection created or joined.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a new session and join it
    CreateSession {
        player_names: Vec<String>,
        #[serde(default)]
        starting_score: Option<i64>,
    },
    /// Join an existing session by code
    JoinSession { session_code: String },
    /// Start the game (WAITING → ACTIVE)
    StartGame {
        #[serde(default)]
        expected_version: Option<u64>,
    },
    /// Record one dart
    Throw {
        points: i64,
        #[serde(default)]
        expected_version: Option<u64>,
    },
    /// Take back the last dart
    Undo {
        #[serde(default)]
        expected_version: Option<u64>,
    },
    /// Skip to the next player
    NextPlayer {
        #[serde(default)]
        expected_version: Option<u64>,
    },
    /// Restart the game from the starting score
    ResetGame {
        #[serde(default)]
        expected_version: Option<u64>,
    },
    /// Ask for the current state to be broadcast again
    Sync,
    /// Remove the session for everyone
    DeleteSession,
    /// Stop following the current session
    LeaveSession,
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection successful, client ID issued
    Connected { client_id: String },
    /// Session created or joined (sent to the requester only)
    SessionJoined(Snapshot),
    /// Session state changed (sent to every subscriber)
    GameState(Snapshot),
    /// Session was deleted
    SessionDeleted { session_code: String },
    /// Connection stopped following its session
    SessionLeft,
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Full externally visible state of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub session_code: String,
    pub players: Vec<PlayerView>,
    pub current_player_index: usize,
    pub darts_thrown: u8,
    pub starting_score: u32,
    pub status: StatusKind,
    pub winner_name: Option<String>,
    pub version: u64,
    pub message: Option<String>,
}

/// Player entry inside a [`Snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub name: String,
    pub score: u32,
    pub current_turn_points: u32,
}

/// Wire form of the session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Waiting,
    Active,
    Finished,
}

/// Error codes for ServerMessage::Error
///
/// Represents different error scenarios that can be communicated to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed command input
    ValidationError,
    /// Non-existent session code
    NotFound,
    /// Command not allowed right now
    InvalidState,
    /// Client state is stale and must resync
    VersionConflict,
    /// Game command without a session
    NotInSession,
    /// Invalid message format
    InvalidMessage,
    /// Server-side fault
    Internal,
}

impl From<&AppError> for ErrorCode {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Validation(_) => ErrorCode::ValidationError,
            AppError::SessionNotFound(_) => ErrorCode::NotFound,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::VersionConflict { .. } => ErrorCode::VersionConflict,
            AppError::NotInSession => ErrorCode::NotInSession,
            AppError::Json(_) => ErrorCode::InvalidMessage,
            _ => ErrorCode::Internal,
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let code = ErrorCode::from(&err);
        let message = match &err {
            AppError::SessionNotFound(session_code) => format!("Session '{}' not found", session_code),
            AppError::NotInSession => "You have not joined a session".to_string(),
            AppError::Json(e) => format!("Invalid message format: {}", e),
            // Internal faults are not described to clients
            _ if code == ErrorCode::Internal => "Internal error".to_string(),
            _ => err.to_string(),
        };
        ServerMessage::Error { code, message }
    }
}
