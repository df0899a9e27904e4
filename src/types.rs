//! Basic type definitions for the dart counter
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique connection identifier
//! - `SessionCode`: 6-character session code without ambiguous characters
//! - `Points`: score of a single dart, validated to 0..=60

use rand::Rng;
use uuid::Uuid;

use crate::error::AppError;

/// Characters allowed in session codes (no 0/O/1/I)
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of characters in a session code
pub const CODE_LENGTH: usize = 6;

/// Highest score a single dart can make (treble 20)
pub const MAX_POINTS: u32 = 60;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe identification of WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session code (6 characters from [`CODE_ALPHABET`])
///
/// Shared between the devices of one game. Generated randomly or parsed
/// from user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionCode(pub String);

impl SessionCode {
    /// Generate a new random session code
    ///
    /// Every character is drawn uniformly from [`CODE_ALPHABET`]. Uniqueness
    /// is checked by [`crate::codegen::CodeGenerator`], not here.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Create a SessionCode from user input (trimmed, converted to uppercase)
    pub fn from_string(code: String) -> Self {
        Self(code.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Points scored by one dart
///
/// Only constructible through [`Points::new`], so the engine never sees an
/// out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Points(u32);

impl Points {
    /// Validate a raw score from the wire
    pub fn new(raw: i64) -> Result<Self, AppError> {
        match u32::try_from(raw) {
            Ok(points) if points <= MAX_POINTS => Ok(Self(points)),
            _ => Err(AppError::Validation(format!(
                "Points must be between 0 and {}, got {}",
                MAX_POINTS, raw
            ))),
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
