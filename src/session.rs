//! Session aggregate
//!
//! A session owns its players and its throw history. Only the engine
//! changes game fields; the session worker bumps the version on commit.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::history::ThrowHistory;
use crate::message::{PlayerView, Snapshot, StatusKind};
use crate::player::Player;
use crate::types::SessionCode;

/// Lowest playable starting score; a score of 1 can never be checked out
pub const MIN_STARTING_SCORE: u32 = 2;

/// Game phase
///
/// The winner is carried by `Finished`, so a finished game always has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    Active,
    Finished { winner: String },
}

impl GameStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            GameStatus::Waiting => StatusKind::Waiting,
            GameStatus::Active => StatusKind::Active,
            GameStatus::Finished { .. } => StatusKind::Finished,
        }
    }

    pub fn winner(&self) -> Option<&str> {
        match self {
            GameStatus::Finished { winner } => Some(winner),
            _ => None,
        }
    }
}

/// One live dart game
#[derive(Debug, Clone)]
pub struct Session {
    /// Session code for identification
    pub code: SessionCode,
    /// Score every player starts from
    pub starting_score: u32,
    /// Index into `players` of the player at the oche
    pub current_player_index: usize,
    /// Darts thrown in the current turn (0..3)
    pub darts_thrown: u8,
    pub status: GameStatus,
    /// Bumped on every committed mutation
    pub version: u64,
    /// Players in turn order
    pub players: Vec<Player>,
    /// Undo stack
    pub history: ThrowHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new WAITING session
    ///
    /// Fails if no players are given, a name is blank, or the starting
    /// score is below [`MIN_STARTING_SCORE`].
    pub fn new(
        code: SessionCode,
        player_names: Vec<String>,
        starting_score: i64,
        history_capacity: usize,
    ) -> Result<Self, AppError> {
        if player_names.is_empty() {
            return Err(AppError::Validation(
                "At least one player is required".to_string(),
            ));
        }

        let starting_score = match u32::try_from(starting_score) {
            Ok(score) if score >= MIN_STARTING_SCORE => score,
            _ => {
                return Err(AppError::Validation(format!(
                    "Starting score must be at least {}, got {}",
                    MIN_STARTING_SCORE, starting_score
                )))
            }
        };

        let mut players = Vec::with_capacity(player_names.len());
        for (order, name) in player_names.into_iter().enumerate() {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation(format!(
                    "Player {} has an empty name",
                    order + 1
                )));
            }
            players.push(Player::new(name.to_string(), starting_score, order));
        }

        let now = Utc::now();
        Ok(Self {
            code,
            starting_score,
            current_player_index: 0,
            darts_thrown: 0,
            status: GameStatus::Waiting,
            version: 0,
            players,
            history: ThrowHistory::new(history_capacity),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get the player whose turn it is
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    pub fn current_player_mut(&mut self) -> Option<&mut Player> {
        self.players.get_mut(self.current_player_index)
    }

    pub fn is_active(&self) -> bool {
        self.status == GameStatus::Active
    }

    /// Mark a mutation as committed
    pub fn commit(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Fail if the caller's view of the session is stale
    pub fn check_version(&self, expected: Option<u64>) -> Result<(), AppError> {
        match expected {
            Some(expected) if expected != self.version => Err(AppError::VersionConflict {
                expected,
                actual: self.version,
            }),
            _ => Ok(()),
        }
    }

    /// Build the externally visible state
    pub fn snapshot(&self, message: Option<String>) -> Snapshot {
        Snapshot {
            session_code: self.code.to_string(),
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    name: p.name.clone(),
                    score: p.score,
                    current_turn_points: p.current_turn_points,
                })
                .collect(),
            current_player_index: self.current_player_index,
            darts_thrown: self.darts_thrown,
            starting_score: self.starting_score,
            status: self.status.kind(),
            winner_name: self.status.winner().map(str::to_string),
            version: self.version,
            message,
        }
    }
}
