//! Game engine
//!
//! State transitions over a [`Session`]. Every precondition is checked
//! before the first field is written, so a rejected command leaves the
//! session untouched.
//!
//! Rules implemented: straight single-leg "first to exactly zero" with
//! three darts per turn. Going below zero or landing on one is a bust.

use chrono::Utc;
use tracing::{debug, info};

use crate::error::AppError;
use crate::history::ThrowRecord;
use crate::session::{GameStatus, Session};
use crate::types::Points;

/// Darts per turn before the next player is up
pub const DARTS_PER_TURN: u8 = 3;

/// Result of a single throw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrowOutcome {
    /// Points counted, same player keeps throwing
    Scored,
    /// Third dart counted, turn passed on
    TurnComplete,
    /// Turn discarded, turn passed on
    Bust { player: String },
    /// Player reached exactly zero
    Checkout { winner: String },
}

impl ThrowOutcome {
    /// Human readable notice for the snapshot
    pub fn message(&self) -> Option<String> {
        match self {
            ThrowOutcome::Scored | ThrowOutcome::TurnComplete => None,
            ThrowOutcome::Bust { .. } => Some("BUST! Turn reverted.".to_string()),
            ThrowOutcome::Checkout { winner } => Some(format!("{} wins!", winner)),
        }
    }
}

/// Check that a device may join the session
pub fn ensure_joinable(session: &Session) -> Result<(), AppError> {
    if matches!(session.status, GameStatus::Finished { .. }) {
        return Err(AppError::invalid_state("Cannot join a finished game"));
    }
    Ok(())
}

/// WAITING → ACTIVE
pub fn start(session: &mut Session) -> Result<(), AppError> {
    if session.status != GameStatus::Waiting {
        return Err(AppError::invalid_state("Game already started or finished"));
    }
    if session.players.len() < 2 {
        return Err(AppError::invalid_state("Need at least 2 players to start"));
    }

    session.status = GameStatus::Active;
    info!("Game started for session {}", session.code);
    Ok(())
}

/// Apply one dart for the current player
pub fn apply_throw(session: &mut Session, points: Points) -> Result<ThrowOutcome, AppError> {
    if !session.is_active() {
        return Err(AppError::invalid_state("Game is not active"));
    }

    let (score, turn_points) = match session.current_player() {
        Some(player) => (player.score, player.current_turn_points),
        None => return Err(AppError::invalid_state("No current player")),
    };
    let player_index = session.current_player_index;

    // Recorded before the outcome is known so undo is the same for all outcomes
    session.history.push(ThrowRecord {
        player_index,
        points: points.get(),
        previous_score: score,
        previous_turn_points: turn_points,
        previous_darts_thrown: session.darts_thrown,
        thrown_at: Utc::now(),
    });

    let new_score = score.checked_sub(points.get());
    let new_turn_points = turn_points + points.get();

    let outcome = match new_score {
        None | Some(1) => {
            let player = &mut session.players[player_index];
            player.score += player.current_turn_points;
            player.current_turn_points = 0;
            let name = player.name.clone();
            advance_turn(session);
            info!("Bust for player {} in session {}", name, session.code);
            ThrowOutcome::Bust { player: name }
        }
        Some(0) => {
            let player = &mut session.players[player_index];
            player.score = 0;
            player.current_turn_points = new_turn_points;
            let winner = player.name.clone();
            session.status = GameStatus::Finished {
                winner: winner.clone(),
            };
            info!("Player {} won session {}", winner, session.code);
            ThrowOutcome::Checkout { winner }
        }
        Some(score) => {
            let player = &mut session.players[player_index];
            player.score = score;
            player.current_turn_points = new_turn_points;
            session.darts_thrown += 1;

            if session.darts_thrown >= DARTS_PER_TURN {
                advance_turn(session);
                ThrowOutcome::TurnComplete
            } else {
                ThrowOutcome::Scored
            }
        }
    };

    debug!(
        "Session {}: {} points by player {} -> {:?}",
        session.code, points, player_index, outcome
    );
    Ok(outcome)
}

/// Restore the state from before the most recent throw
///
/// Reactivates a finished game. Returns the record that was undone.
pub fn undo(session: &mut Session) -> Result<ThrowRecord, AppError> {
    let Some(last) = session.history.peek() else {
        return Err(AppError::invalid_state("No throws to undo"));
    };
    if last.player_index >= session.players.len() {
        return Err(AppError::invalid_state("Throw history refers to an unknown player"));
    }
    let Some(record) = session.history.pop() else {
        return Err(AppError::invalid_state("No throws to undo"));
    };

    let player = &mut session.players[record.player_index];
    player.score = record.previous_score;
    player.current_turn_points = record.previous_turn_points;

    session.current_player_index = record.player_index;
    session.darts_thrown = record.previous_darts_thrown;

    if matches!(session.status, GameStatus::Finished { .. }) {
        session.status = GameStatus::Active;
    }

    info!("Undid last throw in session {}", session.code);
    Ok(record)
}

/// Skip the rest of the current turn
pub fn next_player(session: &mut Session) -> Result<(), AppError> {
    if !session.is_active() {
        return Err(AppError::invalid_state("Game is not active"));
    }
    advance_turn(session);
    Ok(())
}

/// Start the game over from the starting score
///
/// Allowed from any status; the game is ACTIVE afterwards.
pub fn reset(session: &mut Session) {
    let starting_score = session.starting_score;
    for player in &mut session.players {
        player.reset(starting_score);
    }

    session.current_player_index = 0;
    session.darts_thrown = 0;
    session.status = GameStatus::Active;
    session.history.clear();

    info!("Reset game for session {}", session.code);
}

/// Pass the turn to the next player in order
fn advance_turn(session: &mut Session) {
    if session.players.is_empty() {
        return;
    }
    if let Some(player) = session.current_player_mut() {
        player.current_turn_points = 0;
    }
    session.current_player_index = (session.current_player_index + 1) % session.players.len();
    session.darts_thrown = 0;
}
