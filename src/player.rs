//! Player struct definition
//!
//! Represents one participant of a session with their running score.

/// A player in a dart session
///
/// Created together with the session and mutated only by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Display name
    pub name: String,
    /// Remaining score (counts down to zero)
    pub score: u32,
    /// Points scored so far in the current turn
    pub current_turn_points: u32,
    /// Position in the turn rotation (0-indexed)
    pub order: usize,
}

impl Player {
    /// Create a new player at the given starting score
    pub fn new(name: String, starting_score: u32, order: usize) -> Self {
        Self {
            name,
            score: starting_score,
            current_turn_points: 0,
            order,
        }
    }

    /// Put the player back to the start of a game
    pub fn reset(&mut self, starting_score: u32) {
        self.score = starting_score;
        self.current_turn_points = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_creation() {
        let player = Player::new("Alice".to_string(), 301, 0);

        assert_eq!(player.name, "Alice");
        assert_eq!(player.score, 301);
        assert_eq!(player.current_turn_points, 0);
        assert_eq!(player.order, 0);
    }

    #[test]
    fn test_player_reset() {
        let mut player = Player::new("Bob".to_string(), 501, 1);
        player.score = 0;
        player.current_turn_points = 45;

        player.reset(501);

        assert_eq!(player.score, 501);
        assert_eq!(player.current_turn_points, 0);
        assert_eq!(player.order, 1);
    }
}
