//! Throw history for undo
//!
//! Every accepted throw attempt pushes a [`ThrowRecord`] holding the state
//! from *before* the throw, so popping it restores the session exactly,
//! whether the throw scored, busted or won.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Pre-throw state captured for undo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrowRecord {
    /// Index of the player who threw
    pub player_index: usize,
    /// Points thrown
    pub points: u32,
    /// Player's score before the throw
    pub previous_score: u32,
    /// Player's turn points before the throw
    pub previous_turn_points: u32,
    /// Session's dart counter before the throw
    pub previous_darts_thrown: u8,
    /// When the throw was recorded
    pub thrown_at: DateTime<Utc>,
}

/// Bounded stack of throw records
///
/// The most recent record sits on top. Once `capacity` records are held,
/// pushing evicts the oldest one, which caps undo depth.
#[derive(Debug, Clone)]
pub struct ThrowHistory {
    records: VecDeque<ThrowRecord>,
    capacity: usize,
}

impl ThrowHistory {
    /// Create an empty history holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Push a record onto the stack
    pub fn push(&mut self, record: ThrowRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Pop the most recent record
    pub fn pop(&mut self) -> Option<ThrowRecord> {
        self.records.pop_back()
    }

    /// Look at the most recent record without removing it
    pub fn peek(&self) -> Option<&ThrowRecord> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
