//! Session storage
//!
//! The worker for a session is its only writer, so the store needs no
//! compare-and-swap; it only has to keep codes unique.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::AppError;
use crate::session::Session;
use crate::types::SessionCode;

/// Keyed storage of session aggregates
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Check whether a code is taken
    async fn exists(&self, code: &SessionCode) -> Result<bool, AppError>;

    /// Load a session, failing with `SessionNotFound` if absent
    async fn load(&self, code: &SessionCode) -> Result<Session, AppError>;

    /// Store a new session, failing with `DuplicateCode` if the code is taken
    async fn insert(&self, session: &Session) -> Result<(), AppError>;

    /// Overwrite an existing session
    async fn save(&self, session: &Session) -> Result<(), AppError>;

    /// Remove a session, failing with `SessionNotFound` if absent
    async fn delete(&self, code: &SessionCode) -> Result<(), AppError>;
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionCode, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionCode, Session>> {
        // A panic while holding the lock cannot leave a half-written session
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn exists(&self, code: &SessionCode) -> Result<bool, AppError> {
        Ok(self.sessions().contains_key(code))
    }

    async fn load(&self, code: &SessionCode) -> Result<Session, AppError> {
        self.sessions()
            .get(code)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(code.to_string()))
    }

    async fn insert(&self, session: &Session) -> Result<(), AppError> {
        let mut sessions = self.sessions();
        if sessions.contains_key(&session.code) {
            return Err(AppError::DuplicateCode(session.code.to_string()));
        }
        sessions.insert(session.code.clone(), session.clone());
        Ok(())
    }

    async fn save(&self, session: &Session) -> Result<(), AppError> {
        let mut sessions = self.sessions();
        let Some(stored) = sessions.get_mut(&session.code) else {
            return Err(AppError::SessionNotFound(session.code.to_string()));
        };
        *stored = session.clone();
        Ok(())
    }

    async fn delete(&self, code: &SessionCode) -> Result<(), AppError> {
        self.sessions()
            .remove(code)
            .map(|_| ())
            .ok_or_else(|| AppError::SessionNotFound(code.to_string()))
    }
}
