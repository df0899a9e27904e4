//! Session code allocation
//!
//! Draws random codes and stores the new session under the first one that
//! is free, giving up after a bounded number of attempts. The store's
//! insert decides uniqueness, so two concurrent creates can never claim
//! the same code.

use tracing::{debug, error};

use crate::error::AppError;
use crate::session::Session;
use crate::store::SessionStore;
use crate::types::SessionCode;

/// Default number of codes tried before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// Allocates session codes that are not in use
#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    max_attempts: usize,
}

impl CodeGenerator {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Insert `draft` into `store` under a fresh random code
    pub async fn allocate<S: SessionStore + ?Sized>(
        &self,
        store: &S,
        draft: Session,
    ) -> Result<Session, AppError> {
        self.allocate_with(store, draft, SessionCode::generate).await
    }

    /// Insert `draft` under the first free code produced by `candidate`
    pub async fn allocate_with<S, F>(
        &self,
        store: &S,
        mut draft: Session,
        mut candidate: F,
    ) -> Result<Session, AppError>
    where
        S: SessionStore + ?Sized,
        F: FnMut() -> SessionCode + Send,
    {
        for attempt in 1..=self.max_attempts {
            draft.code = candidate();
            match store.insert(&draft).await {
                Ok(()) => return Ok(draft),
                Err(AppError::DuplicateCode(code)) => {
                    debug!("Session code {} taken (attempt {})", code, attempt);
                }
                Err(e) => return Err(e),
            }
        }

        error!("Session code space exhausted after {} attempts", self.max_attempts);
        Err(AppError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}
