//! Session coordinator
//!
//! Creates sessions and routes every other command straight to the worker
//! that owns the session code. The coordinator is a cheap cloneable handle:
//! each caller looks the worker up in the shared [`WorkerRegistry`] and
//! waits only on its own reply, so a slow session never holds up commands
//! for any other session.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::codegen::CodeGenerator;
use crate::config::Config;
use crate::error::AppError;
use crate::message::Snapshot;
use crate::registry::WorkerRegistry;
use crate::session::Session;
use crate::store::SessionStore;
use crate::types::{Points, SessionCode};
use crate::worker::{Joined, SessionCommand, SessionWorker};

/// Times a command is re-sent after its worker retired under it
const ROUTE_ATTEMPTS: usize = 5;

/// Cloneable entry point for every session operation
///
/// Workers are spawned on creation, or lazily for sessions found in the
/// store without a running worker.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn SessionStore>,
    registry: Arc<WorkerRegistry>,
    codes: CodeGenerator,
    config: Arc<Config>,
}

impl Coordinator {
    pub fn new<S: SessionStore>(store: Arc<S>, config: Config) -> Self {
        info!("Coordinator ready");
        Self {
            store,
            registry: Arc::new(WorkerRegistry::new()),
            codes: CodeGenerator::new(config.max_code_attempts),
            config: Arc::new(config),
        }
    }

    /// Create a session and subscribe the caller to it
    pub async fn create(
        &self,
        player_names: Vec<String>,
        starting_score: Option<i64>,
    ) -> Result<Joined, AppError> {
        let starting_score =
            starting_score.unwrap_or_else(|| i64::from(self.config.default_starting_score));

        // Validate before spending attempts on a code
        let draft = Session::new(
            SessionCode(String::new()),
            player_names,
            starting_score,
            self.config.history_capacity,
        )?;

        let session = self.codes.allocate(self.store.as_ref(), draft).await?;
        info!(
            "Created session {} with {} players",
            session.code,
            session.players.len()
        );

        self.request(&session.code, |reply| SessionCommand::Join { reply })
            .await
    }

    pub async fn join(&self, code: &SessionCode) -> Result<Joined, AppError> {
        self.request(code, |reply| SessionCommand::Join { reply }).await
    }

    pub async fn start(&self, code: &SessionCode, expected_version: Option<u64>) -> Result<Snapshot, AppError> {
        self.request(code, |reply| SessionCommand::Start { expected_version, reply })
            .await
    }

    pub async fn throw(
        &self,
        code: &SessionCode,
        points: Points,
        expected_version: Option<u64>,
    ) -> Result<Snapshot, AppError> {
        self.request(code, |reply| SessionCommand::Throw {
            points,
            expected_version,
            reply,
        })
        .await
    }

    pub async fn undo(&self, code: &SessionCode, expected_version: Option<u64>) -> Result<Snapshot, AppError> {
        self.request(code, |reply| SessionCommand::Undo { expected_version, reply })
            .await
    }

    pub async fn next_player(
        &self,
        code: &SessionCode,
        expected_version: Option<u64>,
    ) -> Result<Snapshot, AppError> {
        self.request(code, |reply| SessionCommand::NextPlayer { expected_version, reply })
            .await
    }

    pub async fn reset(&self, code: &SessionCode, expected_version: Option<u64>) -> Result<Snapshot, AppError> {
        self.request(code, |reply| SessionCommand::Reset { expected_version, reply })
            .await
    }

    pub async fn sync(&self, code: &SessionCode) -> Result<Snapshot, AppError> {
        self.request(code, |reply| SessionCommand::Sync { reply }).await
    }

    /// Delete a session
    ///
    /// The worker finishes the commands queued ahead of the delete, removes
    /// the session, notifies its subscribers and retires.
    pub async fn delete(&self, code: &SessionCode) -> Result<(), AppError> {
        self.request(code, |reply| SessionCommand::Delete { reply }).await
    }

    /// Number of running session workers
    pub fn live_workers(&self) -> usize {
        self.registry.len()
    }

    /// Send a command to the worker for `code` and wait for its reply
    ///
    /// A command that reaches a retiring worker is dropped unprocessed, so
    /// it is safe to build and send it again to the next worker.
    async fn request<T, F>(&self, code: &SessionCode, make: F) -> Result<T, AppError>
    where
        F: Fn(oneshot::Sender<Result<T, AppError>>) -> SessionCommand,
    {
        for attempt in 1..=ROUTE_ATTEMPTS {
            let worker = self.worker(code).await?;
            let (reply, rx) = oneshot::channel();

            if worker.send(make(reply)).await.is_ok() {
                if let Ok(result) = rx.await {
                    return result;
                }
            }

            debug!("Worker for session {} retired (attempt {})", code, attempt);
            self.registry.remove_closed(code, &worker);
        }

        warn!("Gave up routing to session {} after {} attempts", code, ROUTE_ATTEMPTS);
        Err(AppError::ChannelSend)
    }

    /// Get the worker for a code, spawning one if the session is stored
    async fn worker(&self, code: &SessionCode) -> Result<mpsc::Sender<SessionCommand>, AppError> {
        if let Some(worker) = self.registry.get(code) {
            return Ok(worker);
        }

        if !self.store.exists(code).await? {
            debug!("Command for unknown session {}", code);
            return Err(AppError::SessionNotFound(code.to_string()));
        }

        Ok(self.registry.get_or_spawn(code, |id| {
            debug!("Spawning worker for session {}", code);
            SessionWorker::spawn(
                code.clone(),
                id,
                Arc::clone(&self.store),
                Arc::downgrade(&self.registry),
                &self.config,
            )
        }))
    }
}
