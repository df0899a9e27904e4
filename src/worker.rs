//! Per-session worker actor
//!
//! Each live session code has exactly one worker. The worker drains its
//! command channel one message at a time, so commands for the same
//! session never interleave, while workers of different sessions run
//! independently.
//!
//! The worker also owns the session's broadcast topic. Every committed
//! mutation is published there as a [`ServerMessage::GameState`].
//!
//! A worker retires when its session is deleted or missing, or when it has
//! been idle with nobody subscribed. It unregisters itself first and then
//! stops; commands still queued are dropped unprocessed and their callers
//! retry against a fresh worker.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine;
use crate::error::AppError;
use crate::message::{ServerMessage, Snapshot};
use crate::registry::WorkerRegistry;
use crate::session::Session;
use crate::store::SessionStore;
use crate::types::{Points, SessionCode};

/// Reply channel for commands that produce a snapshot
pub type SnapshotReply = oneshot::Sender<Result<Snapshot, AppError>>;

/// Result of joining a session: its state plus a live update stream
#[derive(Debug)]
pub struct Joined {
    pub snapshot: Snapshot,
    pub updates: broadcast::Receiver<ServerMessage>,
}

/// Commands handled by a session worker
#[derive(Debug)]
pub enum SessionCommand {
    /// Subscribe to the session (rejected once FINISHED)
    Join {
        reply: oneshot::Sender<Result<Joined, AppError>>,
    },
    Start {
        expected_version: Option<u64>,
        reply: SnapshotReply,
    },
    Throw {
        points: Points,
        expected_version: Option<u64>,
        reply: SnapshotReply,
    },
    Undo {
        expected_version: Option<u64>,
        reply: SnapshotReply,
    },
    NextPlayer {
        expected_version: Option<u64>,
        reply: SnapshotReply,
    },
    Reset {
        expected_version: Option<u64>,
        reply: SnapshotReply,
    },
    /// Re-broadcast the current state
    Sync { reply: SnapshotReply },
    /// Remove the session and stop the worker
    Delete {
        reply: oneshot::Sender<Result<(), AppError>>,
    },
}

impl SessionCommand {
    /// Answer the command with an error without running it
    pub fn reject(self, err: AppError) {
        match self {
            SessionCommand::Join { reply } => {
                let _ = reply.send(Err(err));
            }
            SessionCommand::Delete { reply } => {
                let _ = reply.send(Err(err));
            }
            SessionCommand::Start { reply, .. }
            | SessionCommand::Throw { reply, .. }
            | SessionCommand::Undo { reply, .. }
            | SessionCommand::NextPlayer { reply, .. }
            | SessionCommand::Reset { reply, .. }
            | SessionCommand::Sync { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Actor serializing all commands for one session
pub struct SessionWorker {
    code: SessionCode,
    /// Registry slot id, used to unregister only this worker
    id: u64,
    store: Arc<dyn SessionStore>,
    registry: Weak<WorkerRegistry>,
    updates: broadcast::Sender<ServerMessage>,
    receiver: mpsc::Receiver<SessionCommand>,
    idle_timeout: Duration,
}

impl SessionWorker {
    pub fn new(
        code: SessionCode,
        id: u64,
        store: Arc<dyn SessionStore>,
        registry: Weak<WorkerRegistry>,
        receiver: mpsc::Receiver<SessionCommand>,
        config: &Config,
    ) -> Self {
        let (updates, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            code,
            id,
            store,
            registry,
            updates,
            receiver,
            idle_timeout: config.worker_idle_timeout,
        }
    }

    /// Spawn a worker task and return its command sender
    pub fn spawn(
        code: SessionCode,
        id: u64,
        store: Arc<dyn SessionStore>,
        registry: Weak<WorkerRegistry>,
        config: &Config,
    ) -> mpsc::Sender<SessionCommand> {
        let (tx, rx) = mpsc::channel(config.session_buffer.max(1));
        let worker = Self::new(code, id, store, registry, rx, config);
        tokio::spawn(worker.run());
        tx
    }

    /// Run the worker event loop
    ///
    /// Ends when the session is gone, when the worker idles out with no
    /// subscribers, or when every sender is dropped.
    pub async fn run(mut self) {
        debug!("Worker for session {} started", self.code);

        loop {
            match time::timeout(self.idle_timeout, self.receiver.recv()).await {
                Ok(Some(cmd)) => {
                    if self.handle_command(cmd).await {
                        self.retire();
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) if self.updates.receiver_count() == 0 => {
                    debug!("Worker for session {} idle with no subscribers", self.code);
                    self.retire();
                    break;
                }
                Err(_) => {}
            }
        }

        debug!("Worker for session {} stopped", self.code);
    }

    /// Remove this worker from the registry
    fn retire(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.code, self.id);
        }
    }

    /// Process a single command, returning true once the session is gone
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Join { reply } => {
                let result = self.handle_join().await;
                answer(reply, result)
            }
            SessionCommand::Start {
                expected_version,
                reply,
            } => {
                let result = self
                    .mutate(expected_version, |session| {
                        engine::start(session)?;
                        Ok(Some("Game started!".to_string()))
                    })
                    .await;
                answer(reply, result)
            }
            SessionCommand::Throw {
                points,
                expected_version,
                reply,
            } => {
                let result = self
                    .mutate(expected_version, |session| {
                        let outcome = engine::apply_throw(session, points)?;
                        Ok(outcome.message())
                    })
                    .await;
                answer(reply, result)
            }
            SessionCommand::Undo {
                expected_version,
                reply,
            } => {
                let result = self
                    .mutate(expected_version, |session| {
                        engine::undo(session)?;
                        Ok(Some("Undo successful".to_string()))
                    })
                    .await;
                answer(reply, result)
            }
            SessionCommand::NextPlayer {
                expected_version,
                reply,
            } => {
                let result = self
                    .mutate(expected_version, |session| {
                        engine::next_player(session)?;
                        Ok(None)
                    })
                    .await;
                answer(reply, result)
            }
            SessionCommand::Reset {
                expected_version,
                reply,
            } => {
                let result = self
                    .mutate(expected_version, |session| {
                        engine::reset(session);
                        Ok(Some("Game reset".to_string()))
                    })
                    .await;
                answer(reply, result)
            }
            SessionCommand::Sync { reply } => {
                let result = self.handle_sync().await;
                answer(reply, result)
            }
            SessionCommand::Delete { reply } => {
                let result = self.handle_delete().await;
                let deleted = result.is_ok();
                answer(reply, result) || deleted
            }
        }
    }

    async fn handle_join(&mut self) -> Result<Joined, AppError> {
        let session = self.store.load(&self.code).await?;
        engine::ensure_joinable(&session)?;

        info!("Device joined session {}", self.code);
        Ok(Joined {
            snapshot: session.snapshot(None),
            updates: self.updates.subscribe(),
        })
    }

    async fn handle_sync(&mut self) -> Result<Snapshot, AppError> {
        let session = self.store.load(&self.code).await?;
        let snapshot = session.snapshot(None);
        self.publish(ServerMessage::GameState(snapshot.clone()));
        Ok(snapshot)
    }

    async fn handle_delete(&mut self) -> Result<(), AppError> {
        self.store.delete(&self.code).await?;
        info!("Deleted session {}", self.code);
        self.publish(ServerMessage::SessionDeleted {
            session_code: self.code.to_string(),
        });
        Ok(())
    }

    /// Load, check version, apply `op`, then commit, persist and publish
    ///
    /// `op` works on a loaded copy; nothing is saved unless it succeeds.
    async fn mutate<F>(&mut self, expected_version: Option<u64>, op: F) -> Result<Snapshot, AppError>
    where
        F: FnOnce(&mut Session) -> Result<Option<String>, AppError>,
    {
        let mut session = self.store.load(&self.code).await?;

        if let Err(e) = session.check_version(expected_version) {
            warn!("Rejected stale command for session {}: {}", self.code, e);
            return Err(e);
        }

        let message = op(&mut session).inspect_err(|e| {
            debug!("Command rejected for session {}: {}", self.code, e);
        })?;

        session.commit();
        self.store.save(&session).await?;

        let snapshot = session.snapshot(message);
        self.publish(ServerMessage::GameState(snapshot.clone()));
        Ok(snapshot)
    }

    fn publish(&self, msg: ServerMessage) {
        match self.updates.send(msg) {
            Ok(receivers) => debug!("Session {} update sent to {} subscribers", self.code, receivers),
            Err(_) => debug!("Session {} has no subscribers", self.code),
        }
    }
}

/// Send a command's result back, returning true if the session is gone
fn answer<T>(reply: oneshot::Sender<Result<T, AppError>>, result: Result<T, AppError>) -> bool {
    let gone = matches!(result, Err(AppError::SessionNotFound(_)));
    let _ = reply.send(result);
    gone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StatusKind;
    use crate::store::MemoryStore;

    fn code() -> SessionCode {
        SessionCode("TEST23".to_string())
    }

    fn test_config() -> Config {
        Config {
            session_buffer: 16,
            broadcast_capacity: 16,
            ..Config::default()
        }
    }

    async fn setup_with(
        players: &[&str],
        config: &Config,
    ) -> (Arc<MemoryStore>, mpsc::Sender<SessionCommand>) {
        let store = Arc::new(MemoryStore::new());
        let names = players.iter().map(|n| n.to_string()).collect();
        let session = Session::new(code(), names, 301, 32).unwrap();
        store.insert(&session).await.unwrap();
        let tx = SessionWorker::spawn(code(), 0, store.clone(), Weak::new(), config);
        (store, tx)
    }

    async fn setup(players: &[&str]) -> (Arc<MemoryStore>, mpsc::Sender<SessionCommand>) {
        setup_with(players, &test_config()).await
    }

    async fn join(tx: &mpsc::Sender<SessionCommand>) -> Result<Joined, AppError> {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Join { reply }).await.unwrap();
        rx.await.unwrap()
    }

    async fn start(tx: &mpsc::Sender<SessionCommand>) -> Result<Snapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Start {
            expected_version: None,
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    async fn throw(
        tx: &mpsc::Sender<SessionCommand>,
        points: i64,
        expected_version: Option<u64>,
    ) -> Result<Snapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Throw {
            points: Points::new(points).unwrap(),
            expected_version,
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    async fn undo(tx: &mpsc::Sender<SessionCommand>, expected_version: Option<u64>) -> Result<Snapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Undo { expected_version, reply })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn next_player(
        tx: &mpsc::Sender<SessionCommand>,
        expected_version: Option<u64>,
    ) -> Result<Snapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::NextPlayer { expected_version, reply })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn reset(tx: &mpsc::Sender<SessionCommand>, expected_version: Option<u64>) -> Result<Snapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Reset { expected_version, reply })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn next_state(joined: &mut Joined) -> Snapshot {
        match joined.updates.recv().await.unwrap() {
            ServerMessage::GameState(s) => s,
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mutations_bump_version_and_broadcast() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        let mut joined = join(&tx).await.unwrap();
        assert_eq!(joined.snapshot.version, 0);

        let started = start(&tx).await.unwrap();
        assert_eq!(started.version, 1);
        assert_eq!(started.status, StatusKind::Active);
        assert_eq!(started.message.as_deref(), Some("Game started!"));

        let thrown = throw(&tx, 60, Some(1)).await.unwrap();
        assert_eq!(thrown.version, 2);
        assert_eq!(thrown.players[0].score, 241);

        assert_eq!(next_state(&mut joined).await.version, 1);
        assert_eq!(next_state(&mut joined).await, thrown);

        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_undo_commits_and_broadcasts() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        start(&tx).await.unwrap();
        throw(&tx, 45, None).await.unwrap();
        let mut joined = join(&tx).await.unwrap();

        let undone = undo(&tx, Some(2)).await.unwrap();

        assert_eq!(undone.version, 3);
        assert_eq!(undone.message.as_deref(), Some("Undo successful"));
        assert_eq!(undone.players[0].score, 301);
        assert_eq!(undone.players[0].current_turn_points, 0);
        assert_eq!(undone.darts_thrown, 0);
        assert_eq!(next_state(&mut joined).await, undone);

        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 3);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn test_next_player_commits_and_broadcasts() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        start(&tx).await.unwrap();
        throw(&tx, 20, None).await.unwrap();
        let mut joined = join(&tx).await.unwrap();

        let advanced = next_player(&tx, Some(2)).await.unwrap();

        assert_eq!(advanced.version, 3);
        assert!(advanced.message.is_none());
        assert_eq!(advanced.current_player_index, 1);
        assert_eq!(advanced.darts_thrown, 0);
        assert_eq!(advanced.players[0].score, 281);
        assert_eq!(advanced.players[0].current_turn_points, 0);
        assert_eq!(next_state(&mut joined).await, advanced);

        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(stored.current_player_index, 1);
    }

    #[tokio::test]
    async fn test_reset_commits_and_broadcasts() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        start(&tx).await.unwrap();
        throw(&tx, 60, None).await.unwrap();
        throw(&tx, 60, None).await.unwrap();
        let mut joined = join(&tx).await.unwrap();

        let fresh = reset(&tx, Some(3)).await.unwrap();

        assert_eq!(fresh.version, 4);
        assert_eq!(fresh.message.as_deref(), Some("Game reset"));
        assert_eq!(fresh.status, StatusKind::Active);
        assert_eq!(fresh.current_player_index, 0);
        assert_eq!(fresh.darts_thrown, 0);
        assert!(fresh.players.iter().all(|p| p.score == 301 && p.current_turn_points == 0));
        assert_eq!(next_state(&mut joined).await, fresh);

        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 4);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_undo_and_next_do_not_commit() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;

        assert!(matches!(
            next_player(&tx, None).await,
            Err(AppError::InvalidState(_))
        ));
        start(&tx).await.unwrap();
        assert!(matches!(
            undo(&tx, None).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            reset(&tx, Some(0)).await,
            Err(AppError::VersionConflict {
                expected: 0,
                actual: 1
            })
        ));

        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.current_player_index, 0);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        start(&tx).await.unwrap();

        let result = throw(&tx, 20, Some(0)).await;

        assert!(matches!(
            result,
            Err(AppError::VersionConflict {
                expected: 0,
                actual: 1
            })
        ));
        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.players[0].score, 301);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_command_does_not_commit() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;

        let result = throw(&tx, 20, None).await;

        assert!(matches!(result, Err(AppError::InvalidState(_))));
        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 0);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_throws_serialized() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        start(&tx).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move { throw(&tx, 10, None).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = store.load(&code()).await.unwrap();
        assert_eq!(stored.version, 7);
        assert_eq!(stored.history.len(), 6);
        assert_eq!(stored.players[0].score, 271);
        assert_eq!(stored.players[1].score, 271);
        assert_eq!(stored.current_player_index, 0);
    }

    #[tokio::test]
    async fn test_delete_notifies_and_stops() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        let mut joined = join(&tx).await.unwrap();

        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Delete { reply }).await.unwrap();
        rx.await.unwrap().unwrap();

        assert!(store.is_empty());
        match joined.updates.recv().await.unwrap() {
            ServerMessage::SessionDeleted { session_code } => assert_eq!(session_code, "TEST23"),
            other => panic!("unexpected message {:?}", other),
        }
        assert!(matches!(
            joined.updates.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_missing_session_stops_worker() {
        let (store, tx) = setup(&["Alice", "Bob"]).await;
        store.delete(&code()).await.unwrap();

        assert!(matches!(start(&tx).await, Err(AppError::SessionNotFound(_))));

        time::sleep(Duration::from_millis(50)).await;
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_sync_does_not_bump_version() {
        let (_store, tx) = setup(&["Alice", "Bob"]).await;
        start(&tx).await.unwrap();

        let (reply, rx) = oneshot::channel();
        tx.send(SessionCommand::Sync { reply }).await.unwrap();
        let snapshot = rx.await.unwrap().unwrap();

        assert_eq!(snapshot.version, 1);
        assert!(snapshot.message.is_none());
    }

    #[tokio::test]
    async fn test_idle_worker_without_subscribers_stops() {
        let config = Config {
            worker_idle_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let (_store, tx) = setup_with(&["Alice", "Bob"], &config).await;
        start(&tx).await.unwrap();

        time::sleep(Duration::from_millis(200)).await;

        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_idle_worker_with_subscribers_keeps_running() {
        let config = Config {
            worker_idle_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let (_store, tx) = setup_with(&["Alice", "Bob"], &config).await;
        let _joined = join(&tx).await.unwrap();

        time::sleep(Duration::from_millis(200)).await;

        assert!(!tx.is_closed());
        assert_eq!(start(&tx).await.unwrap().version, 1);
    }
}
