//! Live worker registry
//!
//! Maps session codes to the command sender of their worker. The lock only
//! guards the map; it is never held across an await, so looking up one
//! session never waits on another session's worker.
//!
//! Every slot carries an id. A retiring worker removes its own slot by id,
//! which leaves a newer worker for the same code untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::SessionCode;
use crate::worker::SessionCommand;

#[derive(Debug)]
struct WorkerSlot {
    id: u64,
    sender: mpsc::Sender<SessionCommand>,
}

/// Code -> worker map shared by every coordinator clone
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<SessionCode, WorkerSlot>>,
    next_id: AtomicU64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender of the live worker for `code`, if any
    pub fn get(&self, code: &SessionCode) -> Option<mpsc::Sender<SessionCommand>> {
        self.workers().get(code).map(|slot| slot.sender.clone())
    }

    /// Sender of the live worker for `code`, spawning one if there is none
    ///
    /// `spawn` receives the new slot id and runs under the map lock, so two
    /// callers racing on the same code end up with the same worker.
    pub fn get_or_spawn<F>(&self, code: &SessionCode, spawn: F) -> mpsc::Sender<SessionCommand>
    where
        F: FnOnce(u64) -> mpsc::Sender<SessionCommand>,
    {
        let mut workers = self.workers();
        workers
            .entry(code.clone())
            .or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                debug!("Registering worker {} for session {}", id, code);
                WorkerSlot {
                    id,
                    sender: spawn(id),
                }
            })
            .sender
            .clone()
    }

    /// Remove the slot for `code` if it still belongs to worker `id`
    pub fn remove(&self, code: &SessionCode, id: u64) -> bool {
        let mut workers = self.workers();
        if workers.get(code).map(|slot| slot.id) != Some(id) {
            return false;
        }
        workers.remove(code);
        debug!("Unregistered worker {} for session {}", id, code);
        true
    }

    /// Drop the slot for `code` if it holds `sender` and that worker is gone
    pub fn remove_closed(&self, code: &SessionCode, sender: &mpsc::Sender<SessionCommand>) -> bool {
        let mut workers = self.workers();
        let dead = match workers.get(code) {
            Some(slot) if slot.sender.same_channel(sender) && slot.sender.is_closed() => slot.id,
            _ => return false,
        };
        workers.remove(code);
        debug!("Dropped dead worker {} for session {}", dead, code);
        true
    }

    /// Number of live workers
    pub fn len(&self) -> usize {
        self.workers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers().is_empty()
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<SessionCode, WorkerSlot>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> SessionCode {
        SessionCode(raw.to_string())
    }

    #[test]
    fn test_get_or_spawn_spawns_once() {
        let registry = WorkerRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let mut spawned = 0;

        let first = registry.get_or_spawn(&code("ABCDEF"), |_| {
            spawned += 1;
            tx.clone()
        });
        let second = registry.get_or_spawn(&code("ABCDEF"), |_| {
            spawned += 1;
            tx.clone()
        });

        assert_eq!(spawned, 1);
        assert!(first.same_channel(&second));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&code("ABCDEF")).is_some());
        assert!(registry.get(&code("GHJKLM")).is_none());
    }

    #[test]
    fn test_remove_ignores_stale_id() {
        let registry = WorkerRegistry::new();
        let (old_tx, _old_rx) = mpsc::channel(1);
        let (new_tx, _new_rx) = mpsc::channel(1);

        let mut old_id = 0;
        registry.get_or_spawn(&code("ABCDEF"), |id| {
            old_id = id;
            old_tx
        });
        assert!(registry.remove(&code("ABCDEF"), old_id));

        registry.get_or_spawn(&code("ABCDEF"), |_| new_tx.clone());
        assert!(!registry.remove(&code("ABCDEF"), old_id));

        let live = registry.get(&code("ABCDEF")).unwrap();
        assert!(live.same_channel(&new_tx));
    }

    #[test]
    fn test_remove_closed_only_drops_dead_workers() {
        let registry = WorkerRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        registry.get_or_spawn(&code("ABCDEF"), |_| tx.clone());

        assert!(!registry.remove_closed(&code("ABCDEF"), &tx));
        assert_eq!(registry.len(), 1);

        drop(rx);
        assert!(registry.remove_closed(&code("ABCDEF"), &tx));
        assert!(registry.is_empty());
    }
}
