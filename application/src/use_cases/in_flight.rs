//! In-flight registry
//!
//! Query identity to the cancel handle of its one running execution. The
//! lock is only held for map operations, never across an await.

use conductor_domain::QueryKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    generations: AtomicU64,
    released: Notify,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new execution for `key`.
    ///
    /// Returns `None` while another execution for the key is registered.
    pub fn try_insert(self: &Arc<Self>, key: &QueryKey) -> Option<InFlightGuard> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(key) {
            return None;
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        entries.insert(
            key.clone(),
            Entry {
                generation,
                token: token.clone(),
            },
        );

        Some(InFlightGuard {
            registry: Arc::clone(self),
            key: key.clone(),
            generation,
            token,
        })
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `generation` is the execution currently registered for `key`.
    pub fn is_current(&self, key: &QueryKey, generation: u64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|e| e.generation == generation)
    }

    /// Cancel and forget the execution for `key`. Returns whether one existed.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);

        match removed {
            Some(entry) => {
                debug!("Cancelling in-flight execution of {}", key);
                entry.token.cancel();
                self.released.notify_waiters();
                true
            }
            None => false,
        }
    }

    /// Wait until no execution is registered for `key`.
    pub async fn wait_released(&self, key: &QueryKey) {
        loop {
            let released = self.released.notified();
            if !self.contains(key) {
                return;
            }
            released.await;
        }
    }

    fn release(&self, key: &QueryKey, generation: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer execution may have replaced a cancelled one.
        if entries.get(key).is_some_and(|e| e.generation == generation) {
            entries.remove(key);
        }
        drop(entries);
        self.released.notify_waiters();
    }
}

/// Keeps an execution registered; releases it on drop, panics included.
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: QueryKey,
    generation: u64,
    token: CancellationToken,
}

impl InFlightGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.generation);
    }
}
