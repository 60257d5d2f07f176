//! Live operations of one connection.
//!
//! Mutated by the read loop (insert on `start`, remove on `stop`) and by
//! multiplexer tasks (remove on completion), so every access goes through one
//! mutex. The lock is never held across an `.await`.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Result of [`OperationRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Generation identifying this registration of the id.
    pub generation: u64,
    /// Whether a live operation with the same id was cancelled and replaced.
    pub replaced: bool,
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

/// Operation id → cancellation handle.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    inner: Mutex<Inner>,
}

impl OperationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. A live operation already using `id` is cancelled.
    pub fn insert(&self, id: &str, cancel: CancellationToken) -> Registration {
        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let previous = inner
            .entries
            .insert(id.to_owned(), Entry { generation, cancel });
        let replaced = match previous {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        };
        Registration {
            generation,
            replaced,
        }
    }

    /// Remove `id` regardless of generation, returning its handle.
    pub fn remove(&self, id: &str) -> Option<CancellationToken> {
        self.inner.lock().entries.remove(id).map(|entry| entry.cancel)
    }

    /// Remove `id` only if it is still the registration `generation`.
    ///
    /// Returns `true` when the entry was removed by this call.
    pub fn remove_if_current(&self, id: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get(id) {
            Some(entry) if entry.generation == generation => {
                let _ = inner.entries.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    /// Number of live operations.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no operation is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel and remove every operation, returning how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.inner.lock().entries.drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.cancel.cancel();
        }
        drained.len()
    }
}
