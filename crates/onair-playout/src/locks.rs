//! Named mutual exclusion.
//!
//! Transitions on one rundown and timeline compiles for one studio must not
//! interleave. Each key gets its own mutex, created on first use and kept for
//! the life of the registry.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Registry of per-key mutexes.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The map shard is released before waiting on the mutex, so callers
    /// holding other keys never block each other.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();
        f()
    }

    /// Number of keys that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
