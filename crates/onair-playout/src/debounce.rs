//! Coalescing of bursty recompute requests.
//!
//! Ingest can touch the same rundown many times in quick succession. Each
//! touch calls [`Debouncer::schedule`]; only the last request for a key runs,
//! once the key has been quiet for the configured delay.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;

/// Per-key trailing-edge debouncer.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    /// Latest generation scheduled per key.
    generations: Arc<DashMap<String, u64>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generations: Arc::new(DashMap::new()),
        }
    }

    /// Schedule `job` for `key`, superseding any pending job for it.
    ///
    /// Outside a tokio runtime, or with a zero delay, the job runs inline.
    pub fn schedule<F>(&self, key: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = match Handle::try_current() {
            Ok(handle) if !self.delay.is_zero() => handle,
            _ => {
                job();
                return;
            }
        };

        let generation = {
            let mut entry = self.generations.entry(key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        tracing::debug!(key, generation, "Recompute scheduled");

        let generations = Arc::clone(&self.generations);
        let delay = self.delay;
        let key = key.to_string();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = generations.get(&key).map(|g| *g);
            if current != Some(generation) {
                return;
            }
            generations.remove_if(&key, |_, g| *g == generation);
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                tracing::error!(key = %key, "Debounced job panicked: {}", e);
            }
        });
    }

    /// Keys with a job waiting to run.
    pub fn pending(&self) -> usize {
        self.generations.len()
    }
}
