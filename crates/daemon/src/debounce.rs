// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed delayed execution.
//!
//! `debounce(key, f)` cancels any pending callback for `key` and schedules
//! `f` after the configured delay. For any key there is at most one pending
//! callback, and two callbacks for the same key never run concurrently;
//! callbacks for distinct keys may overlap on the worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Entry {
    /// Bumped on every submit/cancel; a timer only fires if it still holds
    /// the generation it was scheduled with.
    generation: u64,
    pending: bool,
    handle: Option<JoinHandle<()>>,
    /// Serializes same-key executions (a superseded timer past its sleep
    /// cannot be aborted mid-callback).
    run_lock: Arc<AsyncMutex<()>>,
}

/// Coalesces repeated submissions under a key into one delayed execution.
pub struct Debouncer {
    delay: Duration,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Schedule `f` to run after the delay, superseding any pending
    /// callback for the same key.
    pub fn debounce<F>(&self, key: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_default();
        entry.generation += 1;
        entry.pending = true;
        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }

        let generation = entry.generation;
        let run_lock = Arc::clone(&entry.run_lock);
        let map = Arc::clone(&self.entries);
        let key = key.to_string();
        let delay = self.delay;

        entry.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _guard = run_lock.lock().await;

            let should_run = {
                let mut entries = map.lock();
                match entries.get_mut(&key) {
                    Some(entry) if entry.generation == generation => {
                        entry.pending = false;
                        true
                    }
                    _ => false,
                }
            };
            if !should_run {
                return;
            }

            f();

            let mut entries = map.lock();
            if let Some(entry) = entries.get(&key) {
                if entry.generation == generation {
                    entries.remove(&key);
                }
            }
        }));
    }

    /// Drop any pending callback for `key`.
    pub fn cancel(&self, key: &str) {
        let mut entries = self.entries.lock();
        if let Some(mut entry) = entries.remove(key) {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
    }

    /// Drop every pending callback.
    pub fn cancel_all(&self) {
        let mut entries = self.entries.lock();
        for (_, mut entry) in entries.drain() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.entries.lock().get(key).map(|e| e.pending).unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod tests;
