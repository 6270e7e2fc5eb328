//! In-flight invalidation locks.
//!
//! A set of target keys; presence blocks a new invalidation for the same key.
//! There is no queue: a second request for a held key is rejected. Keys are
//! released when the [`LockGuard`] drops, so early returns, panics and
//! cancelled futures never leave a key held.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// `(page | global):(widget | all)`.
pub fn lock_key(page_id: Option<&str>, widget_id: Option<&str>) -> String {
    format!(
        "{}:{}",
        page_id.unwrap_or("global"),
        widget_id.unwrap_or("all")
    )
}

/// Shared set of in-flight keys.
#[derive(Debug, Clone, Default)]
pub struct InflightLocks {
    held: Arc<Mutex<BTreeSet<String>>>,
}

impl InflightLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take `key`, or `None` if it is already held.
    pub fn try_acquire(&self, key: &str) -> Option<LockGuard> {
        if self.lock().insert(key.to_string()) {
            Some(LockGuard {
                key: key.to_string(),
                held: Arc::clone(&self.held),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Currently held keys, sorted.
    pub fn held_keys(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Holds one key until dropped.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    held: Arc<Mutex<BTreeSet<String>>>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        tracing::trace!(lock_key = %self.key, "invalidation lock released");
    }
}
