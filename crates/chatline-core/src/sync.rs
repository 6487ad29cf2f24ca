//! Per-key async mutual exclusion.
//!
//! `KeyedLocks` hands out one async mutex per key, created on demand and
//! dropped again once nobody holds or waits on it, so the map only ever
//! contains keys with in-flight work.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A set of async mutexes addressed by key.
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyedGuard<K> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            guard: Some(guard),
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of keys that currently have a holder or waiter.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

/// Exclusive access to one key; released on drop.
pub struct KeyedGuard<K: Eq + Hash + Clone> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference when
        // nobody else is queued on this key.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
