//! In-process cache backend.
//!
//! Used when no remote cache is configured and by tests. Expired entries
//! are dropped lazily when they are read or listed.

use std::time::{Duration, Instant};

use chatline_types::error::CacheError;
use dashmap::DashMap;

use super::backend::CacheBackend;

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Concurrent in-memory key-value store with per-key expiry.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, StoredValue>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expired_value_is_absent_and_swept() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k", "v".to_string(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn keys_filters_by_prefix_and_expiry() {
        let backend = MemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("p:messages:a", "1".into(), ttl).await.unwrap();
        backend.set("p:messages:b", "2".into(), ttl).await.unwrap();
        backend.set("p:metadata:a", "3".into(), ttl).await.unwrap();
        backend
            .set("p:messages:gone", "4".into(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let keys = backend.keys("p:messages:").await.unwrap();
        assert_eq!(keys, vec!["p:messages:a".to_string(), "p:messages:b".to_string()]);
    }
}
