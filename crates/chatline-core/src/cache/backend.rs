//! CacheBackend trait definition.
//!
//! A backend is a plain string key-value store with per-key expiry. It
//! reports failures honestly; turning them into misses is the job of
//! [`CacheLayer`](super::CacheLayer).

use std::time::Duration;

use chatline_types::error::CacheError;

/// Raw key-value storage with TTL.
///
/// Implementations: [`MemoryCacheBackend`](super::MemoryCacheBackend) here,
/// `RedisCacheBackend` in chatline-infra.
pub trait CacheBackend: Send + Sync + 'static {
    /// Short backend name for status output (e.g., "memory", "redis").
    fn name(&self) -> &str;

    /// Fetch a value. `Ok(None)` when absent or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, CacheError>> + Send;

    /// Store a value that expires after `ttl`.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    /// Remove a key. Returns `true` if it existed.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, CacheError>> + Send;

    /// List live keys starting with `prefix`.
    fn keys(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, CacheError>> + Send;

    /// Reachability probe.
    fn ping(&self) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;
}
