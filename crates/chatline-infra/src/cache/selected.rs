//! Runtime choice of cache backend.
//!
//! The services are generic over `CacheBackend`; this enum lets the binary
//! pick Redis or the in-process map from configuration while keeping a
//! single concrete type.

use std::time::Duration;

use chatline_core::cache::{CacheBackend, MemoryCacheBackend};
use chatline_types::config::CacheConfig;
use chatline_types::error::CacheError;
use tracing::info;

use super::redis::RedisCacheBackend;

pub enum SelectedCacheBackend {
    Memory(MemoryCacheBackend),
    Redis(RedisCacheBackend),
}

impl SelectedCacheBackend {
    /// Redis when `config.url` is set, otherwise the in-process map.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        match config.url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => {
                info!("using redis conversation cache");
                Ok(Self::Redis(RedisCacheBackend::new(url)?))
            }
            None => {
                info!("using in-process conversation cache");
                Ok(Self::Memory(MemoryCacheBackend::new()))
            }
        }
    }
}

impl CacheBackend for SelectedCacheBackend {
    fn name(&self) -> &str {
        match self {
            Self::Memory(backend) => backend.name(),
            Self::Redis(backend) => backend.name(),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Memory(backend) => backend.get(key).await,
            Self::Redis(backend) => backend.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Memory(backend) => backend.set(key, value, ttl).await,
            Self::Redis(backend) => backend.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Memory(backend) => backend.delete(key).await,
            Self::Redis(backend) => backend.delete(key).await,
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        match self {
            Self::Memory(backend) => backend.keys(prefix).await,
            Self::Redis(backend) => backend.keys(prefix).await,
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        match self {
            Self::Memory(backend) => backend.ping().await,
            Self::Redis(backend) => backend.ping().await,
        }
    }
}
