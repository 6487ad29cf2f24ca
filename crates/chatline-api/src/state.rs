//! Application state wiring all services together.
//!
//! The core services are generic over store, cache backend and completion
//! provider; AppState pins them to the concrete infra implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chatline_core::cache::CacheLayer;
use chatline_core::conversation::ConversationCacheService;
use chatline_core::realtime::{ConnectionRegistry, Dispatcher};
use chatline_infra::cache::SelectedCacheBackend;
use chatline_infra::completion::HttpCompletionProvider;
use chatline_infra::config::{load_config, resolve_data_dir};
use chatline_infra::sqlite::conversation::SqliteConversationStore;
use chatline_infra::sqlite::pool::{default_database_url, DatabasePool};
use chatline_types::config::ChatlineConfig;
use chatline_types::error::CompletionError;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteConversationService =
    ConversationCacheService<SqliteConversationStore, SelectedCacheBackend>;

pub type ConcreteDispatcher =
    Dispatcher<SqliteConversationStore, SelectedCacheBackend, HttpCompletionProvider>;

/// Shared application state.
///
/// Used by both CLI commands and REST/WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: ConcreteDispatcher,
    pub config: Arc<ChatlineConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load configuration, and wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;
        Self::from_config(&data_dir, config).await
    }

    /// Wire services from an already-loaded configuration.
    pub async fn from_config(data_dir: &Path, config: ChatlineConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let db_url = config
            .database
            .url
            .clone()
            .unwrap_or_else(|| default_database_url(data_dir));
        let db_pool = DatabasePool::new(&db_url).await?;
        let store = Arc::new(SqliteConversationStore::new(db_pool));

        let backend = SelectedCacheBackend::from_config(&config.cache)?;
        let cache = CacheLayer::new(backend, &config.cache);
        let service = Arc::new(ConversationCacheService::new(store, cache, &config));

        let provider = match HttpCompletionProvider::new(&config.completion) {
            Ok(provider) => {
                tracing::info!(url = %provider.url(), "assistant replies enabled");
                Some(Arc::new(provider))
            }
            Err(CompletionError::Disabled) => None,
            Err(err) => return Err(err.into()),
        };

        let dispatcher = Dispatcher::new(service, Arc::new(ConnectionRegistry::new()), &config)
            .with_completion(provider);

        Ok(Self {
            dispatcher,
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn conversations(&self) -> &ConcreteConversationService {
        self.dispatcher.service()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// State over a throwaway SQLite file and the in-process cache.
    pub async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(dir.path(), ChatlineConfig::default())
            .await
            .unwrap();
        // Keep the directory alive for the duration of the test process.
        std::mem::forget(dir);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;

    #[tokio::test]
    async fn from_config_defaults_to_memory_cache() {
        let state = test_state().await;
        let status = state.conversations().cache_status().await;
        assert_eq!(status.backend, "memory");
        assert!(state.conversations().store_reachable().await);
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ChatlineConfig::default();
        config.cache.window_size = 0;
        assert!(AppState::from_config(dir.path(), config).await.is_err());
    }
}
