//! Configuration types for Chatline.
//!
//! `ChatlineConfig` represents the top-level `config.toml`. Every field has
//! a default, so an empty file (or no file) yields a working single-node
//! setup: in-process cache, SQLite store, no assistant replies.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatlineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl ChatlineConfig {
    /// Reject values that would leave the service unable to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.cache.ttl_secs == 0 {
            return invalid("cache.ttl_secs", "must be greater than zero");
        }
        if self.cache.window_size == 0 {
            return invalid("cache.window_size", "must be greater than zero");
        }
        if self.cache.key_prefix.is_empty() || self.cache.key_prefix.contains(':') {
            return invalid("cache.key_prefix", "must be non-empty and contain no ':'");
        }
        if self.realtime.outbound_buffer == 0 {
            return invalid("realtime.outbound_buffer", "must be greater than zero");
        }
        if self.realtime.max_message_chars == 0 {
            return invalid("realtime.max_message_chars", "must be greater than zero");
        }
        Ok(())
    }
}

/// Conversation cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL. When unset the in-process cache is used.
    #[serde(default)]
    pub url: Option<String>,

    /// Time-to-live of message and metadata entries, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Namespace prefix for every cache key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Number of most recent messages kept per conversation.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Upper bound on a single backend call, in milliseconds.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// How long a Down cache is left alone before it is probed again.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_key_prefix() -> String {
    "chatline".to_string()
}

fn default_window_size() -> usize {
    50
}

fn default_op_timeout_ms() -> u64 {
    500
}

fn default_retry_interval_secs() -> u64 {
    5
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
            window_size: default_window_size(),
            op_timeout_ms: default_op_timeout_ms(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

/// Whether a sender receives its own message back in the broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoPolicy {
    #[default]
    Include,
    Skip,
}

/// Real-time delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Maximum time a single frame may wait for room in a connection's
    /// outbound queue before the connection is closed.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Connections with no inbound frame for this long are closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Capacity of each connection's outbound frame queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    #[serde(default)]
    pub echo: EchoPolicy,

    /// Longest accepted message, in characters.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_send_timeout_ms() -> u64 {
    3000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_max_message_chars() -> usize {
    8000
}

impl RealtimeConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            outbound_buffer: default_outbound_buffer(),
            echo: EchoPolicy::default(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Assistant reply settings. Replies are disabled unless `endpoint` is set.
#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Number of recent messages sent as context.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_context_messages() -> usize {
    20
}

fn default_completion_timeout_secs() -> u64 {
    60
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_model(),
            api_key: None,
            system_prompt: None,
            context_messages: default_context_messages(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("system_prompt", &self.system_prompt)
            .field("context_messages", &self.context_messages)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Durable store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL. Defaults to `chatline.db` in the data directory.
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ChatlineConfig::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.key_prefix, "chatline");
        assert_eq!(config.realtime.send_timeout(), Duration::from_secs(3));
        assert_eq!(config.realtime.echo, EchoPolicy::Include);
        assert!(!config.completion.is_enabled());
    }

    #[test]
    fn test_deserialize_empty() {
        let config: ChatlineConfig = toml::from_str("").unwrap();
        assert_eq!(config.cache.window_size, 50);
        assert!(config.cache.url.is_none());
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_deserialize_with_values() {
        let toml_str = r#"
[cache]
url = "redis://127.0.0.1:6379/0"
ttl_secs = 120

[realtime]
echo = "skip"
send_timeout_ms = 250

[completion]
endpoint = "http://localhost:11434"
api_key = "sk-test"
"#;
        let config: ChatlineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache.url.as_deref(), Some("redis://127.0.0.1:6379/0"));
        assert_eq!(config.cache.ttl_secs, 120);
        assert_eq!(config.cache.key_prefix, "chatline");
        assert_eq!(config.realtime.echo, EchoPolicy::Skip);
        assert_eq!(config.realtime.send_timeout(), Duration::from_millis(250));
        assert!(config.completion.is_enabled());
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(ChatlineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = ChatlineConfig::default();
        config.cache.window_size = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "cache.window_size",
                reason: "must be greater than zero"
            })
        );
    }

    #[test]
    fn test_validate_rejects_separator_in_prefix() {
        let mut config = ChatlineConfig::default();
        config.cache.key_prefix = "chat:line".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_redacted_and_not_serialized() {
        let config = CompletionConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
        assert!(!serde_json::to_string(&config).unwrap().contains("sk-secret"));
    }
}
