//! Configuration loader for Chatline.
//!
//! Reads `config.toml` from the data directory (`~/.chatline/` in
//! production) and deserializes it into [`ChatlineConfig`]. Falls back to
//! defaults when the file is missing or malformed, then applies
//! `CHATLINE_*` environment overrides.

use std::path::{Path, PathBuf};

use chatline_types::config::ChatlineConfig;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "CHATLINE_DATA_DIR";

/// Resolve the data directory: `CHATLINE_DATA_DIR`, else `~/.chatline`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatline")
}

/// Load configuration from `{data_dir}/config.toml` and the environment.
pub async fn load_config(data_dir: &Path) -> ChatlineConfig {
    let mut config = load_config_file(data_dir).await;
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// Load `{data_dir}/config.toml` only.
///
/// - If the file does not exist, returns [`ChatlineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config_file(data_dir: &Path) -> ChatlineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ChatlineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ChatlineConfig::default();
        }
    };

    match toml::from_str::<ChatlineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ChatlineConfig::default()
        }
    }
}

/// Apply `CHATLINE_*` overrides read through `lookup`.
///
/// Empty values are ignored.
pub fn apply_overrides(config: &mut ChatlineConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = get("CHATLINE_CACHE_URL") {
        config.cache.url = Some(url);
    }
    if let Some(url) = get("CHATLINE_DATABASE_URL") {
        config.database.url = Some(url);
    }
    if let Some(url) = get("CHATLINE_COMPLETION_URL") {
        config.completion.endpoint = Some(url);
    }
    if let Some(key) = get("CHATLINE_COMPLETION_API_KEY") {
        config.completion.api_key = Some(key);
    }
}
