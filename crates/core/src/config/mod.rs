//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (POSA_OFFLINE_*)
//! 2. TOML config file (if POSA_OFFLINE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Default maximum length of each mutation queue.
pub const MAX_QUEUE_ITEMS: usize = 1000;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (POSA_OFFLINE_*)
/// 2. TOML config file (if POSA_OFFLINE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite durable store.
    ///
    /// Set via POSA_OFFLINE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Path to the JSON file backing the flat fallback store.
    ///
    /// Set via POSA_OFFLINE_FALLBACK_PATH environment variable.
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,

    /// Namespace prefix for fallback-store keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Maximum entries kept per mutation queue before head truncation.
    ///
    /// Set via POSA_OFFLINE_MAX_QUEUE_ITEMS environment variable.
    #[serde(default = "default_max_queue_items")]
    pub max_queue_items: usize,

    /// Storage budget used for the cache usage percentage.
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: u64,

    /// Hard quota of the fallback store; writes beyond it are dropped.
    #[serde(default = "default_fallback_quota_bytes")]
    pub fallback_quota_bytes: u64,

    /// POS profile used for stock lookups.
    #[serde(default)]
    pub pos_profile: Option<String>,

    /// Base URL of the backend (e.g. `https://erp.example.com`).
    ///
    /// Set via POSA_OFFLINE_BACKEND_URL environment variable.
    #[serde(default)]
    pub backend_url: Option<String>,

    /// API key for token authentication against the backend.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API secret for token authentication against the backend.
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Backend request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./posa-offline.sqlite")
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("./posa-offline-fallback.json")
}

fn default_key_prefix() -> String {
    "posa_".into()
}

fn default_max_queue_items() -> usize {
    MAX_QUEUE_ITEMS
}

fn default_storage_quota_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_fallback_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            fallback_path: default_fallback_path(),
            key_prefix: default_key_prefix(),
            max_queue_items: default_max_queue_items(),
            storage_quota_bytes: default_storage_quota_bytes(),
            fallback_quota_bytes: default_fallback_quota_bytes(),
            pos_profile: None,
            backend_url: None,
            api_key: None,
            api_secret: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Backend connection settings extracted from [`AppConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings<'a> {
    pub url: &'a str,
    pub api_key: &'a str,
    pub api_secret: &'a str,
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration file cannot be read,
    /// environment variables cannot be parsed, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("POSA_OFFLINE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("POSA_OFFLINE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Backend URL and credentials, required only by commands that talk to the server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` naming the first absent field.
    pub fn require_backend(&self) -> Result<BackendSettings<'_>, ConfigError> {
        let url = self.backend_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "backend_url".into(),
            hint: "Set POSA_OFFLINE_BACKEND_URL environment variable".into(),
        })?;
        let api_key = self.api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_key".into(),
            hint: "Set POSA_OFFLINE_API_KEY environment variable".into(),
        })?;
        let api_secret = self.api_secret.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_secret".into(),
            hint: "Set POSA_OFFLINE_API_SECRET environment variable".into(),
        })?;
        Ok(BackendSettings { url, api_key, api_secret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./posa-offline.sqlite"));
        assert_eq!(config.key_prefix, "posa_");
        assert_eq!(config.max_queue_items, 1000);
        assert_eq!(config.storage_quota_bytes, 50 * 1024 * 1024);
        assert_eq!(config.fallback_quota_bytes, 5 * 1024 * 1024);
        assert!(config.pos_profile.is_none());
        assert!(config.backend_url.is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_require_backend_missing() {
        let config = AppConfig { backend_url: Some("https://erp.test".into()), ..Default::default() };
        let result = config.require_backend();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "api_key"));
    }

    #[test]
    fn test_require_backend_present() {
        let config = AppConfig {
            backend_url: Some("https://erp.test".into()),
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            ..Default::default()
        };
        let settings = config.require_backend().unwrap();
        assert_eq!(settings.url, "https://erp.test");
        assert_eq!(settings.api_secret, "secret");
    }
}
