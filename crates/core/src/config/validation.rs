//! Configuration validation rules.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_queue_items` is 0
    /// - `storage_quota_bytes` or `fallback_quota_bytes` is 0
    /// - `key_prefix` is empty
    /// - `timeout_ms` is below 100ms or above 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("max_queue_items", self.max_queue_items as u64),
            ("storage_quota_bytes", self.storage_quota_bytes),
            ("fallback_quota_bytes", self.fallback_quota_bytes),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(field, "must be greater than 0"));
        }

        if self.key_prefix.is_empty() {
            return Err(invalid("key_prefix", "must not be empty"));
        }

        match self.timeout_ms {
            ..100 => return Err(invalid("timeout_ms", "must be at least 100ms")),
            300_001.. => return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)")),
            _ => {}
        }

        if self.max_queue_items > 10_000 {
            tracing::warn!(
                max_queue_items = self.max_queue_items,
                "queue limit is large; hydration and sync slow down with queue length"
            );
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.to_string(), reason: reason.to_string() }
}
