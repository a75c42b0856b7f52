//! Frappe client error types.

use std::sync::Arc;

use posa_offline_core::ConfigError;

/// Errors from the Frappe RPC client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Backend settings missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// Authentication failed (invalid API key or secret).
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// The method raised a server-side exception.
    #[error("server error ({exc_type}): {message}")]
    Server { exc_type: String, message: String },

    /// HTTP error response without a parseable exception.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ClientError::Timeout } else { ClientError::Network(Arc::new(err)) }
    }
}

impl From<ClientError> for posa_offline_core::Error {
    fn from(err: ClientError) -> Self {
        posa_offline_core::Error::Backend(err.to_string())
    }
}
