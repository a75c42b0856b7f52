//! Unified error types for the offline cache.
//!
//! Storage-layer variants are caught and logged at the adapter and channel
//! boundaries; only configuration, migration and explicit maintenance calls
//! surface them to callers.

use tokio_rusqlite::rusqlite;

/// Unified error type for the offline cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The durable store could not be opened (quota denial, unwritable path, ...).
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Schema migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded.
    #[error("CORRUPT_ENTRY: {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// A value could not be encoded for storage.
    #[error("SERIALIZATION: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write was rejected because the store is full.
    #[error("QUOTA_EXCEEDED: {0}")]
    QuotaExceeded(String),

    /// Filesystem error from the fallback store or database files.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// The persistence worker is gone.
    #[error("CHANNEL_CLOSED")]
    ChannelClosed,

    /// A backend call failed.
    #[error("BACKEND_ERROR: {0}")]
    Backend(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error means the store ran out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Error::QuotaExceeded(_) => true,
            Error::Database(tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(e, _))) => {
                e.code == rusqlite::ErrorCode::DiskFull
            }
            _ => false,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CorruptEntry { key: "items_storage".to_string(), reason: "expected array".to_string() };
        assert!(err.to_string().contains("CORRUPT_ENTRY"));
        assert!(err.to_string().contains("items_storage"));
    }

    #[test]
    fn test_quota_detection() {
        assert!(Error::QuotaExceeded("fallback".to_string()).is_quota_exceeded());
        assert!(!Error::ChannelClosed.is_quota_exceeded());

        let full = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(13), None);
        assert!(Error::from(full).is_quota_exceeded());
    }
}
