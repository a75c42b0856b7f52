//! Durable storage backing the in-memory cache.
//!
//! Two stores sit behind [`StoreAdapter`]:
//!
//! - [`DurableStore`]: SQLite via tokio-rusqlite, opened lazily, with one
//!   table per coarse category (settings, queues, bulk caches)
//! - [`FallbackStore`]: a flat string-keyed store persisted as a JSON file,
//!   used when the primary store has no entry or cannot be opened
//!
//! Every entry is `{key, value}` where `value` is a JSON document.

pub mod adapter;
pub mod connection;
pub mod fallback;
pub mod migrations;

pub use adapter::{StoreAdapter, StoreUsage};
pub use connection::DurableStore;
pub use fallback::FallbackStore;

/// Logical table of the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Plain key/value settings, flags and the version marker.
    KeyVal,
    /// Offline mutation queues.
    Queues,
    /// Bulk reference-data caches.
    Caches,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::KeyVal, Table::Queues, Table::Caches];

    /// SQL table name.
    pub fn name(self) -> &'static str {
        match self {
            Table::KeyVal => "keyval",
            Table::Queues => "queues",
            Table::Caches => "caches",
        }
    }
}
