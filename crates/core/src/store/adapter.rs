//! Store adapter combining the durable store and the fallback store.
//!
//! This is the boundary where storage errors stop: reads return `None` on
//! failure and writes are logged by their callers, so business code never
//! sees a rejected storage operation.

use serde_json::Value;

use super::fallback::FallbackStore;
use super::{DurableStore, Table};
use crate::Error;
use crate::cache::Slot;

/// Byte counts of the two stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub local_bytes: u64,
    pub durable_bytes: u64,
}

/// Reads prefer the durable store; the fallback store answers only when the
/// durable store has no usable entry.
#[derive(Debug)]
pub struct StoreAdapter {
    durable: DurableStore,
    fallback: FallbackStore,
    prefix: String,
}

impl StoreAdapter {
    pub fn new(durable: DurableStore, fallback: FallbackStore, prefix: impl Into<String>) -> Self {
        Self { durable, fallback, prefix: prefix.into() }
    }

    /// Adapter over an in-memory durable store and a memory-only fallback store.
    pub fn in_memory() -> Self {
        Self::new(DurableStore::in_memory(), FallbackStore::in_memory(5 * 1024 * 1024), "posa_")
    }

    pub fn durable(&self) -> &DurableStore {
        &self.durable
    }

    pub fn fallback(&self) -> &FallbackStore {
        &self.fallback
    }

    /// Namespace prefix of fallback keys.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fallback key for a cache key.
    pub fn fallback_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    pub async fn is_open(&self) -> bool {
        self.durable.is_open().await
    }

    /// Read `key`, trying the durable store first and the fallback store second.
    ///
    /// Unavailable stores and undecodable entries are logged and treated as absent.
    pub async fn get(&self, table: Table, key: &str) -> Option<Value> {
        match self.get_durable(table, key).await {
            Some(value) => Some(value),
            None => self.get_fallback(key),
        }
    }

    /// Read `key` from the durable store only.
    pub async fn get_durable(&self, table: Table, key: &str) -> Option<Value> {
        let raw = match self.durable.get(table, key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(table = table.name(), key, error = %e, "durable store read failed");
                return None;
            }
        };
        match decode(key, &raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(table = table.name(), error = %err, "ignoring corrupt durable entry");
                None
            }
        }
    }

    /// Read the fallback mirror of `key` only.
    pub fn get_fallback(&self, key: &str) -> Option<Value> {
        let raw = self.fallback.get_item(&self.fallback_key(key))?;
        match decode(key, &raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring corrupt fallback entry");
                None
            }
        }
    }

    /// Write `value` under `key` in the durable store.
    pub async fn put(&self, table: Table, key: &str, value: &Value) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.durable.put(table, key, raw).await
    }

    /// Write the fallback mirror of one slot on the calling thread.
    pub fn mirror_slot(&self, slot: Slot, value: &Value) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.fallback.set_item(&self.fallback_key(slot.key()), raw)
    }

    /// Remove every fallback key under the namespace prefix.
    pub fn clear_fallback(&self) -> usize {
        match self.fallback.remove_prefixed(&self.prefix) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(error = %e, "failed to clear fallback store");
                0
            }
        }
    }

    /// Delete the durable database.
    pub async fn delete_database(&self) -> Result<(), Error> {
        self.durable.delete_database().await
    }

    /// Close the durable handle; it reopens on next use.
    pub async fn close(&self) {
        self.durable.close().await;
    }

    /// Open the durable store if needed and confirm it answers.
    pub async fn check_health(&self) -> Result<(), Error> {
        self.durable.get(Table::KeyVal, Slot::CacheVersion.key()).await.map(|_| ())
    }

    /// Byte usage of both stores. An unavailable durable store counts as empty.
    pub async fn usage(&self) -> StoreUsage {
        let local_bytes = self.fallback.usage_bytes(&self.prefix);
        let mut durable_bytes = 0;
        for table in Table::ALL {
            match self.durable.table_chars(table).await {
                Ok(chars) => durable_bytes += chars * 2,
                Err(e) => tracing::warn!(table = table.name(), error = %e, "failed to measure durable table"),
            }
        }
        StoreUsage { local_bytes, durable_bytes }
    }
}

fn decode(key: &str, raw: &str) -> Result<Value, Error> {
    serde_json::from_str(raw).map_err(|e| Error::CorruptEntry { key: key.to_string(), reason: e.to_string() })
}
