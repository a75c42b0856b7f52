//! In-memory cache context.
//!
//! [`OfflineCache`] owns every slot value and is the only thing business
//! code reads from. Reads are synchronous; every write replaces the slot
//! under a write lock and schedules a persist job before the lock is
//! released, so persist jobs for a slot are sent in the order the writes
//! happened.
//!
//! The accessor methods are spread over submodules by concern:
//!
//! - `lifecycle`: hydration, version check and readiness
//! - `queues`: the three mutation queues
//! - `reference`: reference-data, session and settings slots
//! - `stock`: the local stock projection
//! - `maintenance`: full clears and usage estimates
//!
//! Queue draining lives in [`crate::sync`].

mod lifecycle;
mod maintenance;
mod queues;
mod reference;
mod slots;
mod stock;

pub use lifecycle::LifecycleState;
pub use queues::{Enqueued, QueueKind};
pub use slots::{Slot, SlotKind, Slots};

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, watch};

use crate::config::AppConfig;
use crate::persist::PersistChannel;
use crate::store::{DurableStore, FallbackStore, StoreAdapter};

/// Cache schema version of this build. Bump whenever a slot's stored shape changes.
pub const CACHE_VERSION: u32 = 1;

/// Tunables of the cache taken from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_queue_items: usize,
    pub storage_quota_bytes: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CacheOptions {
    fn from(config: &AppConfig) -> Self {
        Self { max_queue_items: config.max_queue_items, storage_quota_bytes: config.storage_quota_bytes }
    }
}

/// The offline cache: in-memory slots, their durable mirror and the
/// persistence channel between them.
pub struct OfflineCache {
    slots: RwLock<Slots>,
    store: Arc<StoreAdapter>,
    persist: PersistChannel,
    options: CacheOptions,
    schema_version: u32,
    state: watch::Sender<LifecycleState>,
    pub(crate) sync_lock: Mutex<()>,
}

impl OfflineCache {
    /// Create an uninitialized cache over `store`. Slots hold their defaults
    /// until [`initialize`](Self::initialize) hydrates them.
    pub fn new(store: Arc<StoreAdapter>, options: CacheOptions) -> Self {
        let persist = PersistChannel::new(Arc::clone(&store));
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            slots: RwLock::new(Slots::default()),
            store,
            persist,
            options,
            schema_version: CACHE_VERSION,
            state,
            sync_lock: Mutex::new(()),
        }
    }

    /// Override the schema version this cache stamps and compares against.
    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Open the stores named in `config` and run the startup lifecycle.
    ///
    /// Never fails: an unusable durable store degrades to fallback/in-memory
    /// operation and is logged.
    pub async fn open(config: &AppConfig) -> Self {
        let store = StoreAdapter::new(
            DurableStore::at_path(&config.db_path),
            FallbackStore::open(&config.fallback_path, config.fallback_quota_bytes),
            config.key_prefix.clone(),
        );
        let cache = Self::new(Arc::new(store), CacheOptions::from(config));
        cache.initialize().await;
        cache
    }

    /// Fully in-memory cache, initialized and ready.
    pub async fn open_in_memory() -> Self {
        let cache = Self::new(Arc::new(StoreAdapter::in_memory()), CacheOptions::default());
        cache.initialize().await;
        cache
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn store(&self) -> &Arc<StoreAdapter> {
        &self.store
    }

    /// Copy of every slot value.
    pub fn snapshot(&self) -> Slots {
        self.read(Slots::clone)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Slots) -> R) -> R {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        f(&slots)
    }

    /// Mutate `slot` and schedule its persistence.
    pub(crate) fn update<R>(&self, slot: Slot, f: impl FnOnce(&mut Slots) -> R) -> R {
        self.update_many(&[slot], f)
    }

    /// Mutate several slots at once and schedule persistence of each.
    pub(crate) fn update_many<R>(&self, touched: &[Slot], f: impl FnOnce(&mut Slots) -> R) -> R {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut slots);
        for &slot in touched {
            self.schedule(&slots, slot);
        }
        result
    }

    /// Replace all slots without persisting anything.
    pub(crate) fn replace_all(&self, f: impl FnOnce(&mut Slots)) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut slots);
    }

    fn schedule(&self, slots: &Slots, slot: Slot) {
        match slots.value_of(slot) {
            Ok(value) => self.persist.schedule_persist(slot, value),
            Err(e) => tracing::error!(slot = slot.key(), error = %e, "failed to encode slot for persistence"),
        }
    }

    /// Wait until every write made so far has reached the store adapter.
    pub async fn flush(&self) {
        self.persist.flush().await;
    }

    /// Flush pending writes and stop the persistence worker.
    pub async fn shutdown(&self) {
        self.persist.flush().await;
        self.persist.terminate();
        tracing::debug!("offline cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_persists_latest_value() {
        let cache = OfflineCache::open_in_memory().await;
        cache.set_tax_inclusive_setting(true);
        cache.set_tax_inclusive_setting(false);
        cache.set_tax_inclusive_setting(true);
        cache.flush().await;

        assert!(cache.tax_inclusive_setting());
        assert_eq!(cache.store().get(Table::KeyVal, "tax_inclusive").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_snapshot_is_consistent_copy() {
        let cache = OfflineCache::open_in_memory().await;
        let before = cache.snapshot();
        cache.set_manual_offline(true);
        assert!(!before.manual_offline);
        assert!(cache.snapshot().manual_offline);
    }
}
