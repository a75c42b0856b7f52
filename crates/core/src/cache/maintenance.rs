//! Destructive clears, health checks and usage estimates.

use super::{OfflineCache, Slot, Slots};
use crate::Error;
use crate::types::CacheUsage;

impl OfflineCache {
    /// Confirm the durable store answers, reopening the handle once if it does not.
    pub async fn check_db_health(&self) -> Result<(), Error> {
        if let Err(e) = self.store.check_health().await {
            tracing::warn!(error = %e, "durable store unhealthy, reopening");
            self.store.close().await;
            return self.store.check_health().await;
        }
        Ok(())
    }

    /// Delete everything: durable database, fallback keys and memory,
    /// including queued mutations. The store is reopened and the version
    /// stamped again before returning.
    ///
    /// Memory and fallback are cleared even if the database could not be
    /// deleted; that error is returned afterwards.
    pub async fn clear_all_cache(&self) -> Result<(), Error> {
        let _sync = self.sync_lock.lock().await;
        let result = self.recreate_database().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "failed to clear durable store");
        }
        self.persist.start();
        self.wipe_memory_and_fallback();
        tracing::info!("offline cache cleared");
        result
    }

    async fn recreate_database(&self) -> Result<(), Error> {
        self.check_db_health().await?;
        self.persist.flush().await;
        self.persist.terminate();
        self.store.close().await;
        self.store.delete_database().await?;
        self.store.check_health().await
    }

    /// Like [`clear_all_cache`](Self::clear_all_cache) without the health
    /// check or the eager reopen; the store reopens lazily on the next write.
    pub async fn force_clear_all_cache(&self) -> Result<(), Error> {
        let _sync = self.sync_lock.lock().await;
        self.persist.flush().await;
        self.persist.terminate();
        self.replace_all(|s| *s = Slots::default());
        self.store.clear_fallback();

        let result = self.store.delete_database().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "failed to delete durable store");
        }
        self.persist.start();
        self.stamp_version();
        tracing::info!("offline cache force-cleared");
        result
    }

    fn wipe_memory_and_fallback(&self) {
        self.store.clear_fallback();
        self.replace_all(|s| *s = Slots::default());
        self.stamp_version();
    }

    fn stamp_version(&self) {
        let version = self.schema_version;
        self.update(Slot::CacheVersion, |s| s.cache_version = version);
    }

    /// Estimated storage footprint, counting two bytes per UTF-16 code unit.
    ///
    /// The percentage is relative to the configured storage budget and
    /// capped at 100.
    pub async fn cache_usage_estimate(&self) -> CacheUsage {
        if let Err(e) = self.check_db_health().await {
            tracing::warn!(error = %e, "durable store unavailable, usage covers the fallback store only");
        }
        let usage = self.store.usage().await;
        let total = usage.local_bytes + usage.durable_bytes;
        let quota = self.options.storage_quota_bytes.max(1);
        let percentage = ((total as f64 / quota as f64) * 100.0).round().min(100.0) as u8;
        CacheUsage { total, local_bytes: usage.local_bytes, durable_bytes: usage.durable_bytes, percentage }
    }
}
