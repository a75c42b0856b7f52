//! Startup lifecycle: hydration, version check and readiness.
//!
//! ```text
//! Uninitialized -> Hydrating -> VersionMismatch -> Wiping -> Stamped -> Ready
//!                            \-> VersionMatch ------------/
//! ```
//!
//! A version mismatch resets reference-data and session slots to their
//! defaults. Queues, sync totals and settings are kept: they hold user work
//! and preferences that no server fetch can restore.

use super::{OfflineCache, Slot, Slots};

/// Where the cache is in its startup lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Hydrating,
    /// The stored stamp differs from the running schema version (0 = never stamped).
    VersionMismatch { stored: u32 },
    VersionMatch,
    Wiping,
    Stamped,
    Ready,
}

impl LifecycleState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, Hydrating)
                | (Hydrating, VersionMismatch { .. })
                | (Hydrating, VersionMatch)
                | (VersionMismatch { .. }, Wiping)
                | (Wiping, Stamped)
                | (VersionMatch, Stamped)
                | (Stamped, Ready)
        )
    }
}

impl OfflineCache {
    /// Current lifecycle state.
    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Whether hydration and the version check have completed.
    pub fn is_cache_ready(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Ready
    }

    /// Resolve once the cache is ready.
    pub async fn wait_ready(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only errors if the cache is gone.
        let _ = rx.wait_for(|state| *state == LifecycleState::Ready).await;
    }

    fn transition(&self, next: LifecycleState) {
        let current = self.lifecycle_state();
        debug_assert!(current.can_transition_to(next), "illegal lifecycle transition {current:?} -> {next:?}");
        tracing::debug!(from = ?current, to = ?next, "cache lifecycle transition");
        self.state.send_replace(next);
    }

    /// Run the startup lifecycle: start the persistence worker, hydrate every
    /// slot, check the version stamp and signal readiness.
    ///
    /// Calling this on a cache that already left `Uninitialized` does nothing.
    pub async fn initialize(&self) {
        if self.lifecycle_state() != LifecycleState::Uninitialized {
            return;
        }
        self.persist.start();

        self.transition(LifecycleState::Hydrating);
        self.hydrate().await;

        let stored = self.read(|s| s.cache_version);
        if stored == self.schema_version {
            self.transition(LifecycleState::VersionMatch);
        } else {
            self.transition(LifecycleState::VersionMismatch { stored });
            self.transition(LifecycleState::Wiping);
            self.wipe_for_version_change(stored);
        }
        self.transition(LifecycleState::Stamped);
        self.transition(LifecycleState::Ready);
        tracing::info!(version = self.schema_version, "offline cache ready");
    }

    /// Load every slot from the store. The durable copy is tried first and
    /// the fallback mirror second; the first one that decodes into the slot's
    /// type wins, and a slot with neither keeps its default.
    async fn hydrate(&self) {
        let mut loaded = Slots::default();
        let mut hits = 0usize;
        for &slot in Slot::ALL {
            if let Some(value) = self.store.get_durable(slot.table(), slot.key()).await {
                match loaded.load(slot, value) {
                    Ok(()) => {
                        hits += 1;
                        continue;
                    }
                    Err(e) => tracing::warn!(
                        slot = slot.key(),
                        error = %e,
                        "durable slot has an unexpected shape, trying fallback"
                    ),
                }
            }
            let Some(value) = self.store.get_fallback(slot.key()) else {
                continue;
            };
            match loaded.load(slot, value) {
                Ok(()) => hits += 1,
                Err(e) => {
                    tracing::warn!(slot = slot.key(), error = %e, "fallback slot is misshapen, using default")
                }
            }
        }
        tracing::debug!(hydrated = hits, total = Slot::ALL.len(), "cache hydrated");
        self.replace_all(|slots| *slots = loaded);
    }

    fn wipe_for_version_change(&self, stored: u32) {
        let stale_entries = self.read(|s| {
            let version = self.schema_version;
            s.offline_invoices.iter().filter(|e| e.schema_version != version).count()
                + s.offline_customers.iter().filter(|e| e.schema_version != version).count()
                + s.offline_payments.iter().filter(|e| e.schema_version != version).count()
        });
        if stale_entries > 0 {
            tracing::warn!(
                entries = stale_entries,
                stored_version = stored,
                version = self.schema_version,
                "queued mutations were created under another cache version and will be submitted unchanged"
            );
        }

        let removed = self.store.clear_fallback();
        let wiped: Vec<Slot> = Slot::ALL.iter().copied().filter(|s| !s.survives_version_change()).collect();
        self.update_many(Slot::ALL, |slots| {
            for &slot in &wiped {
                slots.reset(slot);
            }
            slots.cache_version = self.schema_version;
        });
        tracing::info!(
            stored_version = stored,
            version = self.schema_version,
            wiped_slots = wiped.len(),
            fallback_keys_removed = removed,
            "cache version changed, reference data reset"
        );
    }
}
