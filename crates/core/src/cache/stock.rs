//! Local stock projection.
//!
//! Entries are only created from server-confirmed quantities. Offline sales
//! decrement existing entries (never below zero) and leave unknown items
//! alone, since there is nothing trustworthy to decrement from.

use std::collections::BTreeMap;

use chrono::Utc;

use super::{OfflineCache, Slot};
use crate::backend::Backend;
use crate::types::{LineItem, StockEntry, StockQuantity, StockShortage};

/// Apply sold quantities to known entries. Returns how many entries changed.
pub(super) fn apply_sale(stock: &mut BTreeMap<String, StockEntry>, lines: &[LineItem]) -> usize {
    let now = Utc::now();
    let mut changed = 0;
    for line in lines {
        if let Some(entry) = stock.get_mut(&line.item_code) {
            entry.actual_qty = (entry.actual_qty - line.qty.abs()).max(0.0);
            entry.last_updated = now;
            changed += 1;
        }
    }
    changed
}

impl OfflineCache {
    /// Decrement cached stock for sold `items`.
    pub fn update_local_stock(&self, items: &[LineItem]) {
        if !self.read(|s| items.iter().any(|i| s.local_stock.contains_key(&i.item_code))) {
            return;
        }
        self.update(Slot::LocalStockCache, |s| apply_sale(&mut s.local_stock, items));
    }

    /// Cached quantity of `item_code`, if the server ever reported one.
    pub fn get_local_stock(&self, item_code: &str) -> Option<f64> {
        self.read(|s| s.local_stock.get(item_code).map(|e| e.actual_qty))
    }

    pub fn local_stock_cache(&self) -> BTreeMap<String, StockEntry> {
        self.read(|s| s.local_stock.clone())
    }

    pub fn set_local_stock_cache(&self, stock: BTreeMap<String, StockEntry>) {
        self.update(Slot::LocalStockCache, |s| s.local_stock = stock);
    }

    /// Drop the projection and mark it not ready, so the next read goes to the server.
    pub fn clear_local_stock_cache(&self) {
        self.update_many(&[Slot::LocalStockCache, Slot::StockCacheReady], |s| {
            s.local_stock.clear();
            s.stock_cache_ready = false;
        });
    }

    pub fn is_stock_cache_ready(&self) -> bool {
        self.read(|s| s.stock_cache_ready)
    }

    pub fn set_stock_cache_ready(&self, ready: bool) {
        self.update(Slot::StockCacheReady, |s| s.stock_cache_ready = ready);
    }

    /// Ask the backend for current quantities. Failures are logged and yield `None`.
    pub async fn fetch_item_stock_quantities(
        &self, backend: &dyn Backend, item_codes: &[String], pos_profile: &str,
    ) -> Option<Vec<StockQuantity>> {
        match backend.fetch_stock_quantities(item_codes, pos_profile).await {
            Ok(quantities) => Some(quantities),
            Err(e) => {
                tracing::error!(items = item_codes.len(), error = %e, "failed to fetch item stock quantities");
                None
            }
        }
    }

    /// Replace the projection with server quantities for `item_codes`.
    ///
    /// Returns false when the backend call failed or reported nothing; the
    /// existing projection is then left as it was.
    pub async fn initialize_stock_cache(&self, backend: &dyn Backend, item_codes: &[String], pos_profile: &str) -> bool {
        tracing::info!(items = item_codes.len(), "initializing stock cache");
        let Some(quantities) = self.fetch_item_stock_quantities(backend, item_codes, pos_profile).await else {
            return false;
        };
        if quantities.is_empty() {
            return false;
        }

        let now = Utc::now();
        let stock: BTreeMap<_, _> = quantities
            .into_iter()
            .filter_map(|q| q.actual_qty.map(|qty| (q.item_code, StockEntry { actual_qty: qty, last_updated: now })))
            .collect();
        let count = stock.len();
        self.update_many(&[Slot::LocalStockCache, Slot::StockCacheReady], |s| {
            s.local_stock = stock;
            s.stock_cache_ready = true;
        });
        tracing::info!(items = count, "stock cache initialized");
        true
    }

    /// Overwrite entries with server quantities, then apply the sold quantities.
    ///
    /// Lines whose item has no server quantity are skipped entirely.
    pub fn update_local_stock_with_actual_quantities(&self, invoice_items: &[LineItem], server_items: &[StockQuantity]) {
        let confirmed: Vec<(&LineItem, f64)> = invoice_items
            .iter()
            .filter_map(|line| {
                server_items
                    .iter()
                    .find(|s| s.item_code == line.item_code)
                    .and_then(|s| s.actual_qty)
                    .map(|qty| (line, qty))
            })
            .collect();
        if confirmed.is_empty() {
            return;
        }

        self.update(Slot::LocalStockCache, |s| {
            let now = Utc::now();
            for (line, server_qty) in confirmed {
                let qty = (server_qty - line.qty.abs()).max(0.0);
                s.local_stock.insert(line.item_code.clone(), StockEntry { actual_qty: qty, last_updated: now });
            }
        });
    }

    /// Lines that ask for more than the cached quantity. Items without a
    /// cached quantity are not reported.
    pub fn validate_stock_for_offline_invoice(&self, items: &[LineItem]) -> Vec<StockShortage> {
        self.read(|s| {
            items
                .iter()
                .filter_map(|line| {
                    let available = s.local_stock.get(&line.item_code)?.actual_qty;
                    let requested = line.qty.abs();
                    (requested > available).then(|| StockShortage {
                        item_code: line.item_code.clone(),
                        requested,
                        available,
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::types::InvoiceEntry;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StockBackend {
        quantities: Result<Vec<StockQuantity>, String>,
    }

    #[async_trait]
    impl Backend for StockBackend {
        async fn submit_invoice(&self, _entry: &InvoiceEntry) -> Result<Value, Error> {
            unreachable!()
        }
        async fn save_draft_invoice(&self, _invoice: &Value) -> Result<Value, Error> {
            unreachable!()
        }
        async fn create_customer(&self, _customer: &Value) -> Result<Value, Error> {
            unreachable!()
        }
        async fn submit_payment(&self, _payment: &Value) -> Result<Value, Error> {
            unreachable!()
        }
        async fn fetch_stock_quantities(&self, _codes: &[String], _profile: &str) -> Result<Vec<StockQuantity>, Error> {
            self.quantities.clone().map_err(Error::Backend)
        }
    }

    fn qty(code: &str, actual: Option<f64>) -> StockQuantity {
        StockQuantity { item_code: code.into(), actual_qty: actual }
    }

    fn seeded(entries: &[(&str, f64)]) -> BTreeMap<String, StockEntry> {
        entries
            .iter()
            .map(|(code, qty)| (code.to_string(), StockEntry { actual_qty: *qty, last_updated: Utc::now() }))
            .collect()
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let cache = OfflineCache::open_in_memory().await;
        cache.set_local_stock_cache(seeded(&[("A", 10.0), ("B", 4.0)]));

        cache.update_local_stock(&[LineItem::new("A", 12.0), LineItem::new("B", -1.5), LineItem::new("C", 1.0)]);

        assert_eq!(cache.get_local_stock("A"), Some(0.0));
        assert_eq!(cache.get_local_stock("B"), Some(2.5));
        assert_eq!(cache.get_local_stock("C"), None);
    }

    #[tokio::test]
    async fn test_initialize_stock_cache_skips_unknown_quantities() {
        let cache = OfflineCache::open_in_memory().await;
        let backend = StockBackend { quantities: Ok(vec![qty("A", Some(5.0)), qty("B", None)]) };

        assert!(cache.initialize_stock_cache(&backend, &["A".into(), "B".into()], "Main POS").await);
        assert!(cache.is_stock_cache_ready());
        assert_eq!(cache.get_local_stock("A"), Some(5.0));
        assert_eq!(cache.get_local_stock("B"), None);
    }

    #[tokio::test]
    async fn test_initialize_stock_cache_failure_keeps_projection() {
        let cache = OfflineCache::open_in_memory().await;
        cache.set_local_stock_cache(seeded(&[("A", 3.0)]));

        let failing = StockBackend { quantities: Err("timeout".into()) };
        assert!(!cache.initialize_stock_cache(&failing, &["A".into()], "Main POS").await);
        let empty = StockBackend { quantities: Ok(vec![]) };
        assert!(!cache.initialize_stock_cache(&empty, &["A".into()], "Main POS").await);

        assert_eq!(cache.get_local_stock("A"), Some(3.0));
    }

    #[tokio::test]
    async fn test_server_quantities_overwrite_before_decrement() {
        let cache = OfflineCache::open_in_memory().await;
        cache.set_local_stock_cache(seeded(&[("A", 1.0)]));

        cache.update_local_stock_with_actual_quantities(
            &[LineItem::new("A", 2.0), LineItem::new("B", 3.0), LineItem::new("C", 1.0)],
            &[qty("A", Some(20.0)), qty("B", Some(2.0)), qty("C", None)],
        );

        assert_eq!(cache.get_local_stock("A"), Some(18.0));
        assert_eq!(cache.get_local_stock("B"), Some(0.0));
        assert_eq!(cache.get_local_stock("C"), None);
    }

    #[tokio::test]
    async fn test_validate_stock_reports_shortages() {
        let cache = OfflineCache::open_in_memory().await;
        cache.set_local_stock_cache(seeded(&[("A", 2.0), ("B", 5.0)]));

        let shortages = cache.validate_stock_for_offline_invoice(&[
            LineItem::new("A", 3.0),
            LineItem::new("B", 5.0),
            LineItem::new("C", 100.0),
        ]);
        assert_eq!(shortages, vec![StockShortage { item_code: "A".into(), requested: 3.0, available: 2.0 }]);
    }

    #[tokio::test]
    async fn test_clear_resets_ready_flag() {
        let cache = OfflineCache::open_in_memory().await;
        cache.set_local_stock_cache(seeded(&[("A", 2.0)]));
        cache.set_stock_cache_ready(true);

        cache.clear_local_stock_cache();
        assert!(cache.local_stock_cache().is_empty());
        assert!(!cache.is_stock_cache_ready());
    }
}
