//! Queue draining.
//!
//! A sync takes a snapshot of one queue, submits the entries one at a time in
//! queue order and then removes the entries that reached a terminal outcome.
//! Entries appended while the sync was running are not part of the snapshot
//! and stay queued. Syncs of all queues are serialized.

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

use crate::backend::{Backend, Connectivity};
use crate::cache::{OfflineCache, Slot};
use crate::types::{QueuedMutation, SyncTotals};

/// Keep entries that were not in the processed snapshot or that failed.
fn retain_unresolved<P>(queue: &mut Vec<QueuedMutation<P>>, processed: &HashSet<Uuid>, failed: &HashSet<Uuid>) {
    queue.retain(|e| !processed.contains(&e.id) || failed.contains(&e.id));
}

impl OfflineCache {
    /// Whether queues must not be drained right now.
    pub fn is_offline(&self, connectivity: &dyn Connectivity) -> bool {
        !connectivity.is_connected() || self.is_manual_offline()
    }

    /// Submit queued invoices, saving rejected ones as drafts.
    ///
    /// With an empty queue the totals of the previous sync are returned.
    /// While offline nothing is touched and only the pending count is
    /// reported. Otherwise each invoice is submitted; a rejected invoice is
    /// saved as a draft instead, and one that fails both stays queued. When
    /// at least one invoice was submitted the local stock projection is
    /// dropped so the next read comes from the server.
    pub async fn sync_offline_invoices(&self, backend: &dyn Backend, connectivity: &dyn Connectivity) -> SyncTotals {
        let _guard = self.sync_lock.lock().await;
        let invoices = self.offline_invoices();
        if invoices.is_empty() {
            return self.last_sync_totals();
        }
        if self.is_offline(connectivity) {
            return SyncTotals::pending_only(invoices.len());
        }

        let mut synced = 0;
        let mut drafted = 0;
        let mut failed = HashSet::new();
        for entry in &invoices {
            match backend.submit_invoice(&entry.payload).await {
                Ok(_) => synced += 1,
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "invoice submission failed, saving as draft");
                    match backend.save_draft_invoice(&entry.payload.invoice).await {
                        Ok(_) => drafted += 1,
                        Err(e) => {
                            tracing::error!(id = %entry.id, error = %e, "failed to save invoice as draft, keeping it queued");
                            failed.insert(entry.id);
                        }
                    }
                }
            }
        }

        let processed: HashSet<Uuid> = invoices.iter().map(|e| e.id).collect();
        let totals = SyncTotals { pending: failed.len(), synced, drafted };
        let mut touched = vec![Slot::OfflineInvoices, Slot::LastSyncTotals];
        if synced > 0 {
            touched.extend([Slot::LocalStockCache, Slot::StockCacheReady]);
        }
        self.update_many(&touched, |s| {
            retain_unresolved(&mut s.offline_invoices, &processed, &failed);
            s.last_sync_totals = totals;
            if synced > 0 {
                s.local_stock.clear();
                s.stock_cache_ready = false;
            }
        });
        tracing::info!(synced, drafted, pending = totals.pending, "offline invoices synced");
        totals
    }

    /// Create queued customers on the backend.
    ///
    /// When the backend assigns a name different from the one used offline,
    /// queued invoices referencing the offline name are rewritten, so run
    /// this before [`sync_offline_invoices`](Self::sync_offline_invoices).
    pub async fn sync_offline_customers(&self, backend: &dyn Backend, connectivity: &dyn Connectivity) -> SyncTotals {
        let _guard = self.sync_lock.lock().await;
        let customers = self.offline_customers();
        if customers.is_empty() || self.is_offline(connectivity) {
            return SyncTotals::pending_only(customers.len());
        }

        let mut synced = 0;
        let mut failed = HashSet::new();
        for entry in &customers {
            match backend.create_customer(&entry.payload).await {
                Ok(created) => {
                    synced += 1;
                    let offline_name = entry.payload.get("customer_name").and_then(Value::as_str);
                    let server_name = created.get("name").and_then(Value::as_str);
                    if let (Some(old), Some(new)) = (offline_name, server_name) {
                        self.update_offline_invoices_customer(old, new);
                    }
                }
                Err(e) => {
                    tracing::error!(id = %entry.id, error = %e, "failed to create customer, keeping it queued");
                    failed.insert(entry.id);
                }
            }
        }

        let processed: HashSet<Uuid> = customers.iter().map(|e| e.id).collect();
        self.update(Slot::OfflineCustomers, |s| retain_unresolved(&mut s.offline_customers, &processed, &failed));
        tracing::info!(synced, pending = failed.len(), "offline customers synced");
        SyncTotals { pending: failed.len(), synced, drafted: 0 }
    }

    /// Submit queued payments.
    pub async fn sync_offline_payments(&self, backend: &dyn Backend, connectivity: &dyn Connectivity) -> SyncTotals {
        let _guard = self.sync_lock.lock().await;
        let payments = self.offline_payments();
        if payments.is_empty() || self.is_offline(connectivity) {
            return SyncTotals::pending_only(payments.len());
        }

        let mut synced = 0;
        let mut failed = HashSet::new();
        for entry in &payments {
            match backend.submit_payment(&entry.payload).await {
                Ok(_) => synced += 1,
                Err(e) => {
                    tracing::error!(id = %entry.id, error = %e, "failed to submit payment, keeping it queued");
                    failed.insert(entry.id);
                }
            }
        }

        let processed: HashSet<Uuid> = payments.iter().map(|e| e.id).collect();
        self.update(Slot::OfflinePayments, |s| retain_unresolved(&mut s.offline_payments, &processed, &failed));
        tracing::info!(synced, pending = failed.len(), "offline payments synced");
        SyncTotals { pending: failed.len(), synced, drafted: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::store::Table;
    use crate::types::{InvoiceEntry, StockEntry, StockQuantity};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockBackend {
        reject_submit: HashSet<String>,
        reject_draft: HashSet<String>,
        calls: Mutex<Vec<String>>,
        customer_names: BTreeMap<String, String>,
        /// Cache to enqueue into while a submission is in flight.
        enqueue_during_submit: Option<Arc<OfflineCache>>,
    }

    impl MockBackend {
        fn rejecting(submit: &[&str], draft: &[&str]) -> Self {
            Self {
                reject_submit: submit.iter().map(|s| s.to_string()).collect(),
                reject_draft: draft.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn doc_name(doc: &Value) -> String {
        doc.get("name").and_then(Value::as_str).unwrap_or_default().to_string()
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn submit_invoice(&self, entry: &InvoiceEntry) -> Result<Value, Error> {
            let name = doc_name(&entry.invoice);
            self.record(format!("submit:{name}"));
            if let Some(cache) = &self.enqueue_during_submit {
                cache.save_offline_invoice(InvoiceEntry::new(json!({"name": format!("{name}-late")}), json!({})));
            }
            if self.reject_submit.contains(&name) {
                return Err(Error::Backend("submit rejected".into()));
            }
            Ok(json!({"name": name}))
        }

        async fn save_draft_invoice(&self, invoice: &Value) -> Result<Value, Error> {
            let name = doc_name(invoice);
            self.record(format!("draft:{name}"));
            if self.reject_draft.contains(&name) {
                return Err(Error::Backend("draft rejected".into()));
            }
            Ok(json!({"name": name, "docstatus": 0}))
        }

        async fn create_customer(&self, customer: &Value) -> Result<Value, Error> {
            let name = customer.get("customer_name").and_then(Value::as_str).unwrap_or_default().to_string();
            self.record(format!("customer:{name}"));
            match self.customer_names.get(&name) {
                Some(server_name) => Ok(json!({"name": server_name})),
                None => Err(Error::Backend("customer rejected".into())),
            }
        }

        async fn submit_payment(&self, payment: &Value) -> Result<Value, Error> {
            let name = doc_name(payment);
            self.record(format!("payment:{name}"));
            if self.reject_submit.contains(&name) {
                return Err(Error::Backend("payment rejected".into()));
            }
            Ok(json!({}))
        }

        async fn fetch_stock_quantities(&self, _codes: &[String], _profile: &str) -> Result<Vec<StockQuantity>, Error> {
            Ok(vec![])
        }
    }

    fn invoice(name: &str) -> InvoiceEntry {
        InvoiceEntry::new(json!({"name": name, "customer": "Walk-in", "items": []}), json!({"is_cashback": false}))
    }

    fn queued_names(cache: &OfflineCache) -> Vec<String> {
        cache.offline_invoices().iter().map(|e| doc_name(&e.payload.invoice)).collect()
    }

    #[tokio::test]
    async fn test_offline_reports_pending_without_changes() {
        let cache = OfflineCache::open_in_memory().await;
        for name in ["A", "B", "C"] {
            cache.save_offline_invoice(invoice(name));
        }
        let backend = MockBackend::default();

        let totals = cache.sync_offline_invoices(&backend, &false).await;
        assert_eq!(totals, SyncTotals { pending: 3, synced: 0, drafted: 0 });
        assert_eq!(queued_names(&cache), vec!["A", "B", "C"]);
        assert!(backend.calls().is_empty());
        assert_eq!(cache.last_sync_totals(), SyncTotals::default());
    }

    #[tokio::test]
    async fn test_manual_offline_blocks_sync() {
        let cache = OfflineCache::open_in_memory().await;
        cache.save_offline_invoice(invoice("A"));
        cache.set_manual_offline(true);
        let backend = MockBackend::default();

        let online = AtomicBool::new(true);
        assert_eq!(cache.sync_offline_invoices(&backend, &online).await, SyncTotals::pending_only(1));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_synced_drafted_and_failed() {
        let cache = OfflineCache::open_in_memory().await;
        for name in ["A", "B", "C"] {
            cache.save_offline_invoice(invoice(name));
        }
        let mut stock = BTreeMap::new();
        stock.insert("X".to_string(), StockEntry { actual_qty: 4.0, last_updated: Utc::now() });
        cache.set_local_stock_cache(stock);
        cache.set_stock_cache_ready(true);
        let backend = MockBackend::rejecting(&["B", "C"], &["C"]);

        let totals = cache.sync_offline_invoices(&backend, &true).await;
        cache.flush().await;

        assert_eq!(totals, SyncTotals { pending: 1, synced: 1, drafted: 1 });
        assert_eq!(queued_names(&cache), vec!["C"]);
        assert_eq!(cache.last_sync_totals(), totals);
        assert!(cache.local_stock_cache().is_empty());
        assert!(!cache.is_stock_cache_ready());
        assert_eq!(backend.calls(), vec!["submit:A", "submit:B", "draft:B", "submit:C", "draft:C"]);
        assert_eq!(
            cache.store().get(Table::KeyVal, "pos_last_sync_totals").await,
            Some(json!({"pending": 1, "synced": 1, "drafted": 1}))
        );
    }

    #[tokio::test]
    async fn test_failures_keep_order_and_stock_when_nothing_synced() {
        let cache = OfflineCache::open_in_memory().await;
        for name in ["A", "B", "C"] {
            cache.save_offline_invoice(invoice(name));
        }
        let mut stock = BTreeMap::new();
        stock.insert("X".to_string(), StockEntry { actual_qty: 4.0, last_updated: Utc::now() });
        cache.set_local_stock_cache(stock);
        let backend = MockBackend::rejecting(&["A", "B", "C"], &["A", "C"]);

        let totals = cache.sync_offline_invoices(&backend, &true).await;
        assert_eq!(totals, SyncTotals { pending: 2, synced: 0, drafted: 1 });
        assert_eq!(queued_names(&cache), vec!["A", "C"]);
        assert_eq!(cache.get_local_stock("X"), Some(4.0));
    }

    #[tokio::test]
    async fn test_empty_queue_returns_last_totals() {
        let cache = OfflineCache::open_in_memory().await;
        cache.save_offline_invoice(invoice("A"));
        let backend = MockBackend::default();

        let first = cache.sync_offline_invoices(&backend, &true).await;
        assert_eq!(first, SyncTotals { pending: 0, synced: 1, drafted: 0 });

        let second = cache.sync_offline_invoices(&backend, &true).await;
        let third = cache.sync_offline_invoices(&backend, &false).await;
        assert_eq!(second, first);
        assert_eq!(third, first);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_entries_added_during_sync_are_kept() {
        let cache = Arc::new(OfflineCache::open_in_memory().await);
        cache.save_offline_invoice(invoice("A"));
        let backend = MockBackend { enqueue_during_submit: Some(Arc::clone(&cache)), ..Default::default() };

        let totals = cache.sync_offline_invoices(&backend, &true).await;
        assert_eq!(totals, SyncTotals { pending: 0, synced: 1, drafted: 0 });
        assert_eq!(queued_names(&cache), vec!["A-late"]);
    }

    #[tokio::test]
    async fn test_customer_sync_renames_queued_invoices() {
        let cache = OfflineCache::open_in_memory().await;
        cache.save_offline_customer(json!({"customer_name": "Jane Doe"}));
        cache.save_offline_customer(json!({"customer_name": "Unknown"}));
        cache.save_offline_invoice(InvoiceEntry::new(json!({"name": "A", "customer": "Jane Doe"}), json!({})));

        let mut backend = MockBackend::default();
        backend.customer_names.insert("Jane Doe".into(), "CUST-00017".into());

        let online = || true;
        let totals = cache.sync_offline_customers(&backend, &online).await;
        assert_eq!(totals, SyncTotals { pending: 1, synced: 1, drafted: 0 });
        assert_eq!(cache.pending_offline_customer_count(), 1);
        assert_eq!(cache.offline_invoices()[0].payload.customer(), Some("CUST-00017"));
    }

    #[tokio::test]
    async fn test_payment_sync_keeps_failures() {
        let cache = OfflineCache::open_in_memory().await;
        cache.save_offline_payment(json!({"name": "P1"}));
        cache.save_offline_payment(json!({"name": "P2"}));
        let backend = MockBackend::rejecting(&["P2"], &[]);

        assert_eq!(cache.sync_offline_payments(&backend, &false).await, SyncTotals::pending_only(2));
        let totals = cache.sync_offline_payments(&backend, &true).await;
        assert_eq!(totals, SyncTotals { pending: 1, synced: 1, drafted: 0 });
        assert_eq!(cache.offline_payments()[0].payload, json!({"name": "P2"}));
    }
}
