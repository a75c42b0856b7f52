//! Mutation queues: invoices, customers and payments created offline.
//!
//! Entries are appended at the tail and drained from the head. A queue never
//! holds more than `max_queue_items` entries; saving past the limit drops the
//! oldest entries, logs the count and reports it in [`Enqueued`].

use serde_json::Value;

use super::stock::apply_sale;
use super::{OfflineCache, Slot, Slots};
use crate::types::{InvoiceEntry, QueuedMutation, SyncTotals};

/// One of the three mutation queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Invoices,
    Customers,
    Payments,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Invoices, QueueKind::Customers, QueueKind::Payments];

    pub fn slot(self) -> Slot {
        match self {
            QueueKind::Invoices => Slot::OfflineInvoices,
            QueueKind::Customers => Slot::OfflineCustomers,
            QueueKind::Payments => Slot::OfflinePayments,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QueueKind::Invoices => "invoices",
            QueueKind::Customers => "customers",
            QueueKind::Payments => "payments",
        }
    }

    pub(crate) fn len(self, slots: &Slots) -> usize {
        match self {
            QueueKind::Invoices => slots.offline_invoices.len(),
            QueueKind::Customers => slots.offline_customers.len(),
            QueueKind::Payments => slots.offline_payments.len(),
        }
    }

    fn truncate(self, slots: &mut Slots, limit: usize) -> usize {
        match self {
            QueueKind::Invoices => truncate_head(&mut slots.offline_invoices, limit),
            QueueKind::Customers => truncate_head(&mut slots.offline_customers, limit),
            QueueKind::Payments => truncate_head(&mut slots.offline_payments, limit),
        }
    }

    fn remove(self, slots: &mut Slots, index: usize) -> bool {
        fn remove_at<P>(queue: &mut Vec<P>, index: usize) -> bool {
            if index < queue.len() {
                queue.remove(index);
                true
            } else {
                false
            }
        }
        match self {
            QueueKind::Invoices => remove_at(&mut slots.offline_invoices, index),
            QueueKind::Customers => remove_at(&mut slots.offline_customers, index),
            QueueKind::Payments => remove_at(&mut slots.offline_payments, index),
        }
    }
}

/// Result of appending to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Queue length after the append.
    pub pending: usize,
    /// Oldest entries dropped to stay within the queue limit.
    pub dropped: usize,
}

/// Drop entries from the head so at most `limit` remain. Returns how many were dropped.
fn truncate_head<P>(queue: &mut Vec<P>, limit: usize) -> usize {
    let excess = queue.len().saturating_sub(limit);
    if excess > 0 {
        queue.drain(..excess);
    }
    excess
}

fn warn_dropped(kind: QueueKind, dropped: usize, limit: usize) {
    if dropped > 0 {
        tracing::warn!(queue = kind.name(), dropped, limit, "queue over limit, oldest entries dropped");
    }
}

impl OfflineCache {
    fn enqueue(&self, kind: QueueKind, push: impl FnOnce(&mut Slots)) -> Enqueued {
        let limit = self.options.max_queue_items;
        let result = self.update(kind.slot(), |slots| {
            push(slots);
            let dropped = kind.truncate(slots, limit);
            Enqueued { pending: kind.len(slots), dropped }
        });
        warn_dropped(kind, result.dropped, limit);
        result
    }

    /// Queue an invoice and apply its lines to the local stock projection.
    pub fn save_offline_invoice(&self, entry: InvoiceEntry) -> Enqueued {
        let limit = self.options.max_queue_items;
        let lines = entry.line_items();
        let mutation = QueuedMutation::new(entry, self.schema_version);
        let result = self.update_many(&[Slot::OfflineInvoices, Slot::LocalStockCache], |slots| {
            slots.offline_invoices.push(mutation);
            apply_sale(&mut slots.local_stock, &lines);
            let dropped = QueueKind::Invoices.truncate(slots, limit);
            Enqueued { pending: slots.offline_invoices.len(), dropped }
        });
        warn_dropped(QueueKind::Invoices, result.dropped, limit);
        tracing::debug!(pending = result.pending, lines = lines.len(), "offline invoice queued");
        result
    }

    /// Queued invoices, oldest first.
    pub fn offline_invoices(&self) -> Vec<QueuedMutation<InvoiceEntry>> {
        self.read(|s| s.offline_invoices.clone())
    }

    pub fn clear_offline_invoices(&self) {
        self.update(Slot::OfflineInvoices, |s| s.offline_invoices.clear());
    }

    /// Remove the invoice at `index`. Returns false when out of range.
    pub fn delete_offline_invoice(&self, index: usize) -> bool {
        self.delete_queue_entry(QueueKind::Invoices, index)
    }

    pub fn pending_offline_invoice_count(&self) -> usize {
        self.pending_count(QueueKind::Invoices)
    }

    /// Queue a customer creation.
    pub fn save_offline_customer(&self, customer: Value) -> Enqueued {
        let mutation = QueuedMutation::new(customer, self.schema_version);
        self.enqueue(QueueKind::Customers, |s| s.offline_customers.push(mutation))
    }

    pub fn offline_customers(&self) -> Vec<QueuedMutation<Value>> {
        self.read(|s| s.offline_customers.clone())
    }

    pub fn clear_offline_customers(&self) {
        self.update(Slot::OfflineCustomers, |s| s.offline_customers.clear());
    }

    pub fn delete_offline_customer(&self, index: usize) -> bool {
        self.delete_queue_entry(QueueKind::Customers, index)
    }

    pub fn pending_offline_customer_count(&self) -> usize {
        self.pending_count(QueueKind::Customers)
    }

    /// Queue a payment record.
    pub fn save_offline_payment(&self, payment: Value) -> Enqueued {
        let mutation = QueuedMutation::new(payment, self.schema_version);
        self.enqueue(QueueKind::Payments, |s| s.offline_payments.push(mutation))
    }

    pub fn offline_payments(&self) -> Vec<QueuedMutation<Value>> {
        self.read(|s| s.offline_payments.clone())
    }

    pub fn clear_offline_payments(&self) {
        self.update(Slot::OfflinePayments, |s| s.offline_payments.clear());
    }

    pub fn delete_offline_payment(&self, index: usize) -> bool {
        self.delete_queue_entry(QueueKind::Payments, index)
    }

    pub fn pending_offline_payment_count(&self) -> usize {
        self.pending_count(QueueKind::Payments)
    }

    pub fn pending_count(&self, kind: QueueKind) -> usize {
        self.read(|s| kind.len(s))
    }

    fn delete_queue_entry(&self, kind: QueueKind, index: usize) -> bool {
        let removed = self.read(|s| index < kind.len(s)) && self.update(kind.slot(), |s| kind.remove(s, index));
        if !removed {
            tracing::debug!(queue = kind.name(), index, "no queue entry at index");
        }
        removed
    }

    /// Trim every queue to its `limit` most recent entries. Returns the
    /// number of entries dropped across all queues.
    pub fn purge_old_queue_entries(&self, limit: usize) -> usize {
        let mut total = 0;
        for kind in QueueKind::ALL {
            if self.pending_count(kind) <= limit {
                continue;
            }
            let dropped = self.update(kind.slot(), |s| kind.truncate(s, limit));
            warn_dropped(kind, dropped, limit);
            total += dropped;
        }
        total
    }

    /// Whether any queue holds more than `limit` entries.
    pub fn queue_health_check(&self, limit: usize) -> bool {
        self.read(|s| QueueKind::ALL.iter().any(|k| k.len(s) > limit))
    }

    /// Point queued invoices for customer `old` at `new`. Returns how many were rewritten.
    pub fn update_offline_invoices_customer(&self, old: &str, new: &str) -> usize {
        if old == new || !self.read(|s| s.offline_invoices.iter().any(|e| e.payload.customer() == Some(old))) {
            return 0;
        }
        let rewritten = self.update(Slot::OfflineInvoices, |s| {
            let mut count = 0;
            for entry in s.offline_invoices.iter_mut().filter(|e| e.payload.customer() == Some(old)) {
                if let Some(doc) = entry.payload.invoice.as_object_mut() {
                    doc.insert("customer".into(), Value::String(new.to_string()));
                    count += 1;
                }
            }
            count
        });
        tracing::info!(old, new, rewritten, "queued invoices moved to server customer name");
        rewritten
    }

    /// Empty all queues and reset the sync totals.
    pub fn reset_offline_state(&self) {
        self.update_many(
            &[Slot::OfflineInvoices, Slot::OfflineCustomers, Slot::OfflinePayments, Slot::LastSyncTotals],
            |s| {
                s.offline_invoices.clear();
                s.offline_customers.clear();
                s.offline_payments.clear();
                s.last_sync_totals = SyncTotals::default();
            },
        );
    }
}
