//! Value types held in cache slots and returned by the public API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome counters of a queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTotals {
    pub pending: usize,
    pub synced: usize,
    pub drafted: usize,
}

impl SyncTotals {
    /// Totals for a queue that was only counted, not drained.
    pub fn pending_only(pending: usize) -> Self {
        Self { pending, synced: 0, drafted: 0 }
    }
}

/// One offline-created mutation waiting for the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation<P> {
    /// Stable identity, also usable by the backend to deduplicate retries.
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Cache schema version the entry was created under.
    #[serde(default)]
    pub schema_version: u32,
    pub payload: P,
}

impl<P> QueuedMutation<P> {
    pub fn new(payload: P, schema_version: u32) -> Self {
        Self { id: Uuid::new_v4(), created_at: Utc::now(), schema_version, payload }
    }
}

/// Payload of a queued invoice submission.
///
/// `invoice` is the full invoice document; `data` carries the submission
/// metadata (payments, redeemed points, ...) exactly as entered offline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceEntry {
    pub invoice: Value,
    #[serde(default)]
    pub data: Value,
}

impl InvoiceEntry {
    pub fn new(invoice: Value, data: Value) -> Self {
        Self { invoice, data }
    }

    /// Line items of the invoice as `(item_code, qty)` pairs.
    pub fn line_items(&self) -> Vec<LineItem> {
        self.invoice
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(LineItem::from_value).collect())
            .unwrap_or_default()
    }

    pub fn customer(&self) -> Option<&str> {
        self.invoice.get("customer").and_then(Value::as_str)
    }
}

/// An item code with a quantity, as found on invoice lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_code: String,
    #[serde(default)]
    pub qty: f64,
}

impl LineItem {
    pub fn new(item_code: impl Into<String>, qty: f64) -> Self {
        Self { item_code: item_code.into(), qty }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let item_code = value.get("item_code")?.as_str()?.to_string();
        let qty = value.get("qty").and_then(Value::as_f64).unwrap_or(0.0);
        Some(Self { item_code, qty })
    }
}

/// Server-confirmed stock quantity for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub actual_qty: f64,
    pub last_updated: DateTime<Utc>,
}

/// Quantity reported by the backend's bulk stock lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuantity {
    pub item_code: String,
    #[serde(default)]
    pub actual_qty: Option<f64>,
}

/// Line that asks for more than the cached stock holds.
#[derive(Debug, Clone, PartialEq)]
pub struct StockShortage {
    pub item_code: String,
    pub requested: f64,
    pub available: f64,
}

/// Item attributes kept for offline selling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRecord {
    pub item_code: String,
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub stock_uom: Option<String>,
    pub image: Option<String>,
    pub item_group: Option<String>,
    pub rate: Option<f64>,
    pub price_list_rate: Option<f64>,
    pub currency: Option<String>,
    pub item_barcode: Option<Value>,
    pub item_uoms: Option<Value>,
    pub actual_qty: Option<f64>,
    pub has_batch_no: Option<Value>,
    pub has_serial_no: Option<Value>,
    pub has_variants: bool,
}

/// Customer attributes kept for offline selling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerRecord {
    pub name: String,
    pub customer_name: Option<String>,
    pub mobile_no: Option<String>,
    pub email_id: Option<String>,
    pub primary_address: Option<String>,
    pub tax_id: Option<String>,
}

/// Cached price-list rows with their fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceListEntry {
    pub items: Vec<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Cached outstanding balance of a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerBalance {
    pub balance: f64,
    pub timestamp: DateTime<Utc>,
}

/// Storage footprint of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUsage {
    pub total: u64,
    pub local_bytes: u64,
    pub durable_bytes: u64,
    /// Share of the configured storage budget, 0-100.
    pub percentage: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_line_items_skip_malformed_rows() {
        let entry = InvoiceEntry::new(
            json!({"customer": "CUST-1", "items": [{"item_code": "A", "qty": 2}, {"qty": 5}, {"item_code": "B"}]}),
            json!({}),
        );
        assert_eq!(entry.line_items(), vec![LineItem::new("A", 2.0), LineItem::new("B", 0.0)]);
        assert_eq!(entry.customer(), Some("CUST-1"));
    }

    #[test]
    fn test_queued_mutation_ids_are_unique() {
        let a = QueuedMutation::new(json!({}), 1);
        let b = QueuedMutation::new(json!({}), 1);
        assert_ne!(a.id, b.id);
    }
}
