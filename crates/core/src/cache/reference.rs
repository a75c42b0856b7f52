//! Accessors for reference-data, session and settings slots.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::{OfflineCache, Slot};
use crate::types::{CustomerBalance, CustomerRecord, ItemRecord, PriceListEntry, SyncTotals};

/// Hours a cached customer balance stays usable.
pub const CUSTOMER_BALANCE_TTL_HOURS: i64 = 24;

fn balance_is_fresh(entry: &CustomerBalance, now: DateTime<Utc>) -> bool {
    now - entry.timestamp < Duration::hours(CUSTOMER_BALANCE_TTL_HOURS)
}

impl OfflineCache {
    pub fn items_storage(&self) -> Vec<ItemRecord> {
        self.read(|s| s.items.clone())
    }

    /// Store the item list, trimmed to the attributes needed offline.
    pub fn set_items_storage(&self, items: Vec<ItemRecord>) {
        self.update(Slot::ItemsStorage, |s| s.items = items);
    }

    /// Store raw item documents. Rows that do not look like items are dropped.
    pub fn set_items_storage_from_values(&self, items: &[Value]) {
        let trimmed: Vec<ItemRecord> = items.iter().filter_map(|v| serde_json::from_value(v.clone()).ok()).collect();
        if trimmed.len() != items.len() {
            tracing::warn!(received = items.len(), kept = trimmed.len(), "skipped malformed item rows");
        }
        self.set_items_storage(trimmed);
    }

    pub fn customer_storage(&self) -> Vec<CustomerRecord> {
        self.read(|s| s.customers.clone())
    }

    pub fn set_customer_storage(&self, customers: Vec<CustomerRecord>) {
        self.update(Slot::CustomerStorage, |s| s.customers = customers);
    }

    pub fn items_last_sync(&self) -> Option<String> {
        self.read(|s| s.items_last_sync.clone())
    }

    pub fn set_items_last_sync(&self, ts: impl Into<String>) {
        let ts = ts.into();
        self.update(Slot::ItemsLastSync, |s| s.items_last_sync = Some(ts));
    }

    pub fn customers_last_sync(&self) -> Option<String> {
        self.read(|s| s.customers_last_sync.clone())
    }

    pub fn set_customers_last_sync(&self, ts: impl Into<String>) {
        let ts = ts.into();
        self.update(Slot::CustomersLastSync, |s| s.customers_last_sync = Some(ts));
    }

    pub fn sales_persons_storage(&self) -> Vec<Value> {
        self.read(|s| s.sales_persons.clone())
    }

    pub fn set_sales_persons_storage(&self, sales_persons: Vec<Value>) {
        self.update(Slot::SalesPersons, |s| s.sales_persons = sales_persons);
    }

    /// Data of the current POS opening entry.
    pub fn opening_storage(&self) -> Option<Value> {
        self.read(|s| s.opening.clone())
    }

    pub fn set_opening_storage(&self, opening: Value) {
        self.update(Slot::OpeningStorage, |s| s.opening = Some(opening));
    }

    pub fn clear_opening_storage(&self) {
        self.update(Slot::OpeningStorage, |s| s.opening = None);
    }

    pub fn opening_dialog_storage(&self) -> Option<Value> {
        self.read(|s| s.opening_dialog.clone())
    }

    pub fn set_opening_dialog_storage(&self, data: Value) {
        self.update(Slot::OpeningDialogStorage, |s| s.opening_dialog = Some(data));
    }

    pub fn tax_template(&self, name: &str) -> Option<Value> {
        self.read(|s| s.tax_templates.get(name).cloned())
    }

    pub fn set_tax_template(&self, name: impl Into<String>, doc: Value) {
        let name = name.into();
        self.update(Slot::TaxTemplateCache, |s| s.tax_templates.insert(name, doc));
    }

    pub fn translations_cache(&self, locale: &str) -> Option<Value> {
        self.read(|s| s.translations.get(locale).cloned())
    }

    pub fn save_translations_cache(&self, locale: impl Into<String>, data: Value) {
        let locale = locale.into();
        self.update(Slot::TranslationCache, |s| s.translations.insert(locale, data));
    }

    pub fn last_sync_totals(&self) -> SyncTotals {
        self.read(|s| s.last_sync_totals)
    }

    pub fn set_last_sync_totals(&self, totals: SyncTotals) {
        self.update(Slot::LastSyncTotals, |s| s.last_sync_totals = totals);
    }

    pub fn tax_inclusive_setting(&self) -> bool {
        self.read(|s| s.tax_inclusive)
    }

    pub fn set_tax_inclusive_setting(&self, value: bool) {
        self.update(Slot::TaxInclusive, |s| s.tax_inclusive = value);
    }

    /// Whether the operator forced offline mode.
    pub fn is_manual_offline(&self) -> bool {
        self.read(|s| s.manual_offline)
    }

    pub fn set_manual_offline(&self, offline: bool) {
        self.update(Slot::ManualOffline, |s| s.manual_offline = offline);
    }

    /// Flip manual offline mode and return the new state.
    pub fn toggle_manual_offline(&self) -> bool {
        self.update(Slot::ManualOffline, |s| {
            s.manual_offline = !s.manual_offline;
            s.manual_offline
        })
    }

    /// Units of measure of `item_code`, empty when unknown.
    pub fn item_uoms(&self, item_code: &str) -> Vec<Value> {
        self.read(|s| s.uoms.get(item_code).cloned().unwrap_or_default())
    }

    pub fn save_item_uoms(&self, item_code: impl Into<String>, uoms: Vec<Value>) {
        let item_code = item_code.into();
        self.update(Slot::UomCache, |s| s.uoms.insert(item_code, uoms));
    }

    pub fn cached_offers(&self) -> Vec<Value> {
        self.read(|s| s.offers.clone())
    }

    pub fn save_offers(&self, offers: Vec<Value>) {
        self.update(Slot::OffersCache, |s| s.offers = offers);
    }

    pub fn cached_price_list_items(&self, price_list: &str) -> Option<PriceListEntry> {
        self.read(|s| s.price_lists.get(price_list).cloned())
    }

    pub fn save_price_list_items(&self, price_list: impl Into<String>, items: Vec<Value>) {
        let price_list = price_list.into();
        let entry = PriceListEntry { items, timestamp: Utc::now() };
        self.update(Slot::PriceListCache, |s| s.price_lists.insert(price_list, entry));
    }

    pub fn clear_price_list_cache(&self) {
        self.update(Slot::PriceListCache, |s| s.price_lists.clear());
    }

    /// Cached detail documents of `item_codes` under `price_list`, in request
    /// order. Codes without a cached document are left out.
    pub fn cached_item_details(&self, price_list: &str, item_codes: &[String]) -> Vec<Value> {
        self.read(|s| {
            let Some(details) = s.item_details.get(price_list) else {
                return Vec::new();
            };
            item_codes.iter().filter_map(|code| details.get(code).cloned()).collect()
        })
    }

    /// Store item detail documents under `price_list`, keyed by their
    /// `item_code`. Documents without one are skipped.
    pub fn save_item_details_cache(&self, price_list: impl Into<String>, items: &[Value]) -> usize {
        let price_list = price_list.into();
        let keyed: Vec<(String, Value)> = items
            .iter()
            .filter_map(|doc| Some((doc.get("item_code")?.as_str()?.to_string(), doc.clone())))
            .collect();
        let stored = keyed.len();
        self.update(Slot::ItemDetailsCache, |s| s.item_details.entry(price_list).or_default().extend(keyed));
        stored
    }

    pub fn cached_item_groups(&self) -> Vec<String> {
        self.read(|s| s.item_groups.clone())
    }

    pub fn save_item_groups(&self, groups: Vec<String>) {
        self.update(Slot::ItemGroupsCache, |s| s.item_groups = groups);
    }

    pub fn cached_coupons(&self, customer: &str) -> Vec<Value> {
        self.read(|s| s.coupons.get(customer).cloned().unwrap_or_default())
    }

    pub fn save_coupons(&self, customer: impl Into<String>, coupons: Vec<Value>) {
        let customer = customer.into();
        self.update(Slot::CouponsCache, |s| s.coupons.insert(customer, coupons));
    }

    pub fn clear_coupons(&self) {
        self.update(Slot::CouponsCache, |s| s.coupons.clear());
    }

    pub fn save_customer_balance(&self, customer: impl Into<String>, balance: f64) {
        let customer = customer.into();
        let entry = CustomerBalance { balance, timestamp: Utc::now() };
        self.update(Slot::CustomerBalanceCache, |s| s.customer_balances.insert(customer, entry));
    }

    /// Cached balance of `customer` if it was stored within the last 24 hours.
    pub fn cached_customer_balance(&self, customer: &str) -> Option<f64> {
        let now = Utc::now();
        self.read(|s| s.customer_balances.get(customer).filter(|e| balance_is_fresh(e, now)).map(|e| e.balance))
    }

    pub fn clear_customer_balance_cache(&self) {
        self.update(Slot::CustomerBalanceCache, |s| s.customer_balances.clear());
    }

    /// Drop balances older than 24 hours. Returns how many were removed.
    pub fn clear_expired_customer_balances(&self) -> usize {
        let now = Utc::now();
        self.update(Slot::CustomerBalanceCache, |s| {
            let before = s.customer_balances.len();
            s.customer_balances.retain(|_, e| balance_is_fresh(e, now));
            before - s.customer_balances.len()
        })
    }

    /// Drop the bulky derived caches that can be rebuilt from the server.
    pub fn reduce_cache_usage(&self) {
        self.update_many(
            &[
                Slot::PriceListCache,
                Slot::ItemDetailsCache,
                Slot::UomCache,
                Slot::OffersCache,
                Slot::CustomerBalanceCache,
                Slot::LocalStockCache,
                Slot::StockCacheReady,
                Slot::CouponsCache,
                Slot::ItemGroupsCache,
            ],
            |s| {
                s.price_lists = BTreeMap::new();
                s.uoms = BTreeMap::new();
                s.offers.clear();
                s.customer_balances = BTreeMap::new();
                s.local_stock = BTreeMap::new();
                s.stock_cache_ready = false;
                s.coupons = BTreeMap::new();
                s.item_details = BTreeMap::new();
                s.item_groups.clear();
            },
        );
        tracing::info!("derived caches cleared to reduce storage usage");
    }
}
