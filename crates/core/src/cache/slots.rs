//! The fixed set of cache slots and their routing to storage.
//!
//! Every slot is a variant of [`Slot`]; its table, fallback mirroring and
//! migration behavior are exhaustive matches, so adding a slot without
//! deciding where it lives does not compile.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::store::Table;
use crate::types::{
    CustomerBalance, CustomerRecord, InvoiceEntry, ItemRecord, PriceListEntry, QueuedMutation, StockEntry, SyncTotals,
};

macro_rules! define_slots {
    ($( $(#[$doc:meta])* $variant:ident => $field:ident : $ty:ty = $key:literal ),+ $(,)?) => {
        /// A named unit of cached state.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Slot {
            $( $(#[$doc])* $variant ),+
        }

        impl Slot {
            pub const ALL: &'static [Slot] = &[ $( Slot::$variant ),+ ];

            /// Storage key of the slot.
            pub fn key(self) -> &'static str {
                match self {
                    $( Slot::$variant => $key ),+
                }
            }
        }

        /// All slot values. Each field starts at its default.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Slots {
            $( pub $field: $ty ),+
        }

        impl Slots {
            /// Serialize one slot for persistence.
            pub(crate) fn value_of(&self, slot: Slot) -> Result<Value, serde_json::Error> {
                match slot {
                    $( Slot::$variant => serde_json::to_value(&self.$field) ),+
                }
            }

            /// Replace one slot with a decoded stored value. On error the slot is untouched.
            pub(crate) fn load(&mut self, slot: Slot, value: Value) -> Result<(), serde_json::Error> {
                match slot {
                    $( Slot::$variant => self.$field = serde_json::from_value(value)? ),+
                }
                Ok(())
            }

            /// Put one slot back to its default.
            pub(crate) fn reset(&mut self, slot: Slot) {
                match slot {
                    $( Slot::$variant => self.$field = Default::default() ),+
                }
            }
        }
    };
}

define_slots! {
    /// Queued invoice submissions.
    OfflineInvoices => offline_invoices: Vec<QueuedMutation<InvoiceEntry>> = "offline_invoices",
    /// Queued customer creations.
    OfflineCustomers => offline_customers: Vec<QueuedMutation<Value>> = "offline_customers",
    /// Queued payment records.
    OfflinePayments => offline_payments: Vec<QueuedMutation<Value>> = "offline_payments",
    /// Totals of the last invoice sync.
    LastSyncTotals => last_sync_totals: SyncTotals = "pos_last_sync_totals",
    ItemsStorage => items: Vec<ItemRecord> = "items_storage",
    CustomerStorage => customers: Vec<CustomerRecord> = "customer_storage",
    SalesPersons => sales_persons: Vec<Value> = "sales_persons_storage",
    ItemsLastSync => items_last_sync: Option<String> = "items_last_sync",
    CustomersLastSync => customers_last_sync: Option<String> = "customers_last_sync",
    /// Units of measure keyed by item code.
    UomCache => uoms: BTreeMap<String, Vec<Value>> = "uom_cache",
    OffersCache => offers: Vec<Value> = "offers_cache",
    /// Price-list rows keyed by price list name.
    PriceListCache => price_lists: BTreeMap<String, PriceListEntry> = "price_list_cache",
    /// Item detail documents keyed by price list, then item code.
    ItemDetailsCache => item_details: BTreeMap<String, BTreeMap<String, Value>> = "item_details_cache",
    ItemGroupsCache => item_groups: Vec<String> = "item_groups_cache",
    TaxTemplateCache => tax_templates: BTreeMap<String, Value> = "tax_template_cache",
    /// Translations keyed by locale.
    TranslationCache => translations: BTreeMap<String, Value> = "translation_cache",
    /// Coupons keyed by customer.
    CouponsCache => coupons: BTreeMap<String, Vec<Value>> = "coupons_cache",
    CustomerBalanceCache => customer_balances: BTreeMap<String, CustomerBalance> = "customer_balance_cache",
    /// Local stock projection keyed by item code.
    LocalStockCache => local_stock: BTreeMap<String, StockEntry> = "local_stock_cache",
    StockCacheReady => stock_cache_ready: bool = "stock_cache_ready",
    OpeningStorage => opening: Option<Value> = "pos_opening_storage",
    OpeningDialogStorage => opening_dialog: Option<Value> = "opening_dialog_storage",
    TaxInclusive => tax_inclusive: bool = "tax_inclusive",
    ManualOffline => manual_offline: bool = "manual_offline",
    /// Cache schema version stamp; 0 means never stamped.
    CacheVersion => cache_version: u32 = "cache_version",
}

/// What kind of state a slot holds, which decides how it is stored and migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Server-derived data that can always be fetched again.
    Reference,
    /// Data of the current POS opening (shift).
    Session,
    /// Unsynced user work.
    Queue,
    /// Sync status shown to the user.
    Status,
    /// User preferences.
    Setting,
    /// The cache version stamp.
    Marker,
}

impl Slot {
    pub fn kind(self) -> SlotKind {
        match self {
            Slot::OfflineInvoices | Slot::OfflineCustomers | Slot::OfflinePayments => SlotKind::Queue,
            Slot::LastSyncTotals => SlotKind::Status,
            Slot::ItemsStorage
            | Slot::CustomerStorage
            | Slot::SalesPersons
            | Slot::ItemsLastSync
            | Slot::CustomersLastSync
            | Slot::UomCache
            | Slot::OffersCache
            | Slot::PriceListCache
            | Slot::ItemDetailsCache
            | Slot::ItemGroupsCache
            | Slot::TaxTemplateCache
            | Slot::TranslationCache
            | Slot::CouponsCache
            | Slot::CustomerBalanceCache
            | Slot::LocalStockCache
            | Slot::StockCacheReady => SlotKind::Reference,
            Slot::OpeningStorage | Slot::OpeningDialogStorage => SlotKind::Session,
            Slot::TaxInclusive | Slot::ManualOffline => SlotKind::Setting,
            Slot::CacheVersion => SlotKind::Marker,
        }
    }

    /// Durable table the slot is persisted to.
    pub fn table(self) -> Table {
        match self.kind() {
            SlotKind::Queue => Table::Queues,
            SlotKind::Reference => Table::Caches,
            SlotKind::Session | SlotKind::Status | SlotKind::Setting | SlotKind::Marker => Table::KeyVal,
        }
    }

    /// Whether writes are mirrored into the fallback store. Bulk reference
    /// data is left out to stay within the fallback quota.
    pub fn mirrors_to_fallback(self) -> bool {
        !matches!(self.kind(), SlotKind::Reference)
    }

    /// Whether the slot keeps its value when the cache version changes.
    pub fn survives_version_change(self) -> bool {
        matches!(self.kind(), SlotKind::Queue | SlotKind::Status | SlotKind::Setting | SlotKind::Marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<_> = Slot::ALL.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), Slot::ALL.len());
    }

    #[test]
    fn test_routing() {
        assert_eq!(Slot::OfflineInvoices.table(), Table::Queues);
        assert_eq!(Slot::PriceListCache.table(), Table::Caches);
        assert_eq!(Slot::CacheVersion.table(), Table::KeyVal);
        assert!(Slot::OfflinePayments.mirrors_to_fallback());
        assert!(!Slot::ItemsStorage.mirrors_to_fallback());
    }

    #[test]
    fn test_queues_survive_version_change() {
        for slot in Slot::ALL {
            if slot.kind() == SlotKind::Queue {
                assert!(slot.survives_version_change());
            }
            if slot.kind() == SlotKind::Reference {
                assert!(!slot.survives_version_change(), "{slot:?}");
            }
        }
    }

    #[test]
    fn test_load_value_round_trip() {
        let mut slots = Slots::default();
        slots.load(Slot::TaxInclusive, json!(true)).unwrap();
        assert!(slots.tax_inclusive);
        assert_eq!(slots.value_of(Slot::TaxInclusive).unwrap(), json!(true));

        slots.reset(Slot::TaxInclusive);
        assert!(!slots.tax_inclusive);
    }

    #[test]
    fn test_load_rejects_wrong_shape() {
        let mut slots = Slots::default();
        slots.items.push(ItemRecord { item_code: "A".into(), ..Default::default() });
        assert!(slots.load(Slot::ItemsStorage, json!({"not": "a list"})).is_err());
        assert_eq!(slots.items.len(), 1);
    }
}
