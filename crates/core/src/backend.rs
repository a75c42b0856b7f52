//! Seams to the outside world: connectivity and the backend RPC surface.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::Error;
use crate::types::{InvoiceEntry, StockQuantity};

/// Reachability of the backend, as decided by the caller.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

impl Connectivity for bool {
    fn is_connected(&self) -> bool {
        *self
    }
}

impl Connectivity for AtomicBool {
    fn is_connected(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<F> Connectivity for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_connected(&self) -> bool {
        self()
    }
}

/// Backend calls used to drain the queues and refresh stock.
///
/// Every call either succeeds with the backend's response message or fails
/// with [`Error::Backend`]; the sync engine treats any error as a failed
/// attempt and keeps the entry queued.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submit a queued invoice for final posting.
    async fn submit_invoice(&self, entry: &InvoiceEntry) -> Result<Value, Error>;

    /// Save an invoice document as a draft after submission was rejected.
    async fn save_draft_invoice(&self, invoice: &Value) -> Result<Value, Error>;

    /// Create a customer. The response carries the server-assigned `name`.
    async fn create_customer(&self, customer: &Value) -> Result<Value, Error>;

    async fn submit_payment(&self, payment: &Value) -> Result<Value, Error>;

    /// Current quantities for `item_codes` in the warehouse of `pos_profile`.
    async fn fetch_stock_quantities(
        &self, item_codes: &[String], pos_profile: &str,
    ) -> Result<Vec<StockQuantity>, Error>;
}
