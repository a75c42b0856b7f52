//! Offline cache and mutation-queue engine for the POS client.
//!
//! This crate provides:
//! - An in-memory cache with a write-behind SQLite store and a fallback store
//! - A version-gated startup lifecycle
//! - Bounded queues of invoices, customers and payments created offline
//! - The sync engine that drains those queues through a [`Backend`]
//! - Layered configuration and unified error types

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod persist;
pub mod store;
pub mod sync;
pub mod types;

pub use backend::{Backend, Connectivity};
pub use cache::{CACHE_VERSION, CacheOptions, Enqueued, LifecycleState, OfflineCache, QueueKind, Slot};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use store::{DurableStore, FallbackStore, StoreAdapter};
pub use types::{InvoiceEntry, LineItem, QueuedMutation, StockQuantity, SyncTotals};
