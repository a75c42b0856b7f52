//! Backend client for posa-offline.
//!
//! This crate provides the HTTP implementation of the engine's `Backend`
//! trait, talking to the POS app's whitelisted methods on a Frappe site.

pub mod frappe;

pub use frappe::{ClientError, FrappeClient, FrappeConfig};
