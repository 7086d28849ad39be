//! Live inventory for the storefront.
//!
//! This crate answers "what can be sold right now": per-product price, live
//! stock and availability tier, computed from inbound batches on every call,
//! plus the active volume discount tiers.

pub mod aggregator;
pub mod error;

pub use aggregator::{AvailabilityMap, InventoryAggregator};
pub use error::{InventoryError, Result};
