//! Domain layer for the commerce core.
//!
//! This crate holds the pure parts of the system:
//! - Value objects (`Money`, `Email`, `ProductRef`, `SessionRef`, `VoucherCode`)
//! - Cart lifecycle and its status machine
//! - Finalized orders, totals and fulfillment status
//! - Inbound batches, live stock and availability tiers
//! - Voucher validation and cart-level application

pub mod cart;
pub mod error;
pub mod inventory;
pub mod order;
pub mod value_objects;
pub mod voucher;

pub use cart::{Cart, CartSnapshot, CartStatus, LineItem, ShippingSnapshot};
pub use error::DomainError;
pub use inventory::{Availability, AvailabilityTier, Batch, BatchStatus, Product, ProductCategory, VolumeTier};
pub use order::{AppliedVoucher, FulfillmentStatus, Order, OrderDraft};
pub use value_objects::{Email, Money, ProductRef, SessionRef, VoucherCode};
pub use voucher::{ReasonCode, Verdict, Voucher, VoucherApplication, VoucherKind};
