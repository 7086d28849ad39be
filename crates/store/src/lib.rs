//! Persistent store for the commerce core.
//!
//! The store is the only shared mutable resource in the system. Every
//! cross-request invariant (one open cart per email, one order per payment
//! session, monotonic voucher usage, non-negative stock) is enforced here,
//! by a uniqueness constraint or a single conditional update.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{ORDER_SESSION_CONSTRAINT, Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    CartStore, CartUpsert, CommerceStore, Finalization, InventoryStore, OrderStore, ProductStock,
    StockShortfall, VoucherStore,
};
