//! Shared identifier types for the commerce core.

mod types;

pub use types::{BatchId, CartId, OrderId, ProductId};
