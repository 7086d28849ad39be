//! HTTP handlers.

pub mod checkout;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod vouchers;
pub mod webhooks;
