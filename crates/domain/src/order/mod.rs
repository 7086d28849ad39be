//! Finalized orders.

mod model;
mod state;

pub use model::{AppliedVoucher, Order, OrderDraft};
pub use state::FulfillmentStatus;
