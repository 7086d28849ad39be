//! Cart (checkout) records and their lifecycle.

mod model;
mod state;

pub use model::{
    CART_WINDOW_HOURS, Cart, CartSnapshot, LineItem, MAX_CART_LINES, MAX_LINE_QUANTITY, MAX_LINE_TOTAL_CENTS,
    ShippingSnapshot, subtotal, validate_lines, window_start,
};
pub use state::CartStatus;
