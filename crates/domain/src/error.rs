//! Domain error types.

use thiserror::Error;

use crate::cart::CartStatus;

/// Errors raised when input or a requested transition violates a domain rule.
///
/// Every variant is a rejection of malformed or out-of-order input; none of
/// them indicate an infrastructure failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Email address could not be normalized into a usable identity.
    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    /// A cart submission carried no line items.
    #[error("Cart has no items")]
    EmptyCart,

    /// A line item quantity was zero.
    #[error("Invalid quantity for {product_ref}: must be greater than 0")]
    InvalidQuantity { product_ref: String },

    /// A line item price was negative.
    #[error("Invalid unit price for {product_ref}: {cents} (must not be negative)")]
    InvalidPrice { product_ref: String, cents: i64 },

    /// A line's quantity or total is beyond what a storefront order can hold.
    #[error("Line for {product_ref} exceeds the per-line quantity or total limit")]
    LineTooLarge { product_ref: String },

    /// A submission carried more lines than a cart may hold.
    #[error("Cart has {count} lines (at most {max} allowed)")]
    TooManyLines { count: usize, max: usize },

    /// An identifier field was empty after trimming.
    #[error("{field} must not be blank")]
    Blank { field: &'static str },

    /// A cart status transition was requested from a state that forbids it.
    #[error("Invalid cart transition: cannot {action} from {current} state")]
    InvalidCartTransition {
        current: CartStatus,
        action: &'static str,
    },

    /// A status string read from storage or the wire was not recognised.
    #[error("Unknown {kind} status: {value:?}")]
    UnknownStatus { kind: &'static str, value: String },
}
