//! Checkout and order fulfillment.
//!
//! - [`CheckoutManager`] records cart submissions and sweeps idle carts
//!   into the abandoned state with one recovery notification each.
//! - [`OrderPipeline`] turns a paid payment session into exactly one order.
//! - [`VoucherService`] answers voucher queries from the storefront.
//! - [`webhook`] verifies signed payment-provider events.
//!
//! External collaborators (payment gateway, notifier) are traits with
//! in-memory implementations in [`services`].

pub mod checkout;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod vouchers;
pub mod webhook;

pub use checkout::{CheckoutManager, CheckoutSubmission, SweepReport};
pub use config::FulfillmentConfig;
pub use error::{FulfillmentError, Result};
pub use pipeline::{Completion, OrderPipeline};
pub use state::SessionState;
pub use vouchers::{VoucherCheck, VoucherService};
pub use webhook::{PaymentEvent, WebhookError, WebhookVerifier, tokens_match};
