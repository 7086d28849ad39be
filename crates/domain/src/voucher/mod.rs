//! Voucher records, validation and cart-level application.

mod application;
mod engine;
mod model;

pub use application::{ApplicationRejection, VoucherApplication, apply};
pub use engine::{DiscountDescriptor, ReasonCode, Verdict, validate};
pub use model::{Voucher, VoucherKind};
