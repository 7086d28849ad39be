//! Applying a validated voucher to a set of cart lines.

use serde::{Deserialize, Serialize};

use crate::cart::{LineItem, subtotal};
use crate::value_objects::{Money, VoucherCode};

use super::{ReasonCode, Voucher, VoucherKind};

/// Monetary effect of a voucher on a specific cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherApplication {
    pub code: VoucherCode,
    pub kind: VoucherKind,
    /// Subtotal of the units the discount was computed over.
    pub eligible_subtotal: Money,
    pub discounted_units: u32,
    pub discount: Money,
    pub free_shipping: bool,
}

/// Why a voucher that passed validation does not apply to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationRejection {
    MinSpendNotMet { required: Money, subtotal: Money },
    NotApplicable,
    PerCartLimitExceeded,
}

impl ApplicationRejection {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            ApplicationRejection::MinSpendNotMet { .. } => ReasonCode::MinSpendNotMet,
            ApplicationRejection::NotApplicable => ReasonCode::NotApplicable,
            ApplicationRejection::PerCartLimitExceeded => ReasonCode::PerCartLimitExceeded,
        }
    }
}

/// Computes the discount `voucher` gives on `items`.
///
/// Eligible lines are those covered by the allowlist. The per-cart cap
/// limits how many units, taken in line order, are discounted. A fixed
/// price never raises a unit price and an amount-off never exceeds the
/// eligible subtotal.
pub fn apply(voucher: &Voucher, items: &[LineItem]) -> Result<VoucherApplication, ApplicationRejection> {
    let cart_subtotal = subtotal(items);
    if let Some(required) = voucher.min_spend {
        if cart_subtotal < required {
            return Err(ApplicationRejection::MinSpendNotMet {
                required,
                subtotal: cart_subtotal,
            });
        }
    }

    let eligible: Vec<&LineItem> = items.iter().filter(|line| voucher.covers(&line.product_ref)).collect();
    if eligible.is_empty() {
        return Err(ApplicationRejection::NotApplicable);
    }

    let mut remaining = match voucher.max_uses_per_cart {
        Some(0) => return Err(ApplicationRejection::PerCartLimitExceeded),
        Some(cap) => cap,
        None => u32::MAX,
    };

    let mut eligible_subtotal = Money::zero();
    let mut discounted_units = 0u32;
    let mut fixed_price_discount = Money::zero();
    for line in eligible {
        if remaining == 0 {
            break;
        }
        let units = line.quantity.min(remaining);
        remaining -= units;
        discounted_units += units;
        eligible_subtotal += line.unit_price.multiply(units);

        if voucher.kind == VoucherKind::FixedPrice {
            let price = voucher.discount_amount.unwrap_or(line.unit_price);
            fixed_price_discount += line.unit_price.saturating_sub(price).multiply(units);
        }
    }

    let discount = match voucher.kind {
        VoucherKind::Percent => eligible_subtotal.percent(voucher.discount_percent.unwrap_or(0).min(100)),
        VoucherKind::FixedAmount => {
            std::cmp::max(Money::zero(), voucher.discount_amount.unwrap_or_default()).min(eligible_subtotal)
        }
        VoucherKind::FixedPrice => fixed_price_discount,
    };

    Ok(VoucherApplication {
        code: voucher.code.clone(),
        kind: voucher.kind,
        eligible_subtotal,
        discounted_units,
        discount,
        free_shipping: voucher.free_shipping,
    })
}
