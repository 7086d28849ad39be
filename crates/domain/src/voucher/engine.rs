//! Voucher validation.
//!
//! [`validate`] is a pure function of the voucher record and the current
//! time. It checks, in order and stopping at the first failure:
//!
//! 1. the code exists
//! 2. the voucher is active
//! 3. the start date has passed
//! 4. the expiry date has not passed
//! 5. the global use cap is not exhausted
//!
//! Cart-dependent rules live in [`super::apply`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, ProductRef};

use super::{Voucher, VoucherKind};

/// Single reason attached to a verdict or an application rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Valid,
    CodeNotFound,
    VoucherDisabled,
    VoucherPending,
    VoucherExpired,
    UseLimitReached,
    MinSpendNotMet,
    NotApplicable,
    PerCartLimitExceeded,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Valid => "VALID",
            ReasonCode::CodeNotFound => "CODE_NOT_FOUND",
            ReasonCode::VoucherDisabled => "VOUCHER_DISABLED",
            ReasonCode::VoucherPending => "VOUCHER_PENDING",
            ReasonCode::VoucherExpired => "VOUCHER_EXPIRED",
            ReasonCode::UseLimitReached => "USE_LIMIT_REACHED",
            ReasonCode::MinSpendNotMet => "MIN_SPEND_NOT_MET",
            ReasonCode::NotApplicable => "NOT_APPLICABLE",
            ReasonCode::PerCartLimitExceeded => "PER_CART_LIMIT_EXCEEDED",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a valid voucher would give, before it is applied to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountDescriptor {
    pub kind: VoucherKind,
    /// Set for [`VoucherKind::Percent`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<u8>,
    /// Set for the fixed kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<Money>,
    pub free_shipping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_allowlist: Option<Vec<ProductRef>>,
}

impl DiscountDescriptor {
    fn from_voucher(voucher: &Voucher) -> Self {
        let (discount_percent, discount_amount) = match voucher.kind {
            VoucherKind::Percent => (voucher.discount_percent, None),
            VoucherKind::FixedPrice | VoucherKind::FixedAmount => (None, voucher.discount_amount),
        };
        Self {
            kind: voucher.kind,
            discount_percent,
            discount_amount,
            free_shipping: voucher.free_shipping,
            product_allowlist: voucher.product_allowlist.clone(),
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub reason_code: ReasonCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<DiscountDescriptor>,
}

impl Verdict {
    fn rejected(reason_code: ReasonCode) -> Self {
        Self {
            valid: false,
            reason_code,
            discount: None,
        }
    }
}

/// Validates a looked-up voucher at `now`. `None` means the code was not found.
pub fn validate(voucher: Option<&Voucher>, now: DateTime<Utc>) -> Verdict {
    let Some(voucher) = voucher else {
        return Verdict::rejected(ReasonCode::CodeNotFound);
    };
    if !voucher.active {
        return Verdict::rejected(ReasonCode::VoucherDisabled);
    }
    if voucher.start_date.is_some_and(|start| start > now) {
        return Verdict::rejected(ReasonCode::VoucherPending);
    }
    if voucher.expiry_date.is_some_and(|expiry| expiry < now) {
        return Verdict::rejected(ReasonCode::VoucherExpired);
    }
    if !voucher.has_capacity() {
        return Verdict::rejected(ReasonCode::UseLimitReached);
    }

    Verdict {
        valid: true,
        reason_code: ReasonCode::Valid,
        discount: Some(DiscountDescriptor::from_voucher(voucher)),
    }
}
