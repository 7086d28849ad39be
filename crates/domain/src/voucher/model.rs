//! Voucher record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{Money, ProductRef, VoucherCode};

/// How a voucher's discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherKind {
    /// `discount_percent` off the eligible subtotal.
    Percent,
    /// Eligible units are sold at `discount_amount` each.
    FixedPrice,
    /// `discount_amount` off the eligible subtotal.
    FixedAmount,
}

impl VoucherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherKind::Percent => "PERCENT",
            VoucherKind::FixedPrice => "FIXED_PRICE",
            VoucherKind::FixedAmount => "FIXED_AMOUNT",
        }
    }
}

impl std::fmt::Display for VoucherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VoucherKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENT" => Ok(VoucherKind::Percent),
            "FIXED_PRICE" => Ok(VoucherKind::FixedPrice),
            "FIXED_AMOUNT" => Ok(VoucherKind::FixedAmount),
            other => Err(DomainError::UnknownStatus {
                kind: "voucher kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A promotional code and its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Voucher {
    pub code: VoucherCode,
    pub kind: VoucherKind,
    #[serde(default)]
    pub discount_percent: Option<u8>,
    #[serde(default)]
    pub discount_amount: Option<Money>,
    pub active: bool,
    #[serde(default)]
    pub min_spend: Option<Money>,
    /// Products the voucher applies to. `None` means every product.
    #[serde(default)]
    pub product_allowlist: Option<Vec<ProductRef>>,
    /// Maximum number of discounted units in a single cart.
    #[serde(default)]
    pub max_uses_per_cart: Option<u32>,
    #[serde(default)]
    pub max_global_uses: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub free_shipping: bool,
}

impl Voucher {
    fn base(code: VoucherCode, kind: VoucherKind) -> Self {
        Self {
            code,
            kind,
            discount_percent: None,
            discount_amount: None,
            active: true,
            min_spend: None,
            product_allowlist: None,
            max_uses_per_cart: None,
            max_global_uses: None,
            used_count: 0,
            start_date: None,
            expiry_date: None,
            free_shipping: false,
        }
    }

    /// An active, unconstrained percentage voucher.
    pub fn percent(code: VoucherCode, percent: u8) -> Self {
        Self {
            discount_percent: Some(percent.min(100)),
            ..Self::base(code, VoucherKind::Percent)
        }
    }

    /// An active, unconstrained amount-off voucher.
    pub fn fixed_amount(code: VoucherCode, amount: Money) -> Self {
        Self {
            discount_amount: Some(amount),
            ..Self::base(code, VoucherKind::FixedAmount)
        }
    }

    /// An active, unconstrained fixed-unit-price voucher.
    pub fn fixed_price(code: VoucherCode, price: Money) -> Self {
        Self {
            discount_amount: Some(price),
            ..Self::base(code, VoucherKind::FixedPrice)
        }
    }

    /// Returns true if the global cap still admits another redemption.
    pub fn has_capacity(&self) -> bool {
        self.max_global_uses.is_none_or(|cap| self.used_count < cap)
    }

    /// Returns true if `product_ref` is covered by the allowlist.
    pub fn covers(&self, product_ref: &ProductRef) -> bool {
        self.product_allowlist
            .as_ref()
            .is_none_or(|allowed| allowed.contains(product_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> VoucherCode {
        VoucherCode::parse("SAVE").unwrap()
    }

    #[test]
    fn test_capacity_respects_global_cap() {
        let mut voucher = Voucher::percent(code(), 10);
        assert!(voucher.has_capacity());

        voucher.max_global_uses = Some(1);
        assert!(voucher.has_capacity());
        voucher.used_count = 1;
        assert!(!voucher.has_capacity());
    }

    #[test]
    fn test_allowlist_coverage() {
        let mut voucher = Voucher::fixed_amount(code(), Money::from_cents(500));
        assert!(voucher.covers(&ProductRef::new("ANY")));

        voucher.product_allowlist = Some(vec![ProductRef::new("SKU-1")]);
        assert!(voucher.covers(&ProductRef::new("SKU-1")));
        assert!(!voucher.covers(&ProductRef::new("SKU-2")));
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(Voucher::percent(code(), 150).discount_percent, Some(100));
    }

    #[test]
    fn test_kind_storage_names() {
        for kind in [VoucherKind::Percent, VoucherKind::FixedPrice, VoucherKind::FixedAmount] {
            assert_eq!(kind.as_str().parse::<VoucherKind>().unwrap(), kind);
        }
        assert!("BOGO".parse::<VoucherKind>().is_err());
    }
}
