//! Finalized order record and totals.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId};
use serde::{Deserialize, Serialize};

use crate::cart::{LineItem, ShippingSnapshot, subtotal};
use crate::value_objects::{Email, Money, SessionRef, VoucherCode};
use crate::voucher::{VoucherApplication, VoucherKind};

use super::FulfillmentStatus;

/// The voucher as it was applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppliedVoucher {
    pub code: VoucherCode,
    pub kind: VoucherKind,
    pub discount: Money,
    pub free_shipping: bool,
}

impl From<VoucherApplication> for AppliedVoucher {
    fn from(application: VoucherApplication) -> Self {
        Self {
            code: application.code,
            kind: application.kind,
            discount: application.discount,
            free_shipping: application.free_shipping,
        }
    }
}

/// Everything needed to finalize an order except the voucher outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub session_ref: SessionRef,
    pub email: Email,
    pub items: Vec<LineItem>,
    pub shipping: Option<ShippingSnapshot>,
    /// Cart the order originated from, when one was found.
    pub cart_id: Option<CartId>,
}

/// A paid order. There is exactly one per payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub session_ref: SessionRef,
    pub email: Email,
    pub cart_id: Option<CartId>,
    pub items: Vec<LineItem>,
    pub shipping: Option<ShippingSnapshot>,
    pub voucher: Option<AppliedVoucher>,
    pub status: FulfillmentStatus,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub free_shipping: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a paid order from a draft and the voucher that applied, if any.
    pub fn finalize(draft: OrderDraft, voucher: Option<AppliedVoucher>, now: DateTime<Utc>) -> Self {
        let mut order = Self {
            id: OrderId::new(),
            session_ref: draft.session_ref,
            email: draft.email,
            cart_id: draft.cart_id,
            items: draft.items,
            shipping: draft.shipping,
            voucher,
            status: FulfillmentStatus::Paid,
            subtotal: Money::zero(),
            discount: Money::zero(),
            total: Money::zero(),
            free_shipping: false,
            created_at: now,
        };
        order.recompute_totals();
        order
    }

    /// Drops the voucher and recomputes totals at full price.
    pub fn without_voucher(mut self) -> Self {
        self.voucher = None;
        self.recompute_totals();
        self
    }

    fn recompute_totals(&mut self) {
        self.subtotal = subtotal(&self.items);
        self.discount = self
            .voucher
            .as_ref()
            .map_or(Money::zero(), |v| v.discount)
            .min(self.subtotal);
        self.total = self.subtotal.saturating_sub(self.discount);
        self.free_shipping = self.voucher.as_ref().is_some_and(|v| v.free_shipping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OrderDraft {
        OrderDraft {
            session_ref: SessionRef::parse("cs_test_1").unwrap(),
            email: Email::parse("buyer@example.com").unwrap(),
            items: vec![
                LineItem::new("SKU-A", 2, Money::from_cents(1500)),
                LineItem::new("SKU-B", 1, Money::from_cents(1000)),
            ],
            shipping: Some(ShippingSnapshot {
                name: "Ada".into(),
                city: "Leeds".into(),
                ..Default::default()
            }),
            cart_id: Some(CartId::new()),
        }
    }

    fn applied(discount: i64, free_shipping: bool) -> AppliedVoucher {
        AppliedVoucher {
            code: VoucherCode::parse("SAVE").unwrap(),
            kind: VoucherKind::FixedAmount,
            discount: Money::from_cents(discount),
            free_shipping,
        }
    }

    #[test]
    fn test_totals_without_voucher() {
        let order = Order::finalize(draft(), None, Utc::now());
        assert_eq!(order.status, FulfillmentStatus::Paid);
        assert_eq!(order.subtotal.cents(), 4000);
        assert!(order.discount.is_zero());
        assert_eq!(order.total.cents(), 4000);
        assert!(!order.free_shipping);
    }

    #[test]
    fn test_totals_reflect_discount() {
        let order = Order::finalize(draft(), Some(applied(500, true)), Utc::now());
        assert_eq!(order.discount.cents(), 500);
        assert_eq!(order.total.cents(), 3500);
        assert!(order.free_shipping);
    }

    #[test]
    fn test_discount_never_exceeds_subtotal() {
        let order = Order::finalize(draft(), Some(applied(99_999, false)), Utc::now());
        assert_eq!(order.total, Money::zero());
    }

    #[test]
    fn test_without_voucher_recomputes_at_full_price() {
        let order = Order::finalize(draft(), Some(applied(500, true)), Utc::now()).without_voucher();
        assert!(order.voucher.is_none());
        assert_eq!(order.total.cents(), 4000);
        assert!(!order.free_shipping);
    }

    #[test]
    fn test_applied_voucher_rejects_unknown_fields() {
        let json = r#"{"code":"SAVE","kind":"PERCENT","discount":100,"free_shipping":false,"note":"x"}"#;
        assert!(serde_json::from_str::<AppliedVoucher>(json).is_err());
    }
}
