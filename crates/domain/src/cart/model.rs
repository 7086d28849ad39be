//! Cart record, line items and the shipping snapshot.

use chrono::{DateTime, Duration, Utc};
use common::CartId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{Email, Money, ProductRef, SessionRef, VoucherCode};

use super::CartStatus;

/// Width of the rolling window, from cart creation, within which a new
/// submission for the same email updates the existing open cart.
pub const CART_WINDOW_HOURS: i64 = 24;

/// Largest quantity accepted on a single line.
pub const MAX_LINE_QUANTITY: u32 = 100_000;

/// Largest `unit_price * quantity` accepted on a single line, in cents.
pub const MAX_LINE_TOTAL_CENTS: i64 = 100_000_000_000;

/// Most lines a single submission may carry.
///
/// With [`MAX_LINE_TOTAL_CENTS`] this keeps any cart subtotal far inside `i64`.
pub const MAX_CART_LINES: usize = 1_000;

/// A line in a cart or order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineItem {
    /// External product reference.
    pub product_ref: ProductRef,

    /// Quantity ordered.
    pub quantity: u32,

    /// Unit price captured when the cart was submitted.
    pub unit_price: Money,
}

impl LineItem {
    /// Creates a new line item.
    pub fn new(product_ref: impl Into<ProductRef>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_ref: product_ref.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                product_ref: self.product_ref.to_string(),
            });
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::InvalidPrice {
                product_ref: self.product_ref.to_string(),
                cents: self.unit_price.cents(),
            });
        }
        let within_bounds = self.quantity <= MAX_LINE_QUANTITY
            && self
                .unit_price
                .cents()
                .checked_mul(i64::from(self.quantity))
                .is_some_and(|total| total <= MAX_LINE_TOTAL_CENTS);
        if !within_bounds {
            return Err(DomainError::LineTooLarge {
                product_ref: self.product_ref.to_string(),
            });
        }
        Ok(())
    }
}

/// Checks a set of lines before it may become a cart or an order.
///
/// Rejects empty sets, more than [`MAX_CART_LINES`] lines, zero quantities,
/// negative prices and lines whose total exceeds [`MAX_LINE_TOTAL_CENTS`].
pub fn validate_lines(items: &[LineItem]) -> Result<(), DomainError> {
    if items.is_empty() {
        return Err(DomainError::EmptyCart);
    }
    if items.len() > MAX_CART_LINES {
        return Err(DomainError::TooManyLines {
            count: items.len(),
            max: MAX_CART_LINES,
        });
    }
    items.iter().try_for_each(LineItem::validate)
}

/// Sums the line totals of a set of items.
pub fn subtotal(items: &[LineItem]) -> Money {
    items.iter().map(LineItem::total_price).sum()
}

/// Delivery details captured with a cart and carried onto the order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingSnapshot {
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A validated cart submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    email: Email,
    items: Vec<LineItem>,
    shipping: Option<ShippingSnapshot>,
    session_ref: Option<SessionRef>,
    voucher_code: Option<VoucherCode>,
}

impl CartSnapshot {
    /// Validates a submission. Rejects empty carts and malformed lines.
    pub fn new(
        email: Email,
        items: Vec<LineItem>,
        shipping: Option<ShippingSnapshot>,
        session_ref: Option<SessionRef>,
    ) -> Result<Self, DomainError> {
        validate_lines(&items)?;

        Ok(Self {
            email,
            items,
            shipping,
            session_ref,
            voucher_code: None,
        })
    }

    /// Attaches the voucher code the storefront last applied.
    pub fn with_voucher(mut self, code: Option<VoucherCode>) -> Self {
        self.voucher_code = code;
        self
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn shipping(&self) -> Option<&ShippingSnapshot> {
        self.shipping.as_ref()
    }

    pub fn session_ref(&self) -> Option<&SessionRef> {
        self.session_ref.as_ref()
    }

    pub fn voucher_code(&self) -> Option<&VoucherCode> {
        self.voucher_code.as_ref()
    }
}

/// A customer's in-progress, unpaid selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub email: Email,
    pub items: Vec<LineItem>,
    pub shipping: Option<ShippingSnapshot>,
    pub session_ref: Option<SessionRef>,
    pub voucher_code: Option<VoucherCode>,
    pub status: CartStatus,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    /// Opens a new cart from a submission.
    pub fn open(snapshot: CartSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            email: snapshot.email,
            items: snapshot.items,
            shipping: snapshot.shipping,
            session_ref: snapshot.session_ref,
            voucher_code: snapshot.voucher_code,
            status: CartStatus::Open,
            last_active: now,
            created_at: now,
        }
    }

    /// Overwrites contents with a newer submission and refreshes `last_active`.
    pub fn overwrite(&mut self, snapshot: CartSnapshot, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_update() {
            return Err(DomainError::InvalidCartTransition {
                current: self.status,
                action: "update",
            });
        }
        self.items = snapshot.items;
        self.shipping = snapshot.shipping;
        self.session_ref = snapshot.session_ref;
        self.voucher_code = snapshot.voucher_code;
        self.last_active = now;
        Ok(())
    }

    /// Moves an open cart to `Abandoned`.
    pub fn abandon(&mut self) -> Result<(), DomainError> {
        if !self.status.can_abandon() {
            return Err(DomainError::InvalidCartTransition {
                current: self.status,
                action: "abandon",
            });
        }
        self.status = CartStatus::Abandoned;
        Ok(())
    }

    /// Moves an open or abandoned cart to `Completed`.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        if !self.status.can_complete() {
            return Err(DomainError::InvalidCartTransition {
                current: self.status,
                action: "complete",
            });
        }
        self.status = CartStatus::Completed;
        Ok(())
    }

    /// Returns true if a submission from `email` should overwrite this cart:
    /// it is open, belongs to `email` and was created after `window_start`.
    pub fn absorbs_submission(&self, email: &Email, window_start: DateTime<Utc>) -> bool {
        self.status == CartStatus::Open && &self.email == email && self.created_at > window_start
    }

    /// Returns true if the cart is open and was last touched before `idle_before`.
    pub fn is_idle(&self, idle_before: DateTime<Utc>) -> bool {
        self.status == CartStatus::Open && self.last_active < idle_before
    }

    /// Returns the sum of all line totals.
    pub fn subtotal(&self) -> Money {
        subtotal(&self.items)
    }
}

/// Oldest creation time a cart may have and still absorb new submissions.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(items: Vec<LineItem>) -> CartSnapshot {
        CartSnapshot::new(
            Email::parse("buyer@example.com").unwrap(),
            items,
            Some(ShippingSnapshot::default()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_rejects_empty_cart() {
        let result = CartSnapshot::new(
            Email::parse("buyer@example.com").unwrap(),
            vec![],
            None,
            None,
        );
        assert_eq!(result.unwrap_err(), DomainError::EmptyCart);
    }

    #[test]
    fn test_snapshot_rejects_zero_quantity_and_negative_price() {
        let email = Email::parse("buyer@example.com").unwrap();
        let zero = CartSnapshot::new(
            email.clone(),
            vec![LineItem::new("SKU-1", 0, Money::from_cents(100))],
            None,
            None,
        );
        assert!(matches!(zero, Err(DomainError::InvalidQuantity { .. })));

        let negative = CartSnapshot::new(
            email,
            vec![LineItem::new("SKU-1", 1, Money::from_cents(-1))],
            None,
            None,
        );
        assert!(matches!(negative, Err(DomainError::InvalidPrice { .. })));
    }

    #[test]
    fn test_overwrite_replaces_contents_and_refreshes_activity() {
        let created = Utc::now() - Duration::minutes(30);
        let mut cart = Cart::open(
            snapshot(vec![LineItem::new("SKU-1", 1, Money::from_cents(500))]),
            created,
        );

        let now = Utc::now();
        cart.overwrite(
            snapshot(vec![LineItem::new("SKU-2", 3, Money::from_cents(700))]),
            now,
        )
        .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product_ref.as_str(), "SKU-2");
        assert_eq!(cart.last_active, now);
        assert_eq!(cart.created_at, created);
        assert_eq!(cart.subtotal().cents(), 2100);
    }

    #[test]
    fn test_overwrite_refused_once_abandoned() {
        let mut cart = Cart::open(
            snapshot(vec![LineItem::new("SKU-1", 1, Money::from_cents(500))]),
            Utc::now(),
        );
        cart.abandon().unwrap();
        let result = cart.overwrite(
            snapshot(vec![LineItem::new("SKU-1", 2, Money::from_cents(500))]),
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(DomainError::InvalidCartTransition { action: "update", .. })
        ));
    }

    #[test]
    fn test_abandoned_cart_can_still_complete() {
        let mut cart = Cart::open(
            snapshot(vec![LineItem::new("SKU-1", 1, Money::from_cents(500))]),
            Utc::now(),
        );
        cart.abandon().unwrap();
        cart.complete().unwrap();
        assert_eq!(cart.status, CartStatus::Completed);
        assert!(cart.complete().is_err());
        assert!(cart.abandon().is_err());
    }

    #[test]
    fn test_window_and_idle_checks() {
        let now = Utc::now();
        let window = Duration::hours(CART_WINDOW_HOURS);
        let email = Email::parse("buyer@example.com").unwrap();
        let mut cart = Cart::open(
            snapshot(vec![LineItem::new("SKU-1", 1, Money::from_cents(500))]),
            now - Duration::hours(2),
        );
        assert!(cart.absorbs_submission(&email, window_start(now, window)));
        assert!(!cart.absorbs_submission(&Email::parse("other@example.com").unwrap(), window_start(now, window)));
        assert!(!cart.absorbs_submission(&email, window_start(now, Duration::hours(1))));
        assert!(cart.is_idle(now - Duration::hours(1)));
        assert!(!cart.is_idle(now - Duration::hours(3)));

        cart.abandon().unwrap();
        assert!(!cart.absorbs_submission(&email, window_start(now, window)));
        assert!(!cart.is_idle(now));

        let stale = Cart::open(
            snapshot(vec![LineItem::new("SKU-1", 1, Money::from_cents(500))]),
            now - Duration::hours(25),
        );
        assert!(!stale.absorbs_submission(&email, window_start(now, window)));
    }

    #[test]
    fn test_window_start_clamps_huge_windows() {
        let now = Utc::now();
        assert_eq!(window_start(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_snapshot_rejects_oversized_lines() {
        let email = Email::parse("buyer@example.com").unwrap();
        let submit = |items| CartSnapshot::new(email.clone(), items, None, None);

        let overflowing = submit(vec![LineItem::new("SKU-1", 3, Money::from_cents(4_000_000_000_000_000_000))]);
        assert!(matches!(overflowing, Err(DomainError::LineTooLarge { .. })));

        let too_many_units = submit(vec![LineItem::new("SKU-1", u32::MAX, Money::from_cents(1))]);
        assert!(matches!(too_many_units, Err(DomainError::LineTooLarge { .. })));

        let at_limit = submit(vec![LineItem::new(
            "SKU-1",
            MAX_LINE_QUANTITY,
            Money::from_cents(MAX_LINE_TOTAL_CENTS / i64::from(MAX_LINE_QUANTITY)),
        )]);
        assert!(at_limit.is_ok());

        let lines = (0..=MAX_CART_LINES)
            .map(|i| LineItem::new(format!("SKU-{i}"), 1, Money::from_cents(100)))
            .collect();
        assert!(matches!(submit(lines), Err(DomainError::TooManyLines { .. })));
    }

    #[test]
    fn test_line_item_rejects_unknown_fields() {
        let json = r#"{"product_ref":"SKU-1","quantity":1,"unit_price":100,"colour":"red"}"#;
        assert!(serde_json::from_str::<LineItem>(json).is_err());
    }
}
