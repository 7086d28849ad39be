//! Order completion pipeline.
//!
//! Turns a paid payment session into exactly one order. The store's unique
//! constraint on the session reference is the only concurrency guard: a
//! completion that loses the insert race re-fetches and returns the order
//! that won.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::cart::validate_lines;
use domain::voucher::{apply, validate};
use domain::{AppliedVoucher, Cart, DomainError, LineItem, Order, OrderDraft, ProductRef, SessionRef, VoucherCode};
use inventory::InventoryAggregator;
use serde::Serialize;
use store::CommerceStore;

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::services::{Notification, Notifier, PaymentGateway, PaymentSession, send_best_effort};
use crate::state::SessionState;

/// Outcome of [`OrderPipeline::complete_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "order", rename_all = "snake_case")]
pub enum Completion {
    /// The provider does not report the session as paid. Nothing changed.
    Pending,
    /// This call created the order.
    Created(Order),
    /// The order already existed, created by this or an earlier delivery.
    Existing(Order),
}

impl Completion {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Completion::Pending => None,
            Completion::Created(order) | Completion::Existing(order) => Some(order),
        }
    }

    pub fn into_order(self) -> Option<Order> {
        match self {
            Completion::Pending => None,
            Completion::Created(order) | Completion::Existing(order) => Some(order),
        }
    }

    pub fn state(&self) -> SessionState {
        match self {
            Completion::Pending => SessionState::Unseen,
            Completion::Created(_) | Completion::Existing(_) => SessionState::Completed,
        }
    }
}

/// Marks a session as processing for as long as it is alive.
struct InFlight<'a> {
    sessions: &'a Mutex<HashSet<SessionRef>>,
    session_ref: SessionRef,
}

impl<'a> InFlight<'a> {
    fn enter(sessions: &'a Mutex<HashSet<SessionRef>>, session_ref: &SessionRef) -> Self {
        sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_ref.clone());
        Self {
            sessions,
            session_ref: session_ref.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_ref);
    }
}

/// Drives a payment session to a finalized order.
pub struct OrderPipeline<S: ?Sized, G: ?Sized, N: ?Sized> {
    store: Arc<S>,
    inventory: InventoryAggregator<S>,
    gateway: Arc<G>,
    notifier: Arc<N>,
    config: FulfillmentConfig,
    in_flight: Arc<Mutex<HashSet<SessionRef>>>,
}

impl<S: ?Sized, G: ?Sized, N: ?Sized> Clone for OrderPipeline<S, G, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            inventory: self.inventory.clone(),
            gateway: Arc::clone(&self.gateway),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S, G, N> OrderPipeline<S, G, N>
where
    S: CommerceStore + ?Sized,
    G: PaymentGateway + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(store: Arc<S>, gateway: Arc<G>, notifier: Arc<N>, config: FulfillmentConfig) -> Self {
        Self {
            inventory: InventoryAggregator::new(Arc::clone(&store)),
            store,
            gateway,
            notifier,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Completes the order for `session_ref`.
    ///
    /// Safe to call any number of times and concurrently for the same
    /// session: every call returns the same order, and the voucher, stock
    /// and cart side effects happen once. Payment status always comes from
    /// the gateway, never from the caller.
    #[tracing::instrument(skip(self), fields(session_ref = %session_ref))]
    pub async fn complete_order(&self, session_ref: &SessionRef) -> Result<Completion> {
        let start = Instant::now();

        if let Some(order) = self.store.find_order_by_session(session_ref).await? {
            tracing::info!(order_id = %order.id, "order already finalized");
            metrics::counter!("orders_replayed_total").increment(1);
            return Ok(Completion::Existing(order));
        }

        let _in_flight = InFlight::enter(&self.in_flight, session_ref);

        let Some(session) = self.retrieve_paid_session(session_ref).await? else {
            tracing::info!("payment not confirmed");
            return Ok(Completion::Pending);
        };

        let now = Utc::now();
        let cart = self.resolve_cart(&session, now).await?;
        let voucher_code = session
            .voucher_code
            .clone()
            .or_else(|| cart.as_ref().and_then(|c| c.voucher_code.clone()));
        let draft = build_draft(session, cart)?;

        self.check_stock(&draft.items).await?;
        let voucher = match voucher_code {
            Some(code) => self.reconcile_voucher(&code, &draft.items, now).await?,
            None => None,
        };

        let order = Order::finalize(draft, voucher, now);
        let finalization = match self.store.finalize_order(order).await {
            Ok(finalization) => finalization,
            Err(e) if e.is_duplicate_order() => {
                let existing = self.store.find_order_by_session(session_ref).await?.ok_or_else(|| {
                    FulfillmentError::Conflict(format!("order for session {session_ref} vanished after conflict"))
                })?;
                tracing::info!(order_id = %existing.id, "order already finalized");
                metrics::counter!("orders_replayed_total").increment(1);
                return Ok(Completion::Existing(existing));
            }
            Err(e) => return Err(e.into()),
        };

        if finalization.voucher_lost {
            tracing::warn!(order_id = %finalization.order.id, "voucher redemption lost to concurrent order");
            metrics::counter!("voucher_redemptions_lost_total").increment(1);
        }
        for shortfall in &finalization.shortfalls {
            tracing::warn!(
                order_id = %finalization.order.id,
                product_ref = %shortfall.product_ref,
                requested = shortfall.requested,
                missing = shortfall.missing,
                "stock shortfall"
            );
        }

        let order = finalization.order;
        let receipt = Notification::Receipt {
            order_id: order.id,
            session_ref: order.session_ref.clone(),
            items: order.items.clone(),
            discount: order.discount,
            total: order.total,
        };
        send_best_effort(self.notifier.as_ref(), &order.email, receipt, self.config.upstream_timeout).await;

        metrics::counter!("orders_completed_total").increment(1);
        metrics::histogram!("order_completion_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, total = %order.total, "order completed");
        Ok(Completion::Created(order))
    }

    /// Where `session_ref` currently stands.
    pub async fn session_state(&self, session_ref: &SessionRef) -> Result<SessionState> {
        if self.store.find_order_by_session(session_ref).await?.is_some() {
            return Ok(SessionState::Completed);
        }
        let processing = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(session_ref);
        Ok(if processing {
            SessionState::Processing
        } else {
            SessionState::Unseen
        })
    }

    async fn retrieve_paid_session(&self, session_ref: &SessionRef) -> Result<Option<PaymentSession>> {
        let session = tokio::time::timeout(self.config.upstream_timeout, self.gateway.retrieve_session(session_ref))
            .await
            .map_err(|_| FulfillmentError::upstream("payment", "session lookup timed out"))??;
        Ok(session.filter(PaymentSession::is_paid))
    }

    /// Finds the cart the session was paid for: by session reference first,
    /// then the email's most recent cart within the cart window.
    async fn resolve_cart(&self, session: &PaymentSession, now: DateTime<Utc>) -> Result<Option<Cart>> {
        if let Some(cart) = self.store.find_cart_by_session(&session.session_ref).await? {
            return Ok(Some(cart));
        }
        let Some(email) = &session.customer_email else {
            return Ok(None);
        };
        let since = self.config.window_start(now);
        let cart = self.store.find_recent_cart_by_email(email, since).await?;
        if cart.is_none() {
            tracing::warn!("no cart found for paid session, using provider line items");
        }
        Ok(cart)
    }

    async fn check_stock(&self, items: &[LineItem]) -> Result<()> {
        let mut wanted: BTreeMap<ProductRef, u32> = BTreeMap::new();
        for line in items {
            let total = wanted.entry(line.product_ref.clone()).or_default();
            *total = total.saturating_add(line.quantity);
        }
        let refs: Vec<ProductRef> = wanted.keys().cloned().collect();
        let availability = self.inventory.get_availability(Some(&refs)).await?;

        for (product_ref, quantity) in wanted {
            let stock = availability.get(&product_ref).map_or(0, |a| a.stock);
            if stock < quantity {
                tracing::warn!(
                    product_ref = %product_ref,
                    requested = quantity,
                    missing = quantity - stock,
                    "stock shortfall"
                );
            }
        }
        Ok(())
    }

    /// Re-validates the voucher against current state. An invalid voucher
    /// does not block the order; it is completed at full price.
    async fn reconcile_voucher(
        &self,
        code: &VoucherCode,
        items: &[LineItem],
        now: DateTime<Utc>,
    ) -> Result<Option<AppliedVoucher>> {
        let voucher = self.store.find_voucher(code).await?;
        let verdict = validate(voucher.as_ref(), now);

        let outcome = match voucher.as_ref() {
            Some(voucher) if verdict.valid => apply(voucher, items).map_err(|rejection| rejection.reason_code()),
            _ => Err(verdict.reason_code),
        };
        match outcome {
            Ok(application) => Ok(Some(application.into())),
            Err(reason_code) => {
                tracing::warn!(
                    voucher_code = %code,
                    reason_code = %reason_code,
                    "voucher no longer valid at payment time"
                );
                metrics::counter!("voucher_reconciled_full_price_total").increment(1);
                Ok(None)
            }
        }
    }
}

fn build_draft(session: PaymentSession, cart: Option<Cart>) -> Result<OrderDraft> {
    let (cart_id, email, items, shipping) = match cart {
        Some(cart) => (
            Some(cart.id),
            Some(cart.email),
            cart.items,
            cart.shipping.or(session.shipping),
        ),
        None => (None, session.customer_email, session.items, session.shipping),
    };

    let email = email.ok_or(DomainError::Blank {
        field: "customer email",
    })?;
    validate_lines(&items)?;

    Ok(OrderDraft {
        session_ref: session.session_ref,
        email,
        items,
        shipping,
        cart_id,
    })
}

#[cfg(test)]
mod tests {
    use domain::{Email, Money};
    use store::InMemoryStore;

    use super::*;
    use crate::services::{InMemoryNotifier, InMemoryPaymentGateway, PaymentStatus};

    type Pipeline = OrderPipeline<InMemoryStore, InMemoryPaymentGateway, InMemoryNotifier>;

    fn session(status: PaymentStatus, items: Vec<LineItem>) -> PaymentSession {
        PaymentSession {
            session_ref: SessionRef::parse("cs_unit").unwrap(),
            status,
            customer_email: Some(Email::parse("buyer@shop.co").unwrap()),
            items,
            shipping: None,
            voucher_code: None,
        }
    }

    fn pipeline() -> (Pipeline, Arc<InMemoryPaymentGateway>) {
        let gateway = Arc::new(InMemoryPaymentGateway::new());
        let pipeline = OrderPipeline::new(
            Arc::new(InMemoryStore::new()),
            gateway.clone(),
            Arc::new(InMemoryNotifier::new()),
            FulfillmentConfig::default(),
        );
        (pipeline, gateway)
    }

    #[tokio::test]
    async fn test_unpaid_session_is_pending() {
        let (pipeline, gateway) = pipeline();
        let items = vec![LineItem::new("SKU-1", 1, Money::from_cents(100))];
        gateway.put_session(session(PaymentStatus::Unpaid, items)).await;

        let key = SessionRef::parse("cs_unit").unwrap();
        let completion = pipeline.complete_order(&key).await.unwrap();
        assert_eq!(completion, Completion::Pending);
        assert_eq!(completion.state(), SessionState::Unseen);
        assert_eq!(pipeline.session_state(&key).await.unwrap(), SessionState::Unseen);
    }

    #[tokio::test]
    async fn test_paid_session_without_cart_uses_provider_items() {
        let (pipeline, gateway) = pipeline();
        let items = vec![LineItem::new("SKU-1", 3, Money::from_cents(250))];
        gateway.put_session(session(PaymentStatus::Paid, items.clone())).await;

        let key = SessionRef::parse("cs_unit").unwrap();
        let completion = pipeline.complete_order(&key).await.unwrap();
        let order = completion.order().unwrap();
        assert!(matches!(completion, Completion::Created(_)));
        assert_eq!(order.items, items);
        assert_eq!(order.cart_id, None);
        assert_eq!(order.total.cents(), 750);
        assert_eq!(pipeline.session_state(&key).await.unwrap(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_paid_session_with_nothing_to_order_is_invalid() {
        let (pipeline, gateway) = pipeline();
        gateway.put_session(session(PaymentStatus::Paid, vec![])).await;

        let result = pipeline.complete_order(&SessionRef::parse("cs_unit").unwrap()).await;
        assert!(matches!(result, Err(FulfillmentError::Invalid(DomainError::EmptyCart))));
    }

    #[tokio::test]
    async fn test_paid_session_with_oversized_lines_is_invalid() {
        let (pipeline, gateway) = pipeline();
        let items = vec![
            LineItem::new("SKU-X", u32::MAX, Money::from_cents(1)),
            LineItem::new("SKU-X", 1, Money::from_cents(1)),
        ];
        gateway.put_session(session(PaymentStatus::Paid, items)).await;

        let key = SessionRef::parse("cs_unit").unwrap();
        let result = pipeline.complete_order(&key).await;
        assert!(matches!(result, Err(FulfillmentError::Invalid(DomainError::LineTooLarge { .. }))));
        assert_eq!(pipeline.session_state(&key).await.unwrap(), SessionState::Unseen);
    }

    #[test]
    fn test_completion_serializes_with_status_tag() {
        let json = serde_json::to_value(Completion::Pending).unwrap();
        assert_eq!(json, serde_json::json!({"status": "pending"}));
    }

    #[test]
    fn test_in_flight_guard_clears_on_drop() {
        let sessions = Mutex::new(HashSet::new());
        let key = SessionRef::parse("cs_guard").unwrap();
        {
            let _guard = InFlight::enter(&sessions, &key);
            assert!(sessions.lock().unwrap().contains(&key));
        }
        assert!(sessions.lock().unwrap().is_empty());
    }
}
