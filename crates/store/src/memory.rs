use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, OrderId, ProductId};
use domain::inventory::allocate;
use domain::{
    Batch, Cart, CartSnapshot, CartStatus, Email, Order, Product, ProductRef, SessionRef,
    VolumeTier, Voucher, VoucherCode,
};
use tokio::sync::RwLock;

use crate::{
    ORDER_SESSION_CONSTRAINT, Result, StoreError,
    store::{
        CartStore, CartUpsert, Finalization, InventoryStore, OrderStore, ProductStock,
        StockShortfall, VoucherStore,
    },
};

#[derive(Default)]
struct Tables {
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    orders_by_session: HashMap<SessionRef, OrderId>,
    products: HashMap<ProductId, Product>,
    batches: Vec<Batch>,
    vouchers: HashMap<VoucherCode, Voucher>,
    volume_tiers: Vec<(VolumeTier, bool)>,
    failing_carts: HashSet<CartId>,
}

impl Tables {
    fn check_cart_writable(&self, id: CartId) -> Result<()> {
        if self.failing_carts.contains(&id) {
            return Err(StoreError::Unavailable(format!("writes to cart {id} are failing")));
        }
        Ok(())
    }

    fn latest_cart<'a>(carts: impl Iterator<Item = &'a Cart>) -> Option<Cart> {
        carts.max_by_key(|c| c.last_active).cloned()
    }
}

/// In-memory store for tests and the zero-configuration binary.
///
/// All tables sit behind one lock, so every trait method is atomic with
/// respect to every other, matching the transactional guarantees of
/// [`crate::PostgresStore`].
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write to `cart_id` fail with `Unavailable`.
    pub async fn fail_writes_for_cart(&self, cart_id: CartId) {
        self.tables.write().await.failing_carts.insert(cart_id);
    }

    /// Returns all carts recorded for `email`.
    pub async fn carts_for_email(&self, email: &Email) -> Vec<Cart> {
        let tables = self.tables.read().await;
        let mut carts: Vec<_> = tables.carts.values().filter(|c| &c.email == email).cloned().collect();
        carts.sort_by_key(|c| c.created_at);
        carts
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Overwrites a cart's timestamps, for simulating idle carts.
    pub async fn backdate_cart(&self, cart_id: CartId, created_at: DateTime<Utc>, last_active: DateTime<Utc>) {
        if let Some(cart) = self.tables.write().await.carts.get_mut(&cart_id) {
            cart.created_at = created_at;
            cart.last_active = last_active;
        }
    }

    /// Stores a cart exactly as given, without submission checks. Stands in
    /// for rows written before the current line limits existed.
    pub async fn insert_cart(&self, cart: Cart) {
        self.tables.write().await.carts.insert(cart.id, cart);
    }

    /// Returns the batches held for a product.
    pub async fn batches_for(&self, product_id: ProductId) -> Vec<Batch> {
        let tables = self.tables.read().await;
        tables.batches.iter().filter(|b| b.product_id == product_id).cloned().collect()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn upsert_open_cart(
        &self,
        snapshot: CartSnapshot,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CartUpsert> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .carts
            .values()
            .filter(|c| c.absorbs_submission(snapshot.email(), window_start))
            .max_by_key(|c| c.created_at)
            .map(|c| c.id);

        match existing {
            Some(id) => {
                tables.check_cart_writable(id)?;
                if let Some(cart) = tables.carts.get_mut(&id) {
                    cart.overwrite(snapshot, now)?;
                }
                Ok(CartUpsert {
                    cart_id: id,
                    created: false,
                })
            }
            None => {
                let cart = Cart::open(snapshot, now);
                let cart_id = cart.id;
                tables.carts.insert(cart_id, cart);
                Ok(CartUpsert {
                    cart_id,
                    created: true,
                })
            }
        }
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.tables.read().await.carts.get(&id).cloned())
    }

    async fn find_idle_open_carts(&self, idle_before: DateTime<Utc>) -> Result<Vec<Cart>> {
        let tables = self.tables.read().await;
        let mut carts: Vec<_> = tables
            .carts
            .values()
            .filter(|c| c.is_idle(idle_before))
            .cloned()
            .collect();
        carts.sort_by_key(|c| c.last_active);
        Ok(carts)
    }

    async fn mark_abandoned(&self, id: CartId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        tables.check_cart_writable(id)?;
        match tables.carts.get_mut(&id) {
            Some(cart) if cart.status.can_abandon() => {
                cart.abandon()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_cart_by_session(&self, session_ref: &SessionRef) -> Result<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(Tables::latest_cart(tables.carts.values().filter(|c| {
            c.session_ref.as_ref() == Some(session_ref) && c.status != CartStatus::Completed
        })))
    }

    async fn find_recent_cart_by_email(
        &self,
        email: &Email,
        since: DateTime<Utc>,
    ) -> Result<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(Tables::latest_cart(tables.carts.values().filter(|c| {
            &c.email == email && c.status != CartStatus::Completed && c.last_active >= since
        })))
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_order_by_session(&self, session_ref: &SessionRef) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders_by_session
            .get(session_ref)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn finalize_order(&self, order: Order) -> Result<Finalization> {
        let mut tables = self.tables.write().await;

        if tables.orders_by_session.contains_key(&order.session_ref) {
            return Err(StoreError::Conflict {
                constraint: ORDER_SESSION_CONSTRAINT.to_string(),
            });
        }
        if let Some(cart_id) = order.cart_id {
            tables.check_cart_writable(cart_id)?;
        }

        let mut order = order;
        let mut voucher_lost = false;
        if let Some(applied) = &order.voucher {
            let redeemed = match tables.vouchers.get_mut(&applied.code) {
                Some(voucher) if voucher.active && voucher.has_capacity() => {
                    voucher.used_count += 1;
                    true
                }
                _ => false,
            };
            if !redeemed {
                order = order.without_voucher();
                voucher_lost = true;
            }
        }

        let mut shortfalls = Vec::new();
        let mut lines: Vec<_> = order.items.iter().collect();
        lines.sort_by(|a, b| a.product_ref.cmp(&b.product_ref));
        for line in lines {
            let product_id = tables
                .products
                .values()
                .find(|p| p.reference == line.product_ref)
                .map(|p| p.id);
            let candidates: Vec<Batch> = match product_id {
                Some(id) => tables.batches.iter().filter(|b| b.product_id == id).cloned().collect(),
                None => Vec::new(),
            };

            let allocation = allocate(&candidates, line.quantity);
            for draw in &allocation.draws {
                if let Some(batch) = tables.batches.iter_mut().find(|b| b.id == draw.batch_id) {
                    batch.draw(draw.quantity);
                }
            }
            if allocation.shortfall > 0 {
                shortfalls.push(StockShortfall {
                    product_ref: line.product_ref.clone(),
                    requested: line.quantity,
                    missing: allocation.shortfall,
                });
            }
        }

        if let Some(cart) = order.cart_id.and_then(|id| tables.carts.get_mut(&id)) {
            if cart.status.can_complete() {
                cart.complete()?;
                cart.last_active = order.created_at;
            }
        }

        tables.orders_by_session.insert(order.session_ref.clone(), order.id);
        tables.orders.insert(order.id, order.clone());

        Ok(Finalization {
            order,
            voucher_lost,
            shortfalls,
        })
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn product_stock(&self, refs: Option<&[ProductRef]>) -> Result<Vec<ProductStock>> {
        let tables = self.tables.read().await;
        let mut stock: Vec<_> = tables
            .products
            .values()
            .filter(|p| refs.is_none_or(|refs| refs.contains(&p.reference)))
            .map(|p| ProductStock {
                product: p.clone(),
                batches: tables.batches.iter().filter(|b| b.product_id == p.id).cloned().collect(),
            })
            .collect();
        stock.sort_by(|a, b| a.product.reference.cmp(&b.product.reference));
        Ok(stock)
    }

    async fn active_volume_tiers(&self) -> Result<Vec<VolumeTier>> {
        let tables = self.tables.read().await;
        let mut tiers: Vec<_> = tables
            .volume_tiers
            .iter()
            .filter(|(_, active)| *active)
            .map(|(tier, _)| *tier)
            .collect();
        tiers.sort_by_key(|t| t.min_quantity);
        Ok(tiers)
    }

    async fn insert_product(&self, product: Product) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.products.values().any(|p| p.reference == product.reference) {
            return Err(StoreError::Conflict {
                constraint: "products_reference_key".to_string(),
            });
        }
        tables.products.insert(product.id, product);
        Ok(())
    }

    async fn insert_batch(&self, batch: Batch) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&batch.product_id) {
            return Err(StoreError::NotFound {
                entity: "product",
                id: batch.product_id.to_string(),
            });
        }
        tables.batches.push(batch);
        Ok(())
    }

    async fn insert_volume_tier(&self, tier: VolumeTier, active: bool) -> Result<()> {
        self.tables.write().await.volume_tiers.push((tier, active));
        Ok(())
    }
}

#[async_trait]
impl VoucherStore for InMemoryStore {
    async fn find_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>> {
        Ok(self.tables.read().await.vouchers.get(code).cloned())
    }

    async fn save_voucher(&self, voucher: Voucher) -> Result<()> {
        let mut tables = self.tables.write().await;
        let used_count = tables
            .vouchers
            .get(&voucher.code)
            .map_or(voucher.used_count, |existing| existing.used_count.max(voucher.used_count));
        tables.vouchers.insert(voucher.code.clone(), Voucher { used_count, ..voucher });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use domain::cart::{CART_WINDOW_HOURS, window_start};
    use domain::inventory::BatchStatus;
    use domain::voucher::apply;
    use domain::{AppliedVoucher, LineItem, Money, OrderDraft};

    use super::*;

    fn cart_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, Duration::hours(CART_WINDOW_HOURS))
    }

    fn email() -> Email {
        Email::parse("buyer@example.com").unwrap()
    }

    fn snapshot(sku: &str, qty: u32) -> CartSnapshot {
        CartSnapshot::new(email(), vec![LineItem::new(sku, qty, Money::from_cents(1000))], None, None).unwrap()
    }

    fn order_for(session: &str, cart_id: Option<CartId>, voucher: Option<AppliedVoucher>) -> Order {
        Order::finalize(
            OrderDraft {
                session_ref: SessionRef::parse(session).unwrap(),
                email: email(),
                items: vec![LineItem::new("SKU-1", 3, Money::from_cents(1000))],
                shipping: None,
                cart_id,
            },
            voucher,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn upsert_within_window_updates_same_cart() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let first = store.upsert_open_cart(snapshot("SKU-1", 1), cart_window_start(now), now).await.unwrap();
        let second = store.upsert_open_cart(snapshot("SKU-2", 5), cart_window_start(now), now).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.cart_id, second.cart_id);

        let carts = store.carts_for_email(&email()).await;
        assert_eq!(carts.len(), 1);
        assert_eq!(carts[0].items[0].product_ref.as_str(), "SKU-2");
    }

    #[tokio::test]
    async fn upsert_outside_window_opens_new_cart() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let first = store.upsert_open_cart(snapshot("SKU-1", 1), cart_window_start(now), now).await.unwrap();
        store
            .backdate_cart(first.cart_id, now - Duration::hours(30), now - Duration::hours(30))
            .await;

        let second = store.upsert_open_cart(snapshot("SKU-1", 1), cart_window_start(now), now).await.unwrap();
        assert!(second.created);
        assert_ne!(first.cart_id, second.cart_id);
    }

    #[tokio::test]
    async fn mark_abandoned_only_transitions_once() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let cart = store.upsert_open_cart(snapshot("SKU-1", 1), cart_window_start(now), now).await.unwrap();

        assert!(store.mark_abandoned(cart.cart_id).await.unwrap());
        assert!(!store.mark_abandoned(cart.cart_id).await.unwrap());
        assert!(!store.mark_abandoned(CartId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn failing_cart_writes_surface_unavailable() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let cart = store.upsert_open_cart(snapshot("SKU-1", 1), cart_window_start(now), now).await.unwrap();
        store.fail_writes_for_cart(cart.cart_id).await;

        let result = store.mark_abandoned(cart.cart_id).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn duplicate_session_is_a_conflict() {
        let store = InMemoryStore::new();
        store.finalize_order(order_for("cs_1", None, None)).await.unwrap();

        let err = store.finalize_order(order_for("cs_1", None, None)).await.unwrap_err();
        assert!(err.is_duplicate_order());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn finalize_completes_abandoned_cart() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let cart = store.upsert_open_cart(snapshot("SKU-1", 3), cart_window_start(now), now).await.unwrap();
        store.mark_abandoned(cart.cart_id).await.unwrap();

        store.finalize_order(order_for("cs_2", Some(cart.cart_id), None)).await.unwrap();
        let cart = store.get_cart(cart.cart_id).await.unwrap().unwrap();
        assert_eq!(cart.status, CartStatus::Completed);
    }

    #[tokio::test]
    async fn finalize_redeems_voucher_until_cap() {
        let store = InMemoryStore::new();
        let mut voucher = Voucher::percent(VoucherCode::parse("ONCE").unwrap(), 10);
        voucher.max_global_uses = Some(1);
        store.save_voucher(voucher.clone()).await.unwrap();

        let items = vec![LineItem::new("SKU-1", 3, Money::from_cents(1000))];
        let applied = || Some(AppliedVoucher::from(apply(&voucher, &items).unwrap()));

        let first = store.finalize_order(order_for("cs_a", None, applied())).await.unwrap();
        assert!(!first.voucher_lost);
        assert_eq!(first.order.discount.cents(), 300);

        let second = store.finalize_order(order_for("cs_b", None, applied())).await.unwrap();
        assert!(second.voucher_lost);
        assert!(second.order.voucher.is_none());
        assert_eq!(second.order.total.cents(), 3000);

        let stored = store.find_voucher(&voucher.code).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
    }

    #[tokio::test]
    async fn finalize_draws_live_stock_and_reports_shortfall() {
        let store = InMemoryStore::new();
        let product = Product::new("SKU-1", "Widget", Money::from_cents(1000));
        let product_id = product.id;
        store.insert_product(product).await.unwrap();
        let old = Utc::now() - Duration::days(2);
        store.insert_batch(Batch::new(product_id, BatchStatus::Live, 2, old)).await.unwrap();
        store
            .insert_batch(Batch::new(product_id, BatchStatus::Pending, 50, old))
            .await
            .unwrap();

        let result = store.finalize_order(order_for("cs_s", None, None)).await.unwrap();
        assert_eq!(result.shortfalls.len(), 1);
        assert_eq!(result.shortfalls[0].missing, 1);

        let batches = store.batches_for(product_id).await;
        let live: Vec<_> = batches.iter().filter(|b| b.stock_quantity == 0).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].status, BatchStatus::Depleted);
    }

    #[tokio::test]
    async fn save_voucher_never_lowers_usage() {
        let store = InMemoryStore::new();
        let mut voucher = Voucher::percent(VoucherCode::parse("KEEP").unwrap(), 10);
        voucher.used_count = 4;
        store.save_voucher(voucher.clone()).await.unwrap();

        voucher.used_count = 0;
        voucher.active = false;
        store.save_voucher(voucher.clone()).await.unwrap();

        let stored = store.find_voucher(&voucher.code).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 4);
        assert!(!stored.active);
    }

    #[tokio::test]
    async fn volume_tiers_filtered_and_sorted() {
        let store = InMemoryStore::new();
        store
            .insert_volume_tier(VolumeTier { min_quantity: 50, discount_percent: 10 }, true)
            .await
            .unwrap();
        store
            .insert_volume_tier(VolumeTier { min_quantity: 10, discount_percent: 5 }, true)
            .await
            .unwrap();
        store
            .insert_volume_tier(VolumeTier { min_quantity: 100, discount_percent: 20 }, false)
            .await
            .unwrap();

        let tiers = store.active_volume_tiers().await.unwrap();
        assert_eq!(tiers.iter().map(|t| t.min_quantity).collect::<Vec<_>>(), vec![10, 50]);
    }
}
