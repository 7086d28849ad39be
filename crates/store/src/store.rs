use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CartId;
use domain::{
    Batch, Cart, CartSnapshot, Email, Order, Product, ProductRef, SessionRef, VolumeTier, Voucher,
    VoucherCode,
};

use crate::Result;

/// Outcome of recording a cart submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartUpsert {
    pub cart_id: CartId,
    /// False when an existing open cart absorbed the submission.
    pub created: bool,
}

/// A product together with all of its batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductStock {
    pub product: Product,
    pub batches: Vec<Batch>,
}

/// Units that could not be drawn from live stock while finalizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortfall {
    pub product_ref: ProductRef,
    pub requested: u32,
    pub missing: u32,
}

/// Result of persisting an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalization {
    /// The order as stored. Its voucher is stripped if the redemption lost.
    pub order: Order,
    /// True if the voucher's global cap was exhausted by a concurrent order.
    pub voucher_lost: bool,
    pub shortfalls: Vec<StockShortfall>,
}

/// Storage for in-progress carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Records a submission.
    ///
    /// Submissions for the same email are serialized. If the email has an
    /// open cart created after `window_start`, that cart is overwritten and
    /// its `last_active` refreshed; otherwise a new open cart is inserted.
    async fn upsert_open_cart(
        &self,
        snapshot: CartSnapshot,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CartUpsert>;

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// Open carts whose `last_active` is before `idle_before`, oldest first.
    async fn find_idle_open_carts(&self, idle_before: DateTime<Utc>) -> Result<Vec<Cart>>;

    /// Moves a cart from OPEN to ABANDONED.
    ///
    /// Returns true only for the call that performed the transition; a cart
    /// that is no longer open is left untouched.
    async fn mark_abandoned(&self, id: CartId) -> Result<bool>;

    /// Most recently active non-completed cart carrying `session_ref`.
    async fn find_cart_by_session(&self, session_ref: &SessionRef) -> Result<Option<Cart>>;

    /// Most recently active non-completed cart for `email` active since `since`.
    async fn find_recent_cart_by_email(
        &self,
        email: &Email,
        since: DateTime<Utc>,
    ) -> Result<Option<Cart>>;
}

/// Storage for finalized orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order_by_session(&self, session_ref: &SessionRef) -> Result<Option<Order>>;

    /// Persists an order and its side effects in one atomic step:
    ///
    /// - the applied voucher's `used_count` is incremented if the global
    ///   cap admits it, otherwise the order is stored without the voucher
    /// - live stock is drawn for every line
    /// - the originating cart, if any, becomes COMPLETED
    ///
    /// Fails with a [`crate::StoreError::Conflict`] on
    /// [`crate::ORDER_SESSION_CONSTRAINT`] if the session already has an
    /// order, in which case nothing is changed.
    async fn finalize_order(&self, order: Order) -> Result<Finalization>;
}

/// Storage for products, batches and volume tiers.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Products with their batches. `None` lists every product; otherwise
    /// only products whose external reference is in `refs`.
    async fn product_stock(&self, refs: Option<&[ProductRef]>) -> Result<Vec<ProductStock>>;

    /// Active volume tiers, ascending by `min_quantity`.
    async fn active_volume_tiers(&self) -> Result<Vec<VolumeTier>>;

    async fn insert_product(&self, product: Product) -> Result<()>;

    async fn insert_batch(&self, batch: Batch) -> Result<()>;

    async fn insert_volume_tier(&self, tier: VolumeTier, active: bool) -> Result<()>;
}

/// Storage for voucher records.
#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// Looks up a voucher by its normalized code.
    async fn find_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>>;

    /// Inserts or replaces a voucher definition.
    async fn save_voucher(&self, voucher: Voucher) -> Result<()>;
}

/// Everything the fulfillment services need from a single backing store.
pub trait CommerceStore: CartStore + OrderStore + InventoryStore + VoucherStore {}

impl<T: CartStore + OrderStore + InventoryStore + VoucherStore + ?Sized> CommerceStore for T {}
