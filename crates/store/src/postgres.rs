use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BatchId, CartId, OrderId, ProductId};
use domain::inventory::{BatchStatus, ProductCategory, allocate};
use domain::{
    AppliedVoucher, Batch, Cart, CartSnapshot, CartStatus, Email, FulfillmentStatus, LineItem, Money,
    Order, Product, ProductRef, SessionRef, ShippingSnapshot, VolumeTier, Voucher, VoucherCode,
    VoucherKind,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        CartStore, CartUpsert, Finalization, InventoryStore, OrderStore, ProductStock,
        StockShortfall, VoucherStore,
    },
};

const CART_COLUMNS: &str =
    "id, email, items, shipping, session_ref, voucher_code, status, last_active, created_at";

const ORDER_COLUMNS: &str = "id, payment_session_ref, email, cart_id, items, shipping, voucher, \
     status, subtotal_cents, discount_cents, total_cents, free_shipping, created_at";

const VOUCHER_COLUMNS: &str = "code, kind, discount_percent, discount_amount_cents, active, \
     min_spend_cents, product_allowlist, max_uses_per_cart, max_global_uses, used_count, \
     start_date, expiry_date, is_free_shipping";

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_u8(value: i16) -> u8 {
    u8::try_from(value).unwrap_or(0)
}

/// Maps a unique violation to [`StoreError::Conflict`] carrying the constraint name.
fn map_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict {
            constraint: db_err.constraint().unwrap_or_default().to_string(),
        };
    }
    StoreError::Database(e)
}

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let email: String = row.try_get("email")?;
        let session_ref: Option<String> = row.try_get("session_ref")?;
        let voucher_code: Option<String> = row.try_get("voucher_code")?;
        let status: String = row.try_get("status")?;

        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: Email::parse(&email)?,
            items: row.try_get::<Json<Vec<LineItem>>, _>("items")?.0,
            shipping: row
                .try_get::<Option<Json<ShippingSnapshot>>, _>("shipping")?
                .map(|json| json.0),
            session_ref: session_ref.as_deref().map(SessionRef::parse).transpose()?,
            voucher_code: voucher_code.as_deref().map(VoucherCode::parse).transpose()?,
            status: status.parse::<CartStatus>()?,
            last_active: row.try_get("last_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let session_ref: String = row.try_get("payment_session_ref")?;
        let email: String = row.try_get("email")?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            session_ref: SessionRef::parse(&session_ref)?,
            email: Email::parse(&email)?,
            cart_id: row.try_get::<Option<Uuid>, _>("cart_id")?.map(CartId::from_uuid),
            items: row.try_get::<Json<Vec<LineItem>>, _>("items")?.0,
            shipping: row
                .try_get::<Option<Json<ShippingSnapshot>>, _>("shipping")?
                .map(|json| json.0),
            voucher: row
                .try_get::<Option<Json<AppliedVoucher>>, _>("voucher")?
                .map(|json| json.0),
            status: status.parse::<FulfillmentStatus>()?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            discount: Money::from_cents(row.try_get("discount_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            free_shipping: row.try_get("free_shipping")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let category: String = row.try_get("category")?;
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            reference: ProductRef::new(row.try_get::<String, _>("reference")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            category: category.parse::<ProductCategory>()?,
        })
    }

    fn row_to_batch(row: &PgRow) -> Result<Batch> {
        let status: String = row.try_get("status")?;
        Ok(Batch {
            id: BatchId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            status: status.parse::<BatchStatus>()?,
            stock_quantity: to_u32(row.try_get("stock_quantity")?),
            received_at: row.try_get("received_at")?,
        })
    }

    fn row_to_voucher(row: PgRow) -> Result<Voucher> {
        let code: String = row.try_get("code")?;
        let kind: String = row.try_get("kind")?;
        let allowlist: Option<Vec<String>> = row.try_get("product_allowlist")?;

        Ok(Voucher {
            code: VoucherCode::parse(&code)?,
            kind: kind.parse::<VoucherKind>()?,
            discount_percent: row.try_get::<Option<i16>, _>("discount_percent")?.map(to_u8),
            discount_amount: row
                .try_get::<Option<i64>, _>("discount_amount_cents")?
                .map(Money::from_cents),
            active: row.try_get("active")?,
            min_spend: row.try_get::<Option<i64>, _>("min_spend_cents")?.map(Money::from_cents),
            product_allowlist: allowlist.map(|refs| refs.into_iter().map(ProductRef::new).collect()),
            max_uses_per_cart: row.try_get::<Option<i32>, _>("max_uses_per_cart")?.map(to_u32),
            max_global_uses: row.try_get::<Option<i32>, _>("max_global_uses")?.map(to_u32),
            used_count: to_u32(row.try_get("used_count")?),
            start_date: row.try_get("start_date")?,
            expiry_date: row.try_get("expiry_date")?,
            free_shipping: row.try_get("is_free_shipping")?,
        })
    }

    /// Draws live stock for every line, locking batches product by product
    /// in reference order.
    async fn draw_stock(conn: &mut PgConnection, order: &Order) -> Result<Vec<StockShortfall>> {
        let mut lines: Vec<&LineItem> = order.items.iter().collect();
        lines.sort_by(|a, b| a.product_ref.cmp(&b.product_ref));

        let mut shortfalls = Vec::new();
        for line in lines {
            let rows = sqlx::query(
                r#"
                SELECT b.id, b.product_id, b.status, b.stock_quantity, b.received_at
                FROM batches b
                JOIN products p ON p.id = b.product_id
                WHERE p.reference = $1 AND b.status = 'LIVE' AND b.stock_quantity > 0
                ORDER BY b.received_at ASC
                FOR UPDATE OF b
                "#,
            )
            .bind(line.product_ref.as_str())
            .fetch_all(&mut *conn)
            .await?;
            let batches = rows.iter().map(Self::row_to_batch).collect::<Result<Vec<_>>>()?;

            let allocation = allocate(&batches, line.quantity);
            let mut missing = allocation.shortfall;
            for draw in allocation.draws {
                let updated = sqlx::query(
                    r#"
                    UPDATE batches
                    SET stock_quantity = stock_quantity - $2,
                        status = CASE WHEN stock_quantity - $2 = 0 THEN 'DEPLETED' ELSE status END
                    WHERE id = $1 AND status = 'LIVE' AND stock_quantity >= $2
                    "#,
                )
                .bind(draw.batch_id.as_uuid())
                .bind(to_i32(draw.quantity))
                .execute(&mut *conn)
                .await?;
                if updated.rows_affected() == 0 {
                    missing += draw.quantity;
                }
            }

            if missing > 0 {
                shortfalls.push(StockShortfall {
                    product_ref: line.product_ref.clone(),
                    requested: line.quantity,
                    missing,
                });
            }
        }
        Ok(shortfalls)
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn upsert_open_cart(
        &self,
        snapshot: CartSnapshot,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CartUpsert> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent submissions for one email until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(snapshot.email().as_str())
            .execute(&mut *tx)
            .await?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM carts
            WHERE email = $1 AND status = 'OPEN' AND created_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(snapshot.email().as_str())
        .bind(window_start)
        .fetch_optional(&mut *tx)
        .await?;

        let items = Json(snapshot.items().to_vec());
        let shipping = snapshot.shipping().cloned().map(Json);
        let session_ref = snapshot.session_ref().map(|s| s.as_str().to_string());
        let voucher_code = snapshot.voucher_code().map(|c| c.as_str().to_string());

        let upsert = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE carts
                    SET items = $2, shipping = $3, session_ref = $4, voucher_code = $5, last_active = $6
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(items)
                .bind(shipping)
                .bind(session_ref)
                .bind(voucher_code)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                CartUpsert {
                    cart_id: CartId::from_uuid(id),
                    created: false,
                }
            }
            None => {
                let cart_id = CartId::new();
                sqlx::query(
                    r#"
                    INSERT INTO carts (id, email, items, shipping, session_ref, voucher_code, status, last_active, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, 'OPEN', $7, $7)
                    "#,
                )
                .bind(cart_id.as_uuid())
                .bind(snapshot.email().as_str())
                .bind(items)
                .bind(shipping)
                .bind(session_ref)
                .bind(voucher_code)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                CartUpsert {
                    cart_id,
                    created: true,
                }
            }
        };

        tx.commit().await?;
        Ok(upsert)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_cart).transpose()
    }

    async fn find_idle_open_carts(&self, idle_before: DateTime<Utc>) -> Result<Vec<Cart>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE status = 'OPEN' AND last_active < $1 ORDER BY last_active ASC"
        ))
        .bind(idle_before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_cart).collect()
    }

    async fn mark_abandoned(&self, id: CartId) -> Result<bool> {
        let result = sqlx::query("UPDATE carts SET status = 'ABANDONED' WHERE id = $1 AND status = 'OPEN'")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_cart_by_session(&self, session_ref: &SessionRef) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE session_ref = $1 AND status <> 'COMPLETED' \
             ORDER BY last_active DESC LIMIT 1"
        ))
        .bind(session_ref.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_cart).transpose()
    }

    async fn find_recent_cart_by_email(
        &self,
        email: &Email,
        since: DateTime<Utc>,
    ) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE email = $1 AND status <> 'COMPLETED' \
             AND last_active >= $2 ORDER BY last_active DESC LIMIT 1"
        ))
        .bind(email.as_str())
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_cart).transpose()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn find_order_by_session(&self, session_ref: &SessionRef) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_session_ref = $1"
        ))
        .bind(session_ref.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn finalize_order(&self, order: Order) -> Result<Finalization> {
        let mut tx = self.pool.begin().await?;

        let mut order = order;
        let mut voucher_lost = false;
        if let Some(applied) = &order.voucher {
            let redeemed = sqlx::query(
                r#"
                UPDATE vouchers
                SET used_count = used_count + 1
                WHERE code = $1 AND active
                  AND (max_global_uses IS NULL OR used_count < max_global_uses)
                "#,
            )
            .bind(applied.code.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;
            if !redeemed {
                tracing::debug!(voucher = %applied.code, "voucher cap exhausted inside finalization");
                order = order.without_voucher();
                voucher_lost = true;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, payment_session_ref, email, cart_id, items, shipping, voucher,
                                status, subtotal_cents, discount_cents, total_cents, free_shipping, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.session_ref.as_str())
        .bind(order.email.as_str())
        .bind(order.cart_id.map(|id| id.as_uuid()))
        .bind(Json(&order.items))
        .bind(order.shipping.as_ref().map(Json))
        .bind(order.voucher.as_ref().map(Json))
        .bind(order.status.as_str())
        .bind(order.subtotal.cents())
        .bind(order.discount.cents())
        .bind(order.total.cents())
        .bind(order.free_shipping)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        let shortfalls = Self::draw_stock(&mut tx, &order).await?;

        if let Some(cart_id) = order.cart_id {
            sqlx::query(
                "UPDATE carts SET status = 'COMPLETED', last_active = $2 WHERE id = $1 AND status <> 'COMPLETED'",
            )
            .bind(cart_id.as_uuid())
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Finalization {
            order,
            voucher_lost,
            shortfalls,
        })
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn product_stock(&self, refs: Option<&[ProductRef]>) -> Result<Vec<ProductStock>> {
        let refs: Option<Vec<String>> = refs.map(|refs| refs.iter().map(|r| r.as_str().to_string()).collect());
        let product_rows = sqlx::query(
            r#"
            SELECT id, reference, name, price_cents, category
            FROM products
            WHERE $1::text[] IS NULL OR reference = ANY($1)
            ORDER BY reference ASC
            "#,
        )
        .bind(refs)
        .fetch_all(&self.pool)
        .await?;
        let products = product_rows.iter().map(Self::row_to_product).collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id.as_uuid()).collect();
        let batch_rows = sqlx::query(
            r#"
            SELECT id, product_id, status, stock_quantity, received_at
            FROM batches
            WHERE product_id = ANY($1)
            ORDER BY received_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<ProductId, Vec<Batch>> = HashMap::new();
        for row in &batch_rows {
            let batch = Self::row_to_batch(row)?;
            by_product.entry(batch.product_id).or_default().push(batch);
        }

        Ok(products
            .into_iter()
            .map(|product| ProductStock {
                batches: by_product.remove(&product.id).unwrap_or_default(),
                product,
            })
            .collect())
    }

    async fn active_volume_tiers(&self) -> Result<Vec<VolumeTier>> {
        let rows = sqlx::query(
            "SELECT min_quantity, discount_percent FROM volume_tiers WHERE active ORDER BY min_quantity ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(VolumeTier {
                    min_quantity: to_u32(row.try_get("min_quantity")?),
                    discount_percent: to_u8(row.try_get("discount_percent")?),
                })
            })
            .collect()
    }

    async fn insert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, reference, name, price_cents, category) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(product.id.as_uuid())
        .bind(product.reference.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.category.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(())
    }

    async fn insert_batch(&self, batch: Batch) -> Result<()> {
        sqlx::query(
            "INSERT INTO batches (id, product_id, status, stock_quantity, received_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(batch.id.as_uuid())
        .bind(batch.product_id.as_uuid())
        .bind(batch.status.as_str())
        .bind(to_i32(batch.stock_quantity))
        .bind(batch.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_volume_tier(&self, tier: VolumeTier, active: bool) -> Result<()> {
        sqlx::query("INSERT INTO volume_tiers (min_quantity, discount_percent, active) VALUES ($1, $2, $3)")
            .bind(to_i32(tier.min_quantity))
            .bind(i16::from(tier.discount_percent))
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VoucherStore for PostgresStore {
    async fn find_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>> {
        let row = sqlx::query(&format!("SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE code = $1"))
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_voucher).transpose()
    }

    async fn save_voucher(&self, voucher: Voucher) -> Result<()> {
        let allowlist: Option<Vec<String>> = voucher
            .product_allowlist
            .as_ref()
            .map(|refs| refs.iter().map(|r| r.as_str().to_string()).collect());

        sqlx::query(&format!(
            r#"
            INSERT INTO vouchers ({VOUCHER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (code) DO UPDATE SET
                kind = EXCLUDED.kind,
                discount_percent = EXCLUDED.discount_percent,
                discount_amount_cents = EXCLUDED.discount_amount_cents,
                active = EXCLUDED.active,
                min_spend_cents = EXCLUDED.min_spend_cents,
                product_allowlist = EXCLUDED.product_allowlist,
                max_uses_per_cart = EXCLUDED.max_uses_per_cart,
                max_global_uses = EXCLUDED.max_global_uses,
                used_count = GREATEST(vouchers.used_count, EXCLUDED.used_count),
                start_date = EXCLUDED.start_date,
                expiry_date = EXCLUDED.expiry_date,
                is_free_shipping = EXCLUDED.is_free_shipping
            "#
        ))
        .bind(voucher.code.as_str())
        .bind(voucher.kind.as_str())
        .bind(voucher.discount_percent.map(i16::from))
        .bind(voucher.discount_amount.map(|m| m.cents()))
        .bind(voucher.active)
        .bind(voucher.min_spend.map(|m| m.cents()))
        .bind(allowlist)
        .bind(voucher.max_uses_per_cart.map(to_i32))
        .bind(voucher.max_global_uses.map(to_i32))
        .bind(to_i32(voucher.used_count))
        .bind(voucher.start_date)
        .bind(voucher.expiry_date)
        .bind(voucher.free_shipping)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
