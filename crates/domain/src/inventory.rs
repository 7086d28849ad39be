//! Products, inbound batches and availability tiers.

use chrono::{DateTime, Utc};
use common::{BatchId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{Money, ProductRef};

/// Stock at or below this level (and above zero) is reported as low.
pub const LOW_STOCK_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    #[default]
    Standard,
    /// Announced but not yet sellable.
    Prototype,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Standard => "STANDARD",
            ProductCategory::Prototype => "PROTOTYPE",
        }
    }
}

impl std::str::FromStr for ProductCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(ProductCategory::Standard),
            "PROTOTYPE" => Ok(ProductCategory::Prototype),
            other => Err(DomainError::UnknownStatus {
                kind: "product category",
                value: other.to_string(),
            }),
        }
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub reference: ProductRef,
    pub name: String,
    pub price: Money,
    pub category: ProductCategory,
}

impl Product {
    pub fn new(reference: impl Into<ProductRef>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: ProductId::new(),
            reference: reference.into(),
            name: name.into(),
            price,
            category: ProductCategory::Standard,
        }
    }

    pub fn prototype(mut self) -> Self {
        self.category = ProductCategory::Prototype;
        self
    }
}

/// Lifecycle of an inbound batch. Only `Live` stock is sellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    #[default]
    Live,
    Pending,
    Depleted,
    Archived,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Live => "LIVE",
            BatchStatus::Pending => "PENDING",
            BatchStatus::Depleted => "DEPLETED",
            BatchStatus::Archived => "ARCHIVED",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIVE" => Ok(BatchStatus::Live),
            "PENDING" => Ok(BatchStatus::Pending),
            "DEPLETED" => Ok(BatchStatus::Depleted),
            "ARCHIVED" => Ok(BatchStatus::Archived),
            other => Err(DomainError::UnknownStatus {
                kind: "batch",
                value: other.to_string(),
            }),
        }
    }
}

/// An inbound delivery of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub product_id: ProductId,
    pub status: BatchStatus,
    pub stock_quantity: u32,
    pub received_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(product_id: ProductId, status: BatchStatus, stock_quantity: u32, received_at: DateTime<Utc>) -> Self {
        Self {
            id: BatchId::new(),
            product_id,
            status,
            stock_quantity,
            received_at,
        }
    }

    /// Takes `quantity` units, marking the batch depleted when it empties.
    pub fn draw(&mut self, quantity: u32) {
        self.stock_quantity = self.stock_quantity.saturating_sub(quantity);
        if self.stock_quantity == 0 {
            self.status = BatchStatus::Depleted;
        }
    }
}

/// Sellable stock: the sum over live batches.
pub fn live_stock<'a>(batches: impl IntoIterator<Item = &'a Batch>) -> u32 {
    batches
        .into_iter()
        .filter(|b| b.status == BatchStatus::Live)
        .fold(0u32, |acc, b| acc.saturating_add(b.stock_quantity))
}

/// Units to take from one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDraw {
    pub batch_id: BatchId,
    pub quantity: u32,
}

/// Plan for removing a quantity from a product's live batches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    pub draws: Vec<BatchDraw>,
    /// Units that no live batch could cover.
    pub shortfall: u32,
}

/// Plans a decrement of `quantity` units, draining live batches oldest first.
pub fn allocate(batches: &[Batch], quantity: u32) -> Allocation {
    let mut live: Vec<&Batch> = batches
        .iter()
        .filter(|b| b.status == BatchStatus::Live && b.stock_quantity > 0)
        .collect();
    live.sort_by_key(|b| b.received_at);

    let mut remaining = quantity;
    let mut draws = Vec::new();
    for batch in live {
        if remaining == 0 {
            break;
        }
        let take = batch.stock_quantity.min(remaining);
        draws.push(BatchDraw {
            batch_id: batch.id,
            quantity: take,
        });
        remaining -= take;
    }

    Allocation {
        draws,
        shortfall: remaining,
    }
}

/// Customer-facing stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityTier {
    InStock,
    LowStock,
    OutOfStock,
    ComingSoon,
}

impl AvailabilityTier {
    /// Classifies a product's live stock. Prototypes are always coming soon.
    pub fn classify(category: ProductCategory, stock: u32) -> Self {
        match (category, stock) {
            (ProductCategory::Prototype, _) => AvailabilityTier::ComingSoon,
            (_, 0) => AvailabilityTier::OutOfStock,
            (_, s) if s <= LOW_STOCK_THRESHOLD => AvailabilityTier::LowStock,
            _ => AvailabilityTier::InStock,
        }
    }
}

/// Price, live stock and tier for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub price: Money,
    pub stock: u32,
    pub tier: AvailabilityTier,
}

impl Availability {
    pub fn of(product: &Product, batches: &[Batch]) -> Self {
        let stock = live_stock(batches);
        Self {
            price: product.price,
            stock,
            tier: AvailabilityTier::classify(product.category, stock),
        }
    }
}

/// Bulk discount step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTier {
    pub min_quantity: u32,
    pub discount_percent: u8,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn batches(product: &Product, spec: &[(BatchStatus, u32)]) -> Vec<Batch> {
        let start = Utc::now() - Duration::days(10);
        spec.iter()
            .enumerate()
            .map(|(i, (status, qty))| Batch::new(product.id, *status, *qty, start + Duration::days(i as i64)))
            .collect()
    }

    #[test]
    fn test_only_live_batches_count() {
        let product = Product::new("SKU-1", "Widget", Money::from_cents(1000));
        let batches = batches(
            &product,
            &[(BatchStatus::Live, 5), (BatchStatus::Live, 15), (BatchStatus::Pending, 100)],
        );
        let availability = Availability::of(&product, &batches);
        assert_eq!(availability.stock, 20);
        assert_eq!(availability.tier, AvailabilityTier::LowStock);
        assert_eq!(availability.price.cents(), 1000);
    }

    #[test]
    fn test_no_live_batches_is_out_of_stock() {
        let product = Product::new("SKU-1", "Widget", Money::from_cents(1000));
        assert_eq!(Availability::of(&product, &[]).tier, AvailabilityTier::OutOfStock);

        let batches = batches(&product, &[(BatchStatus::Depleted, 0), (BatchStatus::Pending, 40)]);
        let availability = Availability::of(&product, &batches);
        assert_eq!(availability.stock, 0);
        assert_eq!(availability.tier, AvailabilityTier::OutOfStock);
    }

    #[test]
    fn test_tier_boundaries() {
        use AvailabilityTier::*;
        let standard = ProductCategory::Standard;
        assert_eq!(AvailabilityTier::classify(standard, 0), OutOfStock);
        assert_eq!(AvailabilityTier::classify(standard, 1), LowStock);
        assert_eq!(AvailabilityTier::classify(standard, 20), LowStock);
        assert_eq!(AvailabilityTier::classify(standard, 21), InStock);
        assert_eq!(AvailabilityTier::classify(ProductCategory::Prototype, 500), ComingSoon);
        assert_eq!(AvailabilityTier::classify(ProductCategory::Prototype, 0), ComingSoon);
    }

    #[test]
    fn test_allocate_drains_oldest_first() {
        let product = Product::new("SKU-1", "Widget", Money::from_cents(1000));
        let batches = batches(
            &product,
            &[(BatchStatus::Live, 5), (BatchStatus::Pending, 50), (BatchStatus::Live, 15)],
        );
        let allocation = allocate(&batches, 8);
        assert_eq!(allocation.shortfall, 0);
        assert_eq!(
            allocation.draws,
            vec![
                BatchDraw { batch_id: batches[0].id, quantity: 5 },
                BatchDraw { batch_id: batches[2].id, quantity: 3 },
            ]
        );
    }

    #[test]
    fn test_allocate_reports_shortfall() {
        let product = Product::new("SKU-1", "Widget", Money::from_cents(1000));
        let batches = batches(&product, &[(BatchStatus::Live, 2)]);
        let allocation = allocate(&batches, 5);
        assert_eq!(allocation.shortfall, 3);
        assert_eq!(allocation.draws.len(), 1);
    }

    #[test]
    fn test_draw_depletes_batch() {
        let mut batch = Batch::new(ProductId::new(), BatchStatus::Live, 3, Utc::now());
        batch.draw(2);
        assert_eq!(batch.status, BatchStatus::Live);
        batch.draw(1);
        assert_eq!(batch.stock_quantity, 0);
        assert_eq!(batch.status, BatchStatus::Depleted);
    }
}
