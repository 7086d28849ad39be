//! Live inventory aggregator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use domain::{Availability, ProductRef, VolumeTier};
use store::InventoryStore;

use crate::Result;

/// Availability keyed by external product reference.
pub type AvailabilityMap = BTreeMap<ProductRef, Availability>;

/// Computes availability from the store on every call. Nothing is cached,
/// so a batch going live is visible to the next query.
pub struct InventoryAggregator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for InventoryAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: InventoryStore + ?Sized> InventoryAggregator<S> {
    /// Creates a new aggregator over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns price, live stock and tier per product.
    ///
    /// With `refs`, only those external references are reported; unknown
    /// references are simply absent from the map. A product with no live
    /// batches reports zero stock.
    #[tracing::instrument(skip(self), fields(filtered = refs.is_some()))]
    pub async fn get_availability(&self, refs: Option<&[ProductRef]>) -> Result<AvailabilityMap> {
        let start = Instant::now();
        let products = self.store.product_stock(refs).await?;

        let availability: AvailabilityMap = products
            .into_iter()
            .map(|entry| {
                let availability = Availability::of(&entry.product, &entry.batches);
                (entry.product.reference, availability)
            })
            .collect();

        metrics::histogram!("availability_query_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::debug!(products = availability.len(), "availability computed");
        Ok(availability)
    }

    /// Returns the active volume tiers, ascending by minimum quantity.
    #[tracing::instrument(skip(self))]
    pub async fn get_volume_tiers(&self) -> Result<Vec<VolumeTier>> {
        let mut tiers = self.store.active_volume_tiers().await?;
        tiers.sort_by_key(|t| t.min_quantity);
        Ok(tiers)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use domain::inventory::BatchStatus;
    use domain::{AvailabilityTier, Batch, Money, Product};
    use store::InMemoryStore;

    use super::*;

    async fn seed(store: &InMemoryStore, product: Product, batches: &[(BatchStatus, u32)]) {
        let id = product.id;
        store.insert_product(product).await.unwrap();
        for (i, (status, qty)) in batches.iter().enumerate() {
            let received = Utc::now() - Duration::days(i as i64);
            store.insert_batch(Batch::new(id, *status, *qty, received)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn sums_live_batches_only() {
        let store = Arc::new(InMemoryStore::new());
        seed(
            &store,
            Product::new("SKU-1", "Crate", Money::from_cents(1_250)),
            &[(BatchStatus::Live, 5), (BatchStatus::Live, 15), (BatchStatus::Pending, 100)],
        )
        .await;

        let aggregator = InventoryAggregator::new(store);
        let availability = aggregator.get_availability(None).await.unwrap();
        let sku = &availability[&ProductRef::new("SKU-1")];
        assert_eq!(sku.stock, 20);
        assert_eq!(sku.tier, AvailabilityTier::LowStock);
        assert_eq!(sku.price.cents(), 1_250);
    }

    #[tokio::test]
    async fn product_without_batches_is_out_of_stock() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, Product::new("SKU-0", "Empty", Money::from_cents(100)), &[]).await;

        let availability = InventoryAggregator::new(store).get_availability(None).await.unwrap();
        let sku = &availability[&ProductRef::new("SKU-0")];
        assert_eq!(sku.stock, 0);
        assert_eq!(sku.tier, AvailabilityTier::OutOfStock);
    }

    #[tokio::test]
    async fn prototype_is_coming_soon_regardless_of_stock() {
        let store = Arc::new(InMemoryStore::new());
        seed(
            &store,
            Product::new("PROTO-1", "Next gen", Money::from_cents(9_900)).prototype(),
            &[(BatchStatus::Live, 500)],
        )
        .await;

        let availability = InventoryAggregator::new(store).get_availability(None).await.unwrap();
        assert_eq!(availability[&ProductRef::new("PROTO-1")].tier, AvailabilityTier::ComingSoon);
    }

    #[tokio::test]
    async fn filter_matches_external_reference() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, Product::new("SKU-A", "A", Money::from_cents(100)), &[(BatchStatus::Live, 50)]).await;
        seed(&store, Product::new("SKU-B", "B", Money::from_cents(200)), &[(BatchStatus::Live, 1)]).await;

        let aggregator = InventoryAggregator::new(store);
        let refs = [ProductRef::new("SKU-B"), ProductRef::new("SKU-MISSING")];
        let availability = aggregator.get_availability(Some(&refs)).await.unwrap();

        assert_eq!(availability.len(), 1);
        assert_eq!(availability[&ProductRef::new("SKU-B")].tier, AvailabilityTier::LowStock);
    }

    #[tokio::test]
    async fn reflects_new_batches_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let product = Product::new("SKU-1", "Crate", Money::from_cents(100));
        let id = product.id;
        seed(&store, product, &[]).await;

        let aggregator = InventoryAggregator::new(Arc::clone(&store));
        let before = aggregator.get_availability(None).await.unwrap();
        assert_eq!(before[&ProductRef::new("SKU-1")].tier, AvailabilityTier::OutOfStock);

        store.insert_batch(Batch::new(id, BatchStatus::Live, 40, Utc::now())).await.unwrap();
        let after = aggregator.get_availability(None).await.unwrap();
        assert_eq!(after[&ProductRef::new("SKU-1")].tier, AvailabilityTier::InStock);
    }

    #[tokio::test]
    async fn volume_tiers_are_ascending() {
        let store = Arc::new(InMemoryStore::new());
        for (min_quantity, discount_percent) in [(100, 15), (10, 5), (50, 10)] {
            store
                .insert_volume_tier(VolumeTier { min_quantity, discount_percent }, true)
                .await
                .unwrap();
        }

        let tiers = InventoryAggregator::new(store).get_volume_tiers().await.unwrap();
        let mins: Vec<_> = tiers.iter().map(|t| t.min_quantity).collect();
        assert_eq!(mins, vec![10, 50, 100]);
    }
}
