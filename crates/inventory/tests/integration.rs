//! Integration tests: availability as orders draw stock down.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::inventory::BatchStatus;
use domain::{AvailabilityTier, Batch, Email, LineItem, Money, Order, OrderDraft, Product, ProductRef, SessionRef};
use inventory::InventoryAggregator;
use store::{InMemoryStore, InventoryStore, OrderStore};

fn order(session: &str, sku: &str, quantity: u32) -> Order {
    Order::finalize(
        OrderDraft {
            session_ref: SessionRef::parse(session).unwrap(),
            email: Email::parse("buyer@example.com").unwrap(),
            items: vec![LineItem::new(sku, quantity, Money::from_cents(100))],
            shipping: None,
            cart_id: None,
        },
        None,
        Utc::now(),
    )
}

#[tokio::test]
async fn tiers_follow_stock_as_orders_complete() {
    let store = Arc::new(InMemoryStore::new());
    let product = Product::new("SKU-1", "Pallet wrap", Money::from_cents(100));
    let id = product.id;
    store.insert_product(product).await.unwrap();
    store
        .insert_batch(Batch::new(id, BatchStatus::Live, 15, Utc::now() - Duration::days(2)))
        .await
        .unwrap();
    store
        .insert_batch(Batch::new(id, BatchStatus::Live, 10, Utc::now() - Duration::days(1)))
        .await
        .unwrap();

    let aggregator = InventoryAggregator::new(Arc::clone(&store));
    let sku = ProductRef::new("SKU-1");

    let availability = aggregator.get_availability(None).await.unwrap();
    assert_eq!(availability[&sku].stock, 25);
    assert_eq!(availability[&sku].tier, AvailabilityTier::InStock);

    store.finalize_order(order("cs_1", "SKU-1", 20)).await.unwrap();
    let availability = aggregator.get_availability(None).await.unwrap();
    assert_eq!(availability[&sku].stock, 5);
    assert_eq!(availability[&sku].tier, AvailabilityTier::LowStock);

    let result = store.finalize_order(order("cs_2", "SKU-1", 8)).await.unwrap();
    assert_eq!(result.shortfalls[0].missing, 3);
    let availability = aggregator.get_availability(None).await.unwrap();
    assert_eq!(availability[&sku].stock, 0);
    assert_eq!(availability[&sku].tier, AvailabilityTier::OutOfStock);
}

#[tokio::test]
async fn empty_store_reports_nothing() {
    let aggregator = InventoryAggregator::new(Arc::new(InMemoryStore::new()));
    assert!(aggregator.get_availability(None).await.unwrap().is_empty());
    assert!(aggregator.get_volume_tiers().await.unwrap().is_empty());
}
