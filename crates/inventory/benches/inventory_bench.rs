use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::inventory::BatchStatus;
use domain::{Batch, Money, Product, ProductRef};
use inventory::InventoryAggregator;
use store::{InMemoryStore, InventoryStore};

/// Populate a store with N products, each with a mix of live and pending batches.
async fn populate_store(store: &InMemoryStore, n: usize) {
    for i in 0..n {
        let product = Product::new(format!("SKU-{i:05}"), "Bench item", Money::from_cents(1_000));
        let id = product.id;
        store.insert_product(product).await.unwrap();
        for (day, status) in [BatchStatus::Live, BatchStatus::Live, BatchStatus::Pending].into_iter().enumerate() {
            store
                .insert_batch(Batch::new(id, status, 10, Utc::now() - Duration::days(day as i64)))
                .await
                .unwrap();
        }
    }
}

fn bench_full_catalog(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    rt.block_on(populate_store(&store, 500));
    let aggregator = InventoryAggregator::new(store);

    c.bench_function("inventory/availability_500_products", |b| {
        b.iter(|| {
            rt.block_on(async {
                aggregator.get_availability(None).await.unwrap();
            });
        });
    });
}

fn bench_filtered(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    rt.block_on(populate_store(&store, 500));
    let aggregator = InventoryAggregator::new(store);
    let refs: Vec<_> = (0..10).map(|i| ProductRef::new(format!("SKU-{:05}", i * 37))).collect();

    c.bench_function("inventory/availability_10_of_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                aggregator.get_availability(Some(&refs)).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_full_catalog, bench_filtered);
criterion_main!(benches);
