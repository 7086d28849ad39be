use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::voucher::{apply, validate};
use domain::{LineItem, Money, ProductRef, Voucher, VoucherCode};
use std::hint::black_box;

fn cart(lines: usize) -> Vec<LineItem> {
    (0..lines)
        .map(|i| LineItem::new(format!("SKU-{i}"), (i % 7 + 1) as u32, Money::from_cents(250 + i as i64)))
        .collect()
}

fn constrained_voucher() -> Voucher {
    let mut voucher = Voucher::percent(VoucherCode::parse("bulk15").unwrap(), 15);
    voucher.min_spend = Some(Money::from_cents(1000));
    voucher.max_uses_per_cart = Some(40);
    voucher.max_global_uses = Some(1_000);
    voucher.used_count = 10;
    voucher.product_allowlist = Some((0..50).step_by(2).map(|i| ProductRef::new(format!("SKU-{i}"))).collect());
    voucher
}

fn bench_validate(c: &mut Criterion) {
    let voucher = constrained_voucher();
    let now = Utc::now();

    c.bench_function("voucher/validate", |b| {
        b.iter(|| validate(black_box(Some(&voucher)), black_box(now)));
    });
}

fn bench_apply(c: &mut Criterion) {
    let voucher = constrained_voucher();
    let mut group = c.benchmark_group("voucher/apply");

    for lines in [5, 50] {
        let items = cart(lines);
        group.bench_function(format!("{lines}_lines"), |b| {
            b.iter(|| apply(black_box(&voucher), black_box(&items)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_validate, bench_apply);
criterion_main!(benches);
