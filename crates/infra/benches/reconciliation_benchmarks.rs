use std::str::FromStr;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rust_decimal::Decimal;

use restock_core::AggregateId;
use restock_infra::{
    InMemoryProductLedger, InMemoryPurchaseOrderStore, NewPurchaseItem, NewPurchaseOrder,
    NoopNotifier, ProductLedger, PurchasingService,
};
use restock_inventory::{new_avg_price, Product, ProductId};
use restock_purchasing::PurchaseOrderStatus;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn bench_cost_averaging(c: &mut Criterion) {
    let old_avg = dec("5.25");
    let incoming_price = dec("7.10");

    c.bench_function("costing/new_avg_price", |b| {
        b.iter(|| {
            new_avg_price(
                black_box(10_000),
                black_box(old_avg),
                black_box(350),
                black_box(incoming_price),
            )
            .unwrap()
        })
    });
}

fn bench_ledger_ops(c: &mut Criterion) {
    let ledger = InMemoryProductLedger::new();
    let product_id = ProductId::new(AggregateId::new());
    ledger.insert(Product::new(product_id)).unwrap();

    let mut group = c.benchmark_group("ledger");
    group.throughput(Throughput::Elements(1));
    group.bench_function("apply_transit_delta", |b| {
        b.iter(|| ledger.apply_transit_delta(black_box(product_id), 1).unwrap())
    });
    group.bench_function("receive", |b| {
        b.iter(|| ledger.receive(black_box(product_id), 1, dec("4.20")).unwrap())
    });
    group.finish();
}

fn bench_order_lifecycle(c: &mut Criterion) {
    let ledger = Arc::new(InMemoryProductLedger::new());
    let product_id = ProductId::new(AggregateId::new());
    ledger.insert(Product::new(product_id)).unwrap();
    let service = PurchasingService::new(
        Arc::clone(&ledger),
        Arc::new(InMemoryPurchaseOrderStore::new()),
        NoopNotifier,
    );

    c.bench_function("lifecycle/create_submit_receive", |b| {
        b.iter(|| {
            let order = service
                .create_purchase_order(NewPurchaseOrder {
                    items: vec![NewPurchaseItem {
                        product_id,
                        quantity: 10,
                        cost_price: dec("100.00"),
                    }],
                    supplier: serde_json::Value::Null,
                    is_urgent: false,
                    expenses: None,
                    submit: true,
                })
                .unwrap();
            service
                .transition_purchase_order(order.id(), PurchaseOrderStatus::Received)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_cost_averaging,
    bench_ledger_ops,
    bench_order_lifecycle
);
criterion_main!(benches);
