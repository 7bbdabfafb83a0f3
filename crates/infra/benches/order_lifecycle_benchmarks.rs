use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use quickdrop_agents::wallet::{OpenWallet, RecordCollection};
use quickdrop_agents::{AgentWallet, WalletCommand, WalletId};
use quickdrop_catalog::{ProductId, StoreId};
use quickdrop_core::{AggregateId, Money, TenantId, UserId};
use quickdrop_events::{EventEnvelope, InMemoryEventBus};
use quickdrop_infra::command_dispatcher::CommandDispatcher;
use quickdrop_infra::event_store::{EventStore, InMemoryEventStore};
use quickdrop_infra::projections::{OrdersProjection, rebuild_tenant};
use quickdrop_infra::read_model::InMemoryTenantStore;
use quickdrop_orders::order::{
    AcceptJob, ConfirmDelivery, ConfirmPurchase, NewOrderItem, PlaceOrder, StartDelivery,
};
use quickdrop_orders::{Order, OrderCommand, OrderId, PurchaseType};
use std::sync::Arc;
use uuid::Uuid;

type Dispatcher =
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup() -> (Dispatcher, TenantId) {
    let bus = Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(InMemoryEventStore::new(), bus), TenantId::new())
}

fn order(dispatcher: &Dispatcher, tenant_id: TenantId, order_id: OrderId, command: OrderCommand) {
    dispatcher
        .dispatch(tenant_id, order_id.0, Order::AGGREGATE_TYPE, command, |_, id| {
            Order::empty(OrderId::new(id))
        })
        .unwrap();
}

fn place(dispatcher: &Dispatcher, tenant_id: TenantId) -> OrderId {
    let order_id = OrderId::new(AggregateId::new());
    let items = (0..3)
        .map(|i| NewOrderItem {
            product_id: ProductId::new(AggregateId::new()),
            name: format!("item {i}"),
            unit_price: Money::from_minor(199 + i),
            quantity: 2,
        })
        .collect();
    order(
        dispatcher,
        tenant_id,
        order_id,
        OrderCommand::Place(PlaceOrder {
            tenant_id,
            order_id,
            customer_id: UserId::new(),
            store_id: StoreId::new(AggregateId::new()),
            items,
            delivery_address: black_box("4 Dock Rd".to_string()),
            notes: None,
            delivery_fee: Money::from_minor(500),
            occurred_at: Utc::now(),
        }),
    );
    order_id
}

/// Place → accept → purchase → start → deliver, one stream per iteration.
fn bench_order_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_lifecycle");
    group.throughput(Throughput::Elements(5));

    group.bench_function("apo_place_to_delivered", |b| {
        let (dispatcher, tenant_id) = setup();
        let agent_id = UserId::new();

        b.iter(|| {
            let order_id = place(&dispatcher, tenant_id);
            let now = Utc::now();
            for command in [
                OrderCommand::AcceptJob(AcceptJob {
                    tenant_id,
                    order_id,
                    agent_id,
                    purchase_type: PurchaseType::Apo,
                    occurred_at: now,
                }),
                OrderCommand::ConfirmPurchase(ConfirmPurchase {
                    tenant_id,
                    order_id,
                    agent_id,
                    cost: Money::from_minor(1_000),
                    receipt_url: "http://files/receipts/r.png".into(),
                    occurred_at: now,
                }),
                OrderCommand::StartDelivery(StartDelivery {
                    tenant_id,
                    order_id,
                    agent_id,
                    occurred_at: now,
                }),
                OrderCommand::ConfirmDelivery(ConfirmDelivery {
                    tenant_id,
                    order_id,
                    agent_id,
                    occurred_at: now,
                }),
            ] {
                order(&dispatcher, tenant_id, order_id, command);
            }
        });
    });

    group.finish();
}

/// Dispatch latency against a wallet whose ledger keeps growing.
fn bench_wallet_rehydration(c: &mut Criterion) {
    let mut group = c.benchmark_group("wallet_rehydration");

    for history in [10usize, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("load_wallet", history),
            history,
            |b, &size| {
                let (dispatcher, tenant_id) = setup();
                let agent_id = UserId::new();
                let wallet_id = WalletId::for_agent(agent_id);
                let wallet = |command: WalletCommand| {
                    dispatcher
                        .dispatch(
                            tenant_id,
                            wallet_id.0,
                            AgentWallet::AGGREGATE_TYPE,
                            command,
                            |_, id| AgentWallet::empty(WalletId(id)),
                        )
                        .unwrap();
                };
                wallet(WalletCommand::Open(OpenWallet {
                    tenant_id,
                    agent_id,
                    limit: Money::from_minor(1_000_000),
                    occurred_at: Utc::now(),
                }));
                for _ in 0..size {
                    wallet(WalletCommand::RecordCollection(RecordCollection {
                        tenant_id,
                        transaction_id: Uuid::now_v7(),
                        order_id: OrderId::new(AggregateId::new()),
                        amount: Money::from_minor(1_500),
                        occurred_at: Utc::now(),
                    }));
                }

                b.iter(|| {
                    let loaded: AgentWallet = dispatcher
                        .load(tenant_id, wallet_id.0, |_, id| AgentWallet::empty(WalletId(id)))
                        .unwrap();
                    black_box(loaded.balance());
                });
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild");

    for orders in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*orders as u64));
        group.bench_with_input(
            BenchmarkId::new("orders_from_history", orders),
            orders,
            |b, &count| {
                let (dispatcher, tenant_id) = setup();
                for _ in 0..count {
                    place(&dispatcher, tenant_id);
                }
                let history = dispatcher.store().load_all(tenant_id).unwrap();

                b.iter(|| {
                    let projection = OrdersProjection::new(InMemoryTenantStore::new());
                    black_box(rebuild_tenant(&[&projection], tenant_id, &history).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_order_lifecycle,
    bench_wallet_rehydration,
    bench_projection_rebuild
);
criterion_main!(benches);
