//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Commands produce events that update read models
//! - Racing agents on one order resolve to exactly one winner
//! - Read models rebuild from the store and stay tenant-scoped

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use serde_json::Value as JsonValue;
    use uuid::Uuid;

    use quickdrop_agents::profile::{ApproveAgent, RegisterAgent};
    use quickdrop_agents::wallet::OpenWallet;
    use quickdrop_agents::{
        AgentProfile, AgentProfileCommand, AgentWallet, ProfileId, TransactionKind, WalletCommand,
        WalletId,
    };
    use quickdrop_catalog::{ProductId, StoreId};
    use quickdrop_core::{AggregateId, AggregateRoot, Money, TenantId, UserId};
    use quickdrop_events::{EventEnvelope, InMemoryEventBus};
    use quickdrop_orders::order::{NewOrderItem, PlaceOrder, RequestCash};
    use quickdrop_orders::{Order, OrderCommand, OrderId, OrderStatus, PurchaseType};

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore};
    use crate::fulfillment::{FulfillmentCoordinator, FulfillmentError};
    use crate::projections::{
        OrderReadModel, OrdersProjection, Projection, TransactionRow, WalletReadModel,
        WalletsProjection, apply_all, rebuild_tenant,
    };
    use crate::read_model::InMemoryTenantStore;
    use crate::storage::InMemoryObjectStorage;
    use crate::workers::{ProjectionWorker, WorkerHandle};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Store = Arc<InMemoryEventStore>;
    type Orders = OrdersProjection<InMemoryTenantStore<OrderId, OrderReadModel>>;
    type Wallets = WalletsProjection<
        InMemoryTenantStore<UserId, WalletReadModel>,
        InMemoryTenantStore<Uuid, TransactionRow>,
    >;

    struct Harness {
        store: Store,
        coordinator: Arc<FulfillmentCoordinator<Store, Bus>>,
        orders: Arc<Orders>,
        wallets: Arc<Wallets>,
        worker: Option<WorkerHandle>,
    }

    impl Harness {
        fn new() -> Self {
            let store: Store = Arc::new(InMemoryEventStore::new());
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
            let storage = Arc::new(InMemoryObjectStorage::new("http://files.test"));

            let orders = Arc::new(OrdersProjection::new(InMemoryTenantStore::new()));
            let wallets = Arc::new(WalletsProjection::new(
                InMemoryTenantStore::new(),
                InMemoryTenantStore::new(),
            ));

            // Subscribe before any command runs so no event is missed.
            let (o, w) = (orders.clone(), wallets.clone());
            let worker = ProjectionWorker::spawn(
                "test-projections",
                bus,
                None,
                move |env: EventEnvelope<JsonValue>| {
                    let projections: [&dyn Projection; 2] = [o.as_ref(), w.as_ref()];
                    apply_all(&projections, &env)
                },
            )
            .unwrap();

            Self {
                store,
                coordinator: Arc::new(FulfillmentCoordinator::new(dispatcher, storage)),
                orders,
                wallets,
                worker: Some(worker),
            }
        }

        fn dispatcher(&self) -> &CommandDispatcher<Store, Bus> {
            self.coordinator.dispatcher()
        }

        fn approved_agent(&self, tenant_id: TenantId) -> UserId {
            let agent_id = UserId::new();
            let profile = ProfileId::for_agent(agent_id).0;
            for command in [
                AgentProfileCommand::Register(RegisterAgent {
                    tenant_id,
                    agent_id,
                    full_name: "Sam Courier".into(),
                    phone: "+15550111".into(),
                    vehicle: None,
                    occurred_at: Utc::now(),
                }),
                AgentProfileCommand::Approve(ApproveAgent {
                    tenant_id,
                    agent_id,
                    approved_by: UserId::new(),
                    occurred_at: Utc::now(),
                }),
            ] {
                self.dispatcher()
                    .dispatch(tenant_id, profile, AgentProfile::AGGREGATE_TYPE, command, |_, id| {
                        AgentProfile::empty(ProfileId(id))
                    })
                    .unwrap();
            }
            agent_id
        }

        fn open_wallet(&self, tenant_id: TenantId, agent_id: UserId, limit: u64) {
            self.dispatcher()
                .dispatch(
                    tenant_id,
                    WalletId::for_agent(agent_id).0,
                    AgentWallet::AGGREGATE_TYPE,
                    WalletCommand::Open(OpenWallet {
                        tenant_id,
                        agent_id,
                        limit: Money::from_minor(limit),
                        occurred_at: Utc::now(),
                    }),
                    |_, id| AgentWallet::empty(WalletId(id)),
                )
                .unwrap();
        }

        fn place_order(&self, tenant_id: TenantId) -> OrderId {
            let order_id = OrderId::new(AggregateId::new());
            self.order_command(
                tenant_id,
                order_id,
                OrderCommand::Place(PlaceOrder {
                    tenant_id,
                    order_id,
                    customer_id: UserId::new(),
                    store_id: StoreId::new(AggregateId::new()),
                    items: vec![NewOrderItem {
                        product_id: ProductId::new(AggregateId::new()),
                        name: "Bananas".into(),
                        unit_price: Money::from_minor(250),
                        quantity: 4,
                    }],
                    delivery_address: "22 Baker St".into(),
                    notes: None,
                    delivery_fee: Money::from_minor(500),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
            order_id
        }

        fn order_command(
            &self,
            tenant_id: TenantId,
            order_id: OrderId,
            command: OrderCommand,
        ) -> Result<(), DispatchError> {
            self.dispatcher()
                .dispatch(tenant_id, order_id.0, Order::AGGREGATE_TYPE, command, |_, id| {
                    Order::empty(OrderId::new(id))
                })
                .map(|_| ())
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            if let Some(worker) = self.worker.take() {
                worker.shutdown();
            }
        }
    }

    /// Projections are eventually consistent; poll until `cond` holds.
    fn eventually(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached within 2s");
    }

    #[test]
    fn placed_order_shows_up_as_an_open_job() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let order_id = h.place_order(tenant_id);

        eventually(|| h.orders.get(tenant_id, &order_id).is_some());
        let rm = h.orders.get(tenant_id, &order_id).unwrap();
        assert_eq!(rm.status, OrderStatus::Pending);
        assert_eq!(rm.total, Money::from_minor(1_500));
        assert_eq!(h.orders.open_jobs(tenant_id).len(), 1);
    }

    #[test]
    fn accepted_job_moves_to_the_agent() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let agent_id = h.approved_agent(tenant_id);
        let order_id = h.place_order(tenant_id);

        h.coordinator
            .accept_job(tenant_id, order_id, agent_id, PurchaseType::Apo)
            .unwrap();

        eventually(|| {
            h.orders
                .get(tenant_id, &order_id)
                .is_some_and(|o| o.status == OrderStatus::Assigned)
        });
        assert!(h.orders.open_jobs(tenant_id).is_empty());
        let mine = h.orders.for_agent(tenant_id, agent_id);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].purchase_type, Some(PurchaseType::Apo));
        assert_eq!(
            mine[0].history.iter().map(|c| c.status).collect::<Vec<_>>(),
            vec![OrderStatus::Pending, OrderStatus::Assigned]
        );
    }

    #[test]
    fn racing_agents_produce_exactly_one_winner() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let agents: Vec<UserId> = (0..8).map(|_| h.approved_agent(tenant_id)).collect();
        let order_id = h.place_order(tenant_id);

        let barrier = Arc::new(Barrier::new(agents.len()));
        let handles: Vec<_> = agents
            .iter()
            .map(|&agent_id| {
                let coordinator = h.coordinator.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    coordinator
                        .accept_job(tenant_id, order_id, agent_id, PurchaseType::Apo)
                        .map(|_| agent_id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|j| j.join().unwrap()).collect();
        let winners: Vec<UserId> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().copied())
            .collect();
        assert_eq!(winners.len(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err, FulfillmentError::Dispatch(DispatchError::Concurrency(_))),
                "unexpected error: {err:?}"
            );
        }

        let order = h
            .dispatcher()
            .load(tenant_id, order_id.0, |_, id| Order::empty(OrderId::new(id)))
            .unwrap();
        assert_eq!(order.agent_id(), Some(winners[0]));
    }

    #[test]
    fn cash_approval_updates_the_wallet_view() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let agent_id = h.approved_agent(tenant_id);
        h.open_wallet(tenant_id, agent_id, 5_000);
        let order_id = h.place_order(tenant_id);

        h.coordinator
            .accept_job(tenant_id, order_id, agent_id, PurchaseType::Cpo)
            .unwrap();
        h.order_command(
            tenant_id,
            order_id,
            OrderCommand::RequestCash(RequestCash {
                tenant_id,
                order_id,
                agent_id,
                amount: Money::from_minor(1_000),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        h.coordinator
            .approve_cash(tenant_id, order_id, UserId::new(), Money::from_minor(1_000))
            .unwrap();

        eventually(|| {
            h.wallets
                .get(tenant_id, &agent_id)
                .is_some_and(|w| w.transaction_count == 1)
        });
        let wallet = h.wallets.get(tenant_id, &agent_id).unwrap();
        assert_eq!(wallet.company_cash_balance, Money::from_minor(1_000));
        assert_eq!(h.wallets.outstanding_cash(tenant_id), Money::from_minor(1_000));

        let rows = h.wallets.transactions_for(tenant_id, agent_id);
        assert_eq!(rows[0].transaction.kind, TransactionKind::Advance);
        assert_eq!(rows[0].transaction.order_id, Some(order_id));

        eventually(|| {
            h.orders
                .get(tenant_id, &order_id)
                .is_some_and(|o| o.status == OrderStatus::CashApproved)
        });
    }

    #[test]
    fn rebuild_from_store_matches_live_projection() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let other_tenant = TenantId::new();
        let agent_id = h.approved_agent(tenant_id);
        let order_id = h.place_order(tenant_id);
        h.place_order(other_tenant);
        h.coordinator
            .accept_job(tenant_id, order_id, agent_id, PurchaseType::Apo)
            .unwrap();

        eventually(|| {
            h.orders
                .get(tenant_id, &order_id)
                .is_some_and(|o| o.status == OrderStatus::Assigned)
        });

        let fresh: Orders = OrdersProjection::new(InMemoryTenantStore::new());
        let history = h.store.load_all(tenant_id).unwrap();
        let applied = rebuild_tenant(&[&fresh], tenant_id, &history).unwrap();
        assert_eq!(applied, history.len());

        assert_eq!(fresh.get(tenant_id, &order_id), h.orders.get(tenant_id, &order_id));
        assert!(fresh.open_jobs(other_tenant).is_empty());
        assert_eq!(h.store.tenants().unwrap().len(), 2);
    }

    #[test]
    fn replaying_the_same_events_is_idempotent() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let order_id = h.place_order(tenant_id);
        eventually(|| h.orders.get(tenant_id, &order_id).is_some());

        for stored in h.store.load_stream(tenant_id, order_id.0).unwrap() {
            h.orders.apply_envelope(&stored.to_envelope()).unwrap();
        }
        let rm = h.orders.get(tenant_id, &order_id).unwrap();
        assert_eq!(rm.history.len(), 1);
    }

    #[test]
    fn agent_profile_wallet_and_user_keep_separate_streams() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let agent_id = h.approved_agent(tenant_id);
        h.open_wallet(tenant_id, agent_id, 5_000);

        let profile_stream = ProfileId::for_agent(agent_id).0;
        let wallet_stream = WalletId::for_agent(agent_id).0;
        assert_ne!(profile_stream, wallet_stream);
        assert_ne!(profile_stream, AggregateId::from(agent_id));

        let wallet = h
            .dispatcher()
            .load(tenant_id, wallet_stream, |_, id| AgentWallet::empty(WalletId(id)))
            .unwrap();
        assert!(wallet.exists());
        let profile = h
            .dispatcher()
            .load(tenant_id, profile_stream, |_, id| AgentProfile::empty(ProfileId(id)))
            .unwrap();
        assert_eq!(profile.version(), 2);
        assert!(h.store.load_stream(tenant_id, AggregateId::from(agent_id)).unwrap().is_empty());
    }

    #[test]
    fn dispatch_refuses_a_stream_written_by_another_aggregate_type() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let agent_id = h.approved_agent(tenant_id);

        let err = h
            .dispatcher()
            .dispatch(
                tenant_id,
                ProfileId::for_agent(agent_id).0,
                AgentWallet::AGGREGATE_TYPE,
                WalletCommand::Open(OpenWallet {
                    tenant_id,
                    agent_id,
                    limit: Money::from_minor(1_000),
                    occurred_at: Utc::now(),
                }),
                |_, id| AgentWallet::empty(WalletId(id)),
            )
            .unwrap_err();
        assert!(
            matches!(err, DispatchError::Store(EventStoreError::InvalidAppend(_))),
            "unexpected error: {err:?}"
        );
    }
}
