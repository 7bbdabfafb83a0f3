use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::{info, warn};
use uuid::Uuid;

use quickdrop_agents::{
    AgentProfile, AgentProfileCommand, AgentWallet, ProfileId, WalletCommand, WalletId,
};
use quickdrop_auth::{User, UserCommand};
use quickdrop_catalog::{
    Category, CategoryCommand, CategoryId, Product, ProductCommand, ProductId, Store, StoreCommand,
    StoreId,
};
use quickdrop_core::{AggregateId, Money, TenantId, UserId};
use quickdrop_events::{EventEnvelope, InMemoryEventBus};
use quickdrop_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, InMemoryEventStore, StoredEvent},
    fulfillment::FulfillmentCoordinator,
    projections::{
        AgentReadModel, AgentsProjection, CategoriesProjection, CategoryReadModel, OrderReadModel,
        OrdersProjection, ProductReadModel, ProductsProjection, Projection, StoreReadModel,
        StoresProjection, TransactionRow, UserReadModel, UsersProjection, WalletReadModel,
        WalletsProjection, apply_all, rebuild_tenant,
    },
    read_model::InMemoryTenantStore,
    storage::{InMemoryObjectStorage, LocalFsObjectStorage, ObjectStorage},
    workers::{ProjectionWorker, WorkerHandle},
};
use quickdrop_orders::{Order, OrderCommand, OrderId};

use crate::config::ApiConfig;

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;
pub type Coordinator = FulfillmentCoordinator<SharedStore, SharedBus>;

type Rm<K, V> = Arc<InMemoryTenantStore<K, V>>;
pub type StoresView = StoresProjection<Rm<StoreId, StoreReadModel>>;
pub type CategoriesView = CategoriesProjection<Rm<CategoryId, CategoryReadModel>>;
pub type ProductsView = ProductsProjection<Rm<ProductId, ProductReadModel>>;
pub type OrdersView = OrdersProjection<Rm<OrderId, OrderReadModel>>;
pub type AgentsView = AgentsProjection<Rm<UserId, AgentReadModel>>;
pub type WalletsView = WalletsProjection<Rm<UserId, WalletReadModel>, Rm<Uuid, TransactionRow>>;
pub type UsersView = UsersProjection<Rm<UserId, UserReadModel>>;

/// Realtime message broadcast over SSE. `topic` is the read-model table
/// that changed (`orders`, `products`, `wallets`, ...).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: &'static str,
    pub payload: JsonValue,
}

/// Marketplace knobs handlers need at request time.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub delivery_fee: Money,
    pub default_wallet_limit: Money,
}

pub struct AppServices {
    pub coordinator: Coordinator,
    pub storage: Arc<dyn ObjectStorage>,
    pub settings: Settings,
    pub stores: Arc<StoresView>,
    pub categories: Arc<CategoriesView>,
    pub products: Arc<ProductsView>,
    pub orders: Arc<OrdersView>,
    pub agents: Arc<AgentsView>,
    pub wallets: Arc<WalletsView>,
    pub users: Arc<UsersView>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    _projection_worker: WorkerHandle,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Read-model table fed by an aggregate type.
fn topic_for(aggregate_type: &str) -> Option<&'static str> {
    match aggregate_type {
        Store::AGGREGATE_TYPE => Some("stores"),
        Category::AGGREGATE_TYPE => Some("categories"),
        Product::AGGREGATE_TYPE => Some("products"),
        Order::AGGREGATE_TYPE => Some("orders"),
        AgentProfile::AGGREGATE_TYPE => Some("agents"),
        AgentWallet::AGGREGATE_TYPE => Some("wallets"),
        User::AGGREGATE_TYPE => Some("users"),
        _ => None,
    }
}

pub const TOPICS: [&str; 7] = [
    "stores",
    "categories",
    "products",
    "orders",
    "agents",
    "wallets",
    "users",
];

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let (store, history) = open_event_store(config).await?;
    let bus: SharedBus = Arc::new(InMemoryEventBus::new());

    let storage: Arc<dyn ObjectStorage> = match &config.storage_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "storing uploads on local disk");
            Arc::new(LocalFsObjectStorage::new(
                dir.clone(),
                config.storage_public_url.clone(),
            ))
        }
        None => Arc::new(InMemoryObjectStorage::new(config.storage_public_url.clone())),
    };

    let stores: Arc<StoresView> = Arc::new(StoresProjection::new(Arc::default()));
    let categories: Arc<CategoriesView> = Arc::new(CategoriesProjection::new(Arc::default()));
    let products: Arc<ProductsView> = Arc::new(ProductsProjection::new(Arc::default()));
    let orders: Arc<OrdersView> = Arc::new(OrdersProjection::new(Arc::default()));
    let agents: Arc<AgentsView> = Arc::new(AgentsProjection::new(Arc::default()));
    let wallets: Arc<WalletsView> =
        Arc::new(WalletsProjection::new(Arc::default(), Arc::default()));
    let users: Arc<UsersView> = Arc::new(UsersProjection::new(Arc::default()));

    {
        let views: [&dyn Projection; 7] = [
            &*stores,
            &*categories,
            &*products,
            &*orders,
            &*agents,
            &*wallets,
            &*users,
        ];
        for (tenant_id, events) in &history {
            let applied = rebuild_tenant(&views, *tenant_id, events)?;
            info!(tenant_id = %tenant_id, events = applied, "projections rebuilt");
        }
    }

    // Realtime channel (SSE): lossy broadcast, tenant-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    let worker = {
        let stores = stores.clone();
        let categories = categories.clone();
        let products = products.clone();
        let orders = orders.clone();
        let agents = agents.clone();
        let wallets = wallets.clone();
        let users = users.clone();
        let realtime_tx = realtime_tx.clone();

        ProjectionWorker::spawn(
            "quickdrop.projections",
            bus.clone(),
            None,
            move |env: EventEnvelope<JsonValue>| {
                let views: [&dyn Projection; 7] = [
                    &*stores,
                    &*categories,
                    &*products,
                    &*orders,
                    &*agents,
                    &*wallets,
                    &*users,
                ];
                apply_all(&views, &env)?;

                if let Some(topic) = topic_for(env.aggregate_type()) {
                    // No subscribers is not an error.
                    let _ = realtime_tx.send(RealtimeMessage {
                        tenant_id: env.tenant_id(),
                        topic,
                        payload: serde_json::json!({
                            "table": topic,
                            "event_type": env.event_type(),
                            "aggregate_id": env.aggregate_id().to_string(),
                            "sequence_number": env.sequence_number(),
                        }),
                    });
                }
                Ok::<(), quickdrop_infra::projections::ProjectionError>(())
            },
        )?
    };

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
    let coordinator = FulfillmentCoordinator::new(dispatcher, storage.clone());

    Ok(AppServices {
        coordinator,
        storage,
        settings: Settings {
            delivery_fee: config.delivery_fee,
            default_wallet_limit: config.default_wallet_limit,
        },
        stores,
        categories,
        products,
        orders,
        agents,
        wallets,
        users,
        realtime_tx,
        _projection_worker: worker,
    })
}

type History = Vec<(TenantId, Vec<StoredEvent>)>;

async fn open_event_store(config: &ApiConfig) -> anyhow::Result<(SharedStore, History)> {
    if config.use_persistent_stores {
        #[cfg(feature = "postgres")]
        {
            use anyhow::Context;
            use quickdrop_infra::event_store::PostgresEventStore;

            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for persistent stores")?;
            let pg = PostgresEventStore::connect(url).await?;
            pg.migrate().await?;

            let mut history = Vec::new();
            for tenant_id in pg.tenants_async().await? {
                history.push((tenant_id, pg.load_all_async(tenant_id).await?));
            }
            info!(tenants = history.len(), "using postgres event store");
            return Ok((Arc::new(pg), history));
        }
        #[cfg(not(feature = "postgres"))]
        {
            warn!("postgres feature not enabled, ignoring USE_PERSISTENT_STORES");
        }
    }
    Ok((Arc::new(InMemoryEventStore::new()), Vec::new()))
}

impl AppServices {
    pub fn dispatcher(&self) -> &Dispatcher {
        self.coordinator.dispatcher()
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    // Aggregate loads are strongly consistent; handlers use them for
    // ownership checks instead of the lagging read models.

    pub fn load_store(&self, tenant_id: TenantId, id: StoreId) -> Result<Store, DispatchError> {
        self.dispatcher()
            .load(tenant_id, id.0, |_, aid| Store::empty(StoreId::new(aid)))
    }

    pub fn load_category(
        &self,
        tenant_id: TenantId,
        id: CategoryId,
    ) -> Result<Category, DispatchError> {
        self.dispatcher()
            .load(tenant_id, id.0, |_, aid| Category::empty(CategoryId::new(aid)))
    }

    pub fn load_product(
        &self,
        tenant_id: TenantId,
        id: ProductId,
    ) -> Result<Product, DispatchError> {
        self.dispatcher()
            .load(tenant_id, id.0, |_, aid| Product::empty(ProductId::new(aid)))
    }

    pub fn load_order(&self, tenant_id: TenantId, id: OrderId) -> Result<Order, DispatchError> {
        self.dispatcher()
            .load(tenant_id, id.0, |_, aid| Order::empty(OrderId::new(aid)))
    }

    pub fn load_profile(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
    ) -> Result<AgentProfile, DispatchError> {
        self.dispatcher()
            .load(tenant_id, ProfileId::for_agent(agent_id).0, |_, aid| {
                AgentProfile::empty(ProfileId(aid))
            })
    }

    pub fn load_wallet(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
    ) -> Result<AgentWallet, DispatchError> {
        self.dispatcher()
            .load(tenant_id, WalletId::for_agent(agent_id).0, |_, aid| {
                AgentWallet::empty(WalletId(aid))
            })
    }

    pub fn load_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<User, DispatchError> {
        self.dispatcher()
            .load(tenant_id, AggregateId::from(user_id), |_, aid| {
                User::empty(UserId::from_uuid(*aid.as_uuid()))
            })
    }

    pub fn dispatch_store(
        &self,
        tenant_id: TenantId,
        id: StoreId,
        command: StoreCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher()
            .dispatch(tenant_id, id.0, Store::AGGREGATE_TYPE, command, |_, aid| {
                Store::empty(StoreId::new(aid))
            })
    }

    pub fn dispatch_category(
        &self,
        tenant_id: TenantId,
        id: CategoryId,
        command: CategoryCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher()
            .dispatch(tenant_id, id.0, Category::AGGREGATE_TYPE, command, |_, aid| {
                Category::empty(CategoryId::new(aid))
            })
    }

    pub fn dispatch_product(
        &self,
        tenant_id: TenantId,
        id: ProductId,
        command: ProductCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher()
            .dispatch(tenant_id, id.0, Product::AGGREGATE_TYPE, command, |_, aid| {
                Product::empty(ProductId::new(aid))
            })
    }

    pub fn dispatch_order(
        &self,
        tenant_id: TenantId,
        id: OrderId,
        command: OrderCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher()
            .dispatch(tenant_id, id.0, Order::AGGREGATE_TYPE, command, |_, aid| {
                Order::empty(OrderId::new(aid))
            })
    }

    pub fn dispatch_profile(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
        command: AgentProfileCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher().dispatch(
            tenant_id,
            ProfileId::for_agent(agent_id).0,
            AgentProfile::AGGREGATE_TYPE,
            command,
            |_, aid| AgentProfile::empty(ProfileId(aid)),
        )
    }

    pub fn dispatch_wallet(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
        command: WalletCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher().dispatch(
            tenant_id,
            WalletId::for_agent(agent_id).0,
            AgentWallet::AGGREGATE_TYPE,
            command,
            |_, aid| AgentWallet::empty(WalletId(aid)),
        )
    }

    pub fn dispatch_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        command: UserCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher().dispatch(
            tenant_id,
            AggregateId::from(user_id),
            User::AGGREGATE_TYPE,
            command,
            |_, aid| User::empty(UserId::from_uuid(*aid.as_uuid())),
        )
    }
}

/// SSE stream of one tenant's realtime messages, optionally limited to
/// some topics.
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
    topics: Option<Vec<String>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let wanted = topics
                .as_ref()
                .is_none_or(|t| t.iter().any(|topic| topic == m.topic));
            if !wanted {
                return None;
            }
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        // Lagged receivers just skip ahead.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_projected_aggregate_has_a_topic() {
        for aggregate_type in [
            Store::AGGREGATE_TYPE,
            Category::AGGREGATE_TYPE,
            Product::AGGREGATE_TYPE,
            Order::AGGREGATE_TYPE,
            AgentProfile::AGGREGATE_TYPE,
            AgentWallet::AGGREGATE_TYPE,
            User::AGGREGATE_TYPE,
        ] {
            let topic = topic_for(aggregate_type).unwrap();
            assert!(TOPICS.contains(&topic));
        }
        assert_eq!(topic_for("unknown.thing"), None);
    }
}
