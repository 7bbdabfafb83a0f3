//! Order listings for customers, stores, agents and admins.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use quickdrop_catalog::StoreId;
use quickdrop_core::{Money, TenantId, UserId};
use quickdrop_events::EventEnvelope;
use quickdrop_orders::{
    Order, OrderEvent, OrderId, OrderItem, OrderStatus, PaymentStatus, PurchaseType,
};

use super::{Projection, ProjectionError, StreamCursors, ensure_tenant, next_event};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub store_id: StoreId,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub purchase_type: Option<PurchaseType>,
    pub agent_id: Option<UserId>,
    pub cash_requested: Option<Money>,
    pub cash_approved: Option<Money>,
    pub purchase_cost: Option<Money>,
    pub receipt_url: Option<String>,
    pub cancellation_reason: Option<String>,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderReadModel {
    fn transition(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        self.history.push(StatusChange { status, at });
    }
}

#[derive(Debug)]
pub struct OrdersProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> OrdersProjection<S>
where
    S: TenantStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(tenant_id, order_id)
    }

    /// Newest first, optionally narrowed by `keep`.
    pub fn list_where(
        &self,
        tenant_id: TenantId,
        keep: impl Fn(&OrderReadModel) -> bool,
    ) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|o| keep(o))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn for_customer(&self, tenant_id: TenantId, customer_id: UserId) -> Vec<OrderReadModel> {
        self.list_where(tenant_id, |o| o.customer_id == customer_id)
    }

    pub fn for_store(&self, tenant_id: TenantId, store_id: StoreId) -> Vec<OrderReadModel> {
        self.list_where(tenant_id, |o| o.store_id == store_id)
    }

    pub fn for_agent(&self, tenant_id: TenantId, agent_id: UserId) -> Vec<OrderReadModel> {
        self.list_where(tenant_id, |o| o.agent_id == Some(agent_id))
    }

    /// Pending orders nobody has accepted yet, oldest first.
    pub fn open_jobs(&self, tenant_id: TenantId) -> Vec<OrderReadModel> {
        let mut jobs = self.list_where(tenant_id, |o| {
            o.status == OrderStatus::Pending && o.agent_id.is_none()
        });
        jobs.reverse();
        jobs
    }

    pub fn with_status(&self, tenant_id: TenantId, status: OrderStatus) -> Vec<OrderReadModel> {
        self.list_where(tenant_id, |o| o.status == status)
    }

    fn update(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        f: impl FnOnce(&mut OrderReadModel),
    ) {
        if let Some(mut rm) = self.store.get(tenant_id, &order_id) {
            f(&mut rm);
            self.store.upsert(tenant_id, order_id, rm);
        }
    }
}

impl<S> Projection for OrdersProjection<S>
where
    S: TenantStore<OrderId, OrderReadModel>,
{
    fn aggregate_type(&self) -> &'static str {
        Order::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<OrderEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        match ev {
            OrderEvent::Placed(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.order_id,
                    OrderReadModel {
                        order_id: e.order_id,
                        customer_id: e.customer_id,
                        store_id: e.store_id,
                        items: e.items,
                        delivery_address: e.delivery_address,
                        notes: e.notes,
                        subtotal: e.subtotal,
                        delivery_fee: e.delivery_fee,
                        total: e.total,
                        status: OrderStatus::Pending,
                        payment_status: PaymentStatus::Unpaid,
                        purchase_type: None,
                        agent_id: None,
                        cash_requested: None,
                        cash_approved: None,
                        purchase_cost: None,
                        receipt_url: None,
                        cancellation_reason: None,
                        history: vec![StatusChange {
                            status: OrderStatus::Pending,
                            at: e.occurred_at,
                        }],
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::JobAccepted(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.agent_id = Some(e.agent_id);
                    rm.purchase_type = Some(e.purchase_type);
                    rm.transition(OrderStatus::Assigned, e.occurred_at);
                });
            }
            OrderEvent::JobReleased(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.agent_id = None;
                    rm.purchase_type = None;
                    rm.cash_requested = None;
                    rm.transition(OrderStatus::Pending, e.occurred_at);
                });
            }
            OrderEvent::CashRequested(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.cash_requested = Some(e.amount);
                    rm.transition(OrderStatus::CashRequested, e.occurred_at);
                });
            }
            OrderEvent::CashApproved(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.cash_approved = Some(e.amount);
                    rm.transition(OrderStatus::CashApproved, e.occurred_at);
                });
            }
            OrderEvent::CashRejected(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.cash_requested = None;
                    rm.transition(OrderStatus::Assigned, e.occurred_at);
                });
            }
            OrderEvent::PurchaseConfirmed(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.purchase_cost = Some(e.cost);
                    rm.receipt_url = Some(e.receipt_url);
                    rm.transition(OrderStatus::Purchased, e.occurred_at);
                });
            }
            OrderEvent::DeliveryStarted(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.transition(OrderStatus::OnTheWay, e.occurred_at);
                });
            }
            OrderEvent::Delivered(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.payment_status = PaymentStatus::Paid;
                    rm.transition(OrderStatus::Delivered, e.occurred_at);
                });
            }
            OrderEvent::Cancelled(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.order_id, |rm| {
                    rm.payment_status = PaymentStatus::Voided;
                    rm.cancellation_reason = Some(e.reason);
                    rm.transition(OrderStatus::Cancelled, e.occurred_at);
                });
            }
        }

        self.cursors
            .advance(tenant_id, envelope.aggregate_id(), envelope.sequence_number());
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
