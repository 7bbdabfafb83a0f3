//! Order aggregate.
//!
//! Lifecycle:
//!
//! ```text
//! pending ─accept─▶ assigned ─(cpo) request cash─▶ cash_requested ─approve─▶ cash_approved
//!    ▲                 │  ▲                              │                         │
//!    └────release──────┘  └──────────reject──────────────┘                         │
//!                      │(apo)                                                      │
//!                      └──────────────── purchase ◀────────────────────────────────┘
//!                                           │
//!                                      purchased ─start─▶ on_the_way ─deliver─▶ delivered
//! ```
//!
//! `cancelled` is reachable from `pending` by the customer or the store, and
//! from anything up to `cash_approved` by an admin. Every other transition is
//! rejected here, so no caller can skip a step or move an order backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_catalog::{ProductId, StoreId};
use quickdrop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId};
use quickdrop_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    CashRequested,
    CashApproved,
    Purchased,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::CashRequested => "cash_requested",
            OrderStatus::CashApproved => "cash_approved",
            OrderStatus::Purchased => "purchased",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => OrderStatus::Pending,
            "assigned" => OrderStatus::Assigned,
            "cash_requested" => OrderStatus::CashRequested,
            "cash_approved" => OrderStatus::CashApproved,
            "purchased" => OrderStatus::Purchased,
            "on_the_way" => OrderStatus::OnTheWay,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            other => return Err(DomainError::validation(format!("unknown order status '{other}'"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Voided,
}

/// How the agent pays the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseType {
    /// Cash purchase: the agent draws company cash before buying.
    Cpo,
    /// Assisted purchase: paid by card, no cash draw.
    Apo,
}

/// Who is cancelling, as far as the order can verify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CancelActor {
    Customer { user_id: UserId },
    /// Store ownership of the caller is checked before dispatch.
    Store { user_id: UserId, store_id: StoreId },
    Admin { user_id: UserId },
}

impl CancelActor {
    pub fn user_id(&self) -> UserId {
        match self {
            CancelActor::Customer { user_id }
            | CancelActor::Store { user_id, .. }
            | CancelActor::Admin { user_id } => *user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub line_no: u32,
    pub product_id: ProductId,
    /// Name and price are snapshots taken at checkout.
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

/// A line as submitted at checkout, before numbering and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    tenant_id: Option<TenantId>,
    customer_id: Option<UserId>,
    store_id: Option<StoreId>,
    items: Vec<OrderItem>,
    delivery_address: String,
    notes: Option<String>,
    subtotal: Money,
    delivery_fee: Money,
    total: Money,
    status: OrderStatus,
    payment_status: PaymentStatus,
    purchase_type: Option<PurchaseType>,
    agent_id: Option<UserId>,
    cash_requested: Option<Money>,
    cash_approved: Option<Money>,
    purchase_cost: Option<Money>,
    receipt_url: Option<String>,
    cancellation_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Order {
    pub const AGGREGATE_TYPE: &'static str = "orders.order";

    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            store_id: None,
            items: Vec::new(),
            delivery_address: String::new(),
            notes: None,
            subtotal: Money::ZERO,
            delivery_fee: Money::ZERO,
            total: Money::ZERO,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            purchase_type: None,
            agent_id: None,
            cash_requested: None,
            cash_approved: None,
            purchase_cost: None,
            receipt_url: None,
            cancellation_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> Option<UserId> {
        self.customer_id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn purchase_type(&self) -> Option<PurchaseType> {
        self.purchase_type
    }

    pub fn agent_id(&self) -> Option<UserId> {
        self.agent_id
    }

    pub fn cash_requested(&self) -> Option<Money> {
        self.cash_requested
    }

    pub fn cash_approved(&self) -> Option<Money> {
        self.cash_approved
    }

    pub fn purchase_cost(&self) -> Option<Money> {
        self.purchase_cost
    }

    pub fn receipt_url(&self) -> Option<&str> {
        self.receipt_url.as_deref()
    }

    /// Waiting for an agent to take it.
    pub fn is_open_job(&self) -> bool {
        self.created && self.status == OrderStatus::Pending && self.agent_id.is_none()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub store_id: StoreId,
    pub items: Vec<NewOrderItem>,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub delivery_fee: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Take a pending job. Also used by admins to assign an agent directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptJob {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub purchase_type: PurchaseType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseJob {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCash {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveCash {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub approved_by: UserId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCash {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPurchase {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub cost: Money,
    pub receipt_url: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartDelivery {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmDelivery {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub actor: CancelActor,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Place(PlaceOrder),
    AcceptJob(AcceptJob),
    ReleaseJob(ReleaseJob),
    RequestCash(RequestCash),
    ApproveCash(ApproveCash),
    RejectCash(RejectCash),
    ConfirmPurchase(ConfirmPurchase),
    StartDelivery(StartDelivery),
    ConfirmDelivery(ConfirmDelivery),
    Cancel(CancelOrder),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub store_id: StoreId,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub total: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAccepted {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub purchase_type: PurchaseType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReleased {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRequested {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashApproved {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub approved_by: UserId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRejected {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseConfirmed {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub purchase_type: PurchaseType,
    pub cost: Money,
    pub receipt_url: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStarted {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub agent_id: UserId,
    /// Cash collected from the customer.
    pub collected: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub actor: CancelActor,
    pub previous_status: OrderStatus,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    JobAccepted(JobAccepted),
    JobReleased(JobReleased),
    CashRequested(CashRequested),
    CashApproved(CashApproved),
    CashRejected(CashRejected),
    PurchaseConfirmed(PurchaseConfirmed),
    DeliveryStarted(DeliveryStarted),
    Delivered(OrderDelivered),
    Cancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "orders.order.placed",
            OrderEvent::JobAccepted(_) => "orders.order.job_accepted",
            OrderEvent::JobReleased(_) => "orders.order.job_released",
            OrderEvent::CashRequested(_) => "orders.order.cash_requested",
            OrderEvent::CashApproved(_) => "orders.order.cash_approved",
            OrderEvent::CashRejected(_) => "orders.order.cash_rejected",
            OrderEvent::PurchaseConfirmed(_) => "orders.order.purchase_confirmed",
            OrderEvent::DeliveryStarted(_) => "orders.order.delivery_started",
            OrderEvent::Delivered(_) => "orders.order.delivered",
            OrderEvent::Cancelled(_) => "orders.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.occurred_at,
            OrderEvent::JobAccepted(e) => e.occurred_at,
            OrderEvent::JobReleased(e) => e.occurred_at,
            OrderEvent::CashRequested(e) => e.occurred_at,
            OrderEvent::CashApproved(e) => e.occurred_at,
            OrderEvent::CashRejected(e) => e.occurred_at,
            OrderEvent::PurchaseConfirmed(e) => e.occurred_at,
            OrderEvent::DeliveryStarted(e) => e.occurred_at,
            OrderEvent::Delivered(e) => e.occurred_at,
            OrderEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.store_id = Some(e.store_id);
                self.items = e.items.clone();
                self.delivery_address = e.delivery_address.clone();
                self.notes = e.notes.clone();
                self.subtotal = e.subtotal;
                self.delivery_fee = e.delivery_fee;
                self.total = e.total;
                self.status = OrderStatus::Pending;
                self.payment_status = PaymentStatus::Unpaid;
                self.created = true;
            }
            OrderEvent::JobAccepted(e) => {
                self.agent_id = Some(e.agent_id);
                self.purchase_type = Some(e.purchase_type);
                self.status = OrderStatus::Assigned;
            }
            OrderEvent::JobReleased(_) => {
                self.agent_id = None;
                self.purchase_type = None;
                self.status = OrderStatus::Pending;
            }
            OrderEvent::CashRequested(e) => {
                self.cash_requested = Some(e.amount);
                self.status = OrderStatus::CashRequested;
            }
            OrderEvent::CashApproved(e) => {
                self.cash_approved = Some(e.amount);
                self.status = OrderStatus::CashApproved;
            }
            OrderEvent::CashRejected(_) => {
                self.cash_requested = None;
                self.status = OrderStatus::Assigned;
            }
            OrderEvent::PurchaseConfirmed(e) => {
                self.purchase_cost = Some(e.cost);
                self.receipt_url = Some(e.receipt_url.clone());
                self.status = OrderStatus::Purchased;
            }
            OrderEvent::DeliveryStarted(_) => self.status = OrderStatus::OnTheWay,
            OrderEvent::Delivered(_) => {
                self.status = OrderStatus::Delivered;
                self.payment_status = PaymentStatus::Paid;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.payment_status = PaymentStatus::Voided;
                self.cancellation_reason = Some(e.reason.clone());
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Place(cmd) => self.handle_place(cmd),
            OrderCommand::AcceptJob(cmd) => self.handle_accept(cmd),
            OrderCommand::ReleaseJob(cmd) => self.handle_release(cmd),
            OrderCommand::RequestCash(cmd) => self.handle_request_cash(cmd),
            OrderCommand::ApproveCash(cmd) => self.handle_approve_cash(cmd),
            OrderCommand::RejectCash(cmd) => self.handle_reject_cash(cmd),
            OrderCommand::ConfirmPurchase(cmd) => self.handle_confirm_purchase(cmd),
            OrderCommand::StartDelivery(cmd) => self.handle_start_delivery(cmd),
            OrderCommand::ConfirmDelivery(cmd) => self.handle_confirm_delivery(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invariant(format!(
                "cannot {action} an order that is {}",
                self.status
            )));
        }
        Ok(())
    }

    /// The assigned agent, and only they, may drive fulfillment.
    fn ensure_assigned_agent(&self, agent_id: UserId) -> Result<UserId, DomainError> {
        match self.agent_id {
            Some(assigned) if assigned == agent_id => Ok(assigned),
            Some(_) => Err(DomainError::Unauthorized),
            None => Err(DomainError::invariant("order has no agent")),
        }
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        let delivery_address = cmd.delivery_address.trim();
        if delivery_address.is_empty() {
            return Err(DomainError::validation("delivery address is required"));
        }

        let mut items = Vec::with_capacity(cmd.items.len());
        for (idx, item) in cmd.items.iter().enumerate() {
            if item.quantity == 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if item.unit_price.is_zero() {
                return Err(DomainError::validation("unit price must be positive"));
            }
            items.push(OrderItem {
                line_no: (idx + 1) as u32,
                product_id: item.product_id,
                name: item.name.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_total: item.unit_price.checked_mul(item.quantity)?,
            });
        }

        let subtotal = items
            .iter()
            .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.line_total))?;
        let total = subtotal.checked_add(cmd.delivery_fee)?;

        Ok(vec![OrderEvent::Placed(OrderPlaced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            store_id: cmd.store_id,
            items,
            delivery_address: delivery_address.to_string(),
            notes: cmd
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            subtotal,
            delivery_fee: cmd.delivery_fee,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptJob) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        if self.agent_id.is_some() {
            return Err(DomainError::conflict("job already taken"));
        }
        self.ensure_status(OrderStatus::Pending, "accept")?;

        Ok(vec![OrderEvent::JobAccepted(JobAccepted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id: cmd.agent_id,
            purchase_type: cmd.purchase_type,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseJob) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let agent_id = self.ensure_assigned_agent(cmd.agent_id)?;
        self.ensure_status(OrderStatus::Assigned, "release")?;

        Ok(vec![OrderEvent::JobReleased(JobReleased {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_request_cash(&self, cmd: &RequestCash) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let agent_id = self.ensure_assigned_agent(cmd.agent_id)?;
        self.ensure_status(OrderStatus::Assigned, "request cash for")?;
        if self.purchase_type != Some(PurchaseType::Cpo) {
            return Err(DomainError::invariant("cash can only be requested for CPO orders"));
        }
        if cmd.amount.is_zero() {
            return Err(DomainError::validation("requested amount must be positive"));
        }

        Ok(vec![OrderEvent::CashRequested(CashRequested {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve_cash(&self, cmd: &ApproveCash) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.ensure_status(OrderStatus::CashRequested, "approve cash for")?;
        let requested = self
            .cash_requested
            .ok_or_else(|| DomainError::invariant("no cash request on order"))?;
        if cmd.amount.is_zero() {
            return Err(DomainError::validation("approved amount must be positive"));
        }
        if cmd.amount > requested {
            return Err(DomainError::validation(format!(
                "approved amount {} exceeds requested {}",
                cmd.amount, requested
            )));
        }
        let agent_id = self
            .agent_id
            .ok_or_else(|| DomainError::invariant("order has no agent"))?;

        Ok(vec![OrderEvent::CashApproved(CashApproved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            approved_by: cmd.approved_by,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject_cash(&self, cmd: &RejectCash) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.ensure_status(OrderStatus::CashRequested, "reject cash for")?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a reason is required"));
        }
        let agent_id = self
            .agent_id
            .ok_or_else(|| DomainError::invariant("order has no agent"))?;

        Ok(vec![OrderEvent::CashRejected(CashRejected {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            rejected_by: cmd.rejected_by,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm_purchase(
        &self,
        cmd: &ConfirmPurchase,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let agent_id = self.ensure_assigned_agent(cmd.agent_id)?;
        let purchase_type = self
            .purchase_type
            .ok_or_else(|| DomainError::invariant("order has no purchase type"))?;

        match purchase_type {
            PurchaseType::Cpo => {
                self.ensure_status(OrderStatus::CashApproved, "confirm purchase for")?;
                let approved = self.cash_approved.unwrap_or(Money::ZERO);
                if cmd.cost > approved {
                    return Err(DomainError::validation(format!(
                        "purchase cost {} exceeds approved cash {}",
                        cmd.cost, approved
                    )));
                }
            }
            PurchaseType::Apo => {
                self.ensure_status(OrderStatus::Assigned, "confirm purchase for")?;
            }
        }
        if cmd.cost.is_zero() {
            return Err(DomainError::validation("purchase cost must be positive"));
        }
        if cmd.receipt_url.trim().is_empty() {
            return Err(DomainError::validation("a receipt is required"));
        }

        Ok(vec![OrderEvent::PurchaseConfirmed(PurchaseConfirmed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            purchase_type,
            cost: cmd.cost,
            receipt_url: cmd.receipt_url.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start_delivery(&self, cmd: &StartDelivery) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let agent_id = self.ensure_assigned_agent(cmd.agent_id)?;
        self.ensure_status(OrderStatus::Purchased, "start delivery for")?;

        Ok(vec![OrderEvent::DeliveryStarted(DeliveryStarted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm_delivery(
        &self,
        cmd: &ConfirmDelivery,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let agent_id = self.ensure_assigned_agent(cmd.agent_id)?;
        self.ensure_status(OrderStatus::OnTheWay, "deliver")?;

        Ok(vec![OrderEvent::Delivered(OrderDelivered {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            agent_id,
            collected: self.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a cancellation reason is required"));
        }

        let allowed = match cmd.actor {
            CancelActor::Customer { user_id } => {
                if self.customer_id != Some(user_id) {
                    return Err(DomainError::Unauthorized);
                }
                self.status == OrderStatus::Pending
            }
            CancelActor::Store { store_id, .. } => {
                if self.store_id != Some(store_id) {
                    return Err(DomainError::Unauthorized);
                }
                self.status == OrderStatus::Pending
            }
            CancelActor::Admin { .. } => matches!(
                self.status,
                OrderStatus::Pending
                    | OrderStatus::Assigned
                    | OrderStatus::CashRequested
                    | OrderStatus::CashApproved
            ),
        };
        if !allowed {
            return Err(DomainError::invariant(format!(
                "cannot cancel an order that is {}",
                self.status
            )));
        }

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            previous_status: self.status,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use quickdrop_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn item(price: u64, qty: u32) -> NewOrderItem {
        NewOrderItem {
            product_id: ProductId::new(AggregateId::new()),
            name: "Milk 1L".to_string(),
            unit_price: Money::from_minor(price),
            quantity: qty,
        }
    }

    struct Fixture {
        tenant_id: TenantId,
        order_id: OrderId,
        customer_id: UserId,
        store_id: StoreId,
        agent_id: UserId,
        admin_id: UserId,
        order: Order,
    }

    impl Fixture {
        fn placed() -> Self {
            let tenant_id = TenantId::new();
            let order_id = OrderId::new(AggregateId::new());
            let customer_id = UserId::new();
            let store_id = StoreId::new(AggregateId::new());
            let mut order = Order::empty(order_id);
            execute(
                &mut order,
                &OrderCommand::Place(PlaceOrder {
                    tenant_id,
                    order_id,
                    customer_id,
                    store_id,
                    items: vec![item(250, 2), item(1000, 1)],
                    delivery_address: " 12 Harbour Rd ".to_string(),
                    notes: None,
                    delivery_fee: Money::from_minor(500),
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            Self {
                tenant_id,
                order_id,
                customer_id,
                store_id,
                agent_id: UserId::new(),
                admin_id: UserId::new(),
                order,
            }
        }

        fn run(&mut self, cmd: OrderCommand) -> Result<Vec<OrderEvent>, DomainError> {
            execute(&mut self.order, &cmd)
        }

        fn accept(&self, purchase_type: PurchaseType) -> OrderCommand {
            self.accept_by(self.agent_id, purchase_type)
        }

        fn accept_by(&self, agent_id: UserId, purchase_type: PurchaseType) -> OrderCommand {
            OrderCommand::AcceptJob(AcceptJob {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                agent_id,
                purchase_type,
                occurred_at: test_time(),
            })
        }

        fn request_cash(&self, amount: u64) -> OrderCommand {
            OrderCommand::RequestCash(RequestCash {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                agent_id: self.agent_id,
                amount: Money::from_minor(amount),
                occurred_at: test_time(),
            })
        }

        fn approve_cash(&self, amount: u64) -> OrderCommand {
            OrderCommand::ApproveCash(ApproveCash {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                approved_by: self.admin_id,
                amount: Money::from_minor(amount),
                occurred_at: test_time(),
            })
        }

        fn purchase(&self, cost: u64) -> OrderCommand {
            OrderCommand::ConfirmPurchase(ConfirmPurchase {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                agent_id: self.agent_id,
                cost: Money::from_minor(cost),
                receipt_url: "https://files/receipts/r1.jpg".to_string(),
                occurred_at: test_time(),
            })
        }

        fn start(&self) -> OrderCommand {
            OrderCommand::StartDelivery(StartDelivery {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                agent_id: self.agent_id,
                occurred_at: test_time(),
            })
        }

        fn deliver(&self) -> OrderCommand {
            OrderCommand::ConfirmDelivery(ConfirmDelivery {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                agent_id: self.agent_id,
                occurred_at: test_time(),
            })
        }

        fn cancel(&self, actor: CancelActor) -> OrderCommand {
            OrderCommand::Cancel(CancelOrder {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                actor,
                reason: "changed my mind".to_string(),
                occurred_at: test_time(),
            })
        }
    }

    #[test]
    fn place_order_computes_totals_and_numbers_lines() {
        let f = Fixture::placed();
        assert_eq!(f.order.status(), OrderStatus::Pending);
        assert_eq!(f.order.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(f.order.subtotal(), Money::from_minor(1500));
        assert_eq!(f.order.total(), Money::from_minor(2000));
        let lines: Vec<u32> = f.order.items().iter().map(|i| i.line_no).collect();
        assert_eq!(lines, vec![1, 2]);
        assert!(f.order.is_open_job());
    }

    #[test]
    fn empty_or_zero_quantity_orders_are_rejected() {
        let order_id = OrderId::new(AggregateId::new());
        let base = PlaceOrder {
            tenant_id: TenantId::new(),
            order_id,
            customer_id: UserId::new(),
            store_id: StoreId::new(AggregateId::new()),
            items: vec![],
            delivery_address: "x".to_string(),
            notes: None,
            delivery_fee: Money::ZERO,
            occurred_at: test_time(),
        };
        let order = Order::empty(order_id);
        assert!(matches!(
            order.handle(&OrderCommand::Place(base.clone())),
            Err(DomainError::Validation(_))
        ));

        let zero_qty = PlaceOrder {
            items: vec![item(100, 0)],
            ..base
        };
        assert!(matches!(
            order.handle(&OrderCommand::Place(zero_qty)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn full_cpo_lifecycle() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        f.run(f.request_cash(1600)).unwrap();
        f.run(f.approve_cash(1500)).unwrap();
        assert_eq!(f.order.cash_approved(), Some(Money::from_minor(1500)));

        f.run(f.purchase(1450)).unwrap();
        assert_eq!(f.order.status(), OrderStatus::Purchased);
        assert_eq!(f.order.receipt_url(), Some("https://files/receipts/r1.jpg"));

        f.run(f.start()).unwrap();
        let events = f.run(f.deliver()).unwrap();
        let OrderEvent::Delivered(delivered) = &events[0] else {
            panic!("expected Delivered event");
        };
        assert_eq!(delivered.collected, Money::from_minor(2000));
        assert_eq!(f.order.status(), OrderStatus::Delivered);
        assert_eq!(f.order.payment_status(), PaymentStatus::Paid);
        assert_eq!(f.order.version(), 7);
    }

    #[test]
    fn full_apo_lifecycle_skips_cash() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Apo)).unwrap();
        assert!(f.run(f.request_cash(100)).is_err());
        f.run(f.purchase(1500)).unwrap();
        f.run(f.start()).unwrap();
        f.run(f.deliver()).unwrap();
        assert_eq!(f.order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn second_agent_gets_conflict() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        let err = f.order.handle(&f.accept_by(UserId::new(), PurchaseType::Apo)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn only_assigned_agent_can_progress() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Apo)).unwrap();
        f.agent_id = UserId::new();
        assert_eq!(f.order.handle(&f.purchase(100)).unwrap_err(), DomainError::Unauthorized);
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let mut f = Fixture::placed();
        assert!(f.order.handle(&f.deliver()).is_err());
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        // CPO needs approved cash before purchase.
        assert!(f.order.handle(&f.purchase(100)).is_err());
        assert!(f.order.handle(&f.start()).is_err());
        assert!(f.order.handle(&f.approve_cash(100)).is_err());
    }

    #[test]
    fn approval_and_cost_are_capped() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        f.run(f.request_cash(1000)).unwrap();
        assert!(matches!(
            f.order.handle(&f.approve_cash(1001)),
            Err(DomainError::Validation(_))
        ));
        f.run(f.approve_cash(800)).unwrap();
        assert!(matches!(f.order.handle(&f.purchase(801)), Err(DomainError::Validation(_))));
        f.run(f.purchase(800)).unwrap();
    }

    #[test]
    fn rejected_cash_returns_to_assigned_and_can_be_requested_again() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        f.run(f.request_cash(5000)).unwrap();
        f.run(OrderCommand::RejectCash(RejectCash {
            tenant_id: f.tenant_id,
            order_id: f.order_id,
            rejected_by: f.admin_id,
            reason: "too much".to_string(),
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(f.order.status(), OrderStatus::Assigned);
        assert_eq!(f.order.cash_requested(), None);
        f.run(f.request_cash(1500)).unwrap();
    }

    #[test]
    fn release_reopens_job() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        f.run(OrderCommand::ReleaseJob(ReleaseJob {
            tenant_id: f.tenant_id,
            order_id: f.order_id,
            agent_id: f.agent_id,
            reason: None,
            occurred_at: test_time(),
        }))
        .unwrap();
        assert!(f.order.is_open_job());
        assert_eq!(f.order.purchase_type(), None);
    }

    #[test]
    fn customer_and_store_cancel_only_while_pending() {
        let mut f = Fixture::placed();
        let customer = CancelActor::Customer { user_id: f.customer_id };
        let store = CancelActor::Store {
            user_id: UserId::new(),
            store_id: f.store_id,
        };
        let stranger = CancelActor::Customer { user_id: UserId::new() };

        assert_eq!(f.order.handle(&f.cancel(stranger)).unwrap_err(), DomainError::Unauthorized);
        assert!(f.order.handle(&f.cancel(store)).is_ok());

        f.run(f.accept(PurchaseType::Apo)).unwrap();
        assert!(f.order.handle(&f.cancel(customer)).is_err());
        assert!(f.order.handle(&f.cancel(store)).is_err());
    }

    #[test]
    fn admin_cancel_voids_payment_up_to_cash_approved() {
        let mut f = Fixture::placed();
        let admin = CancelActor::Admin { user_id: f.admin_id };
        f.run(f.accept(PurchaseType::Cpo)).unwrap();
        f.run(f.request_cash(1500)).unwrap();
        f.run(f.approve_cash(1500)).unwrap();

        let events = f.run(f.cancel(admin)).unwrap();
        let OrderEvent::Cancelled(e) = &events[0] else {
            panic!("expected Cancelled event");
        };
        assert_eq!(e.previous_status, OrderStatus::CashApproved);
        assert_eq!(f.order.payment_status(), PaymentStatus::Voided);
        assert!(f.order.handle(&f.cancel(admin)).is_err());
    }

    #[test]
    fn admin_cannot_cancel_after_purchase() {
        let mut f = Fixture::placed();
        f.run(f.accept(PurchaseType::Apo)).unwrap();
        f.run(f.purchase(900)).unwrap();
        let err = f
            .order
            .handle(&f.cancel(CancelActor::Admin { user_id: f.admin_id }))
            .unwrap_err();
        assert!(err.to_string().contains("purchased"));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let f = Fixture::placed();
        let before = f.order.clone();
        let first = f.order.handle(&f.accept(PurchaseType::Cpo)).unwrap();
        let second = f.order.handle(&f.accept(PurchaseType::Cpo)).unwrap();
        assert_eq!(f.order, before);
        assert_eq!(first, second);
    }

    #[test]
    fn status_parses_from_wire_names() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::CashRequested,
            OrderStatus::OnTheWay,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    proptest! {
        #[test]
        fn total_is_subtotal_plus_fee(
            lines in prop::collection::vec((1u64..10_000, 1u32..20), 1..8),
            fee in 0u64..2_000,
        ) {
            let order_id = OrderId::new(AggregateId::new());
            let mut order = Order::empty(order_id);
            let items: Vec<NewOrderItem> = lines.iter().map(|(p, q)| item(*p, *q)).collect();
            execute(&mut order, &OrderCommand::Place(PlaceOrder {
                tenant_id: TenantId::new(),
                order_id,
                customer_id: UserId::new(),
                store_id: StoreId::new(AggregateId::new()),
                items,
                delivery_address: "somewhere".to_string(),
                notes: None,
                delivery_fee: Money::from_minor(fee),
                occurred_at: test_time(),
            })).unwrap();

            let expected: u64 = lines.iter().map(|(p, q)| p * u64::from(*q)).sum();
            prop_assert_eq!(order.subtotal().minor(), expected);
            prop_assert_eq!(order.total().minor(), expected + fee);
        }
    }
}
