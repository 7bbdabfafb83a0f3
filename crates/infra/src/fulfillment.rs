//! Fulfillment coordinator: the operations that touch an order and an agent
//! wallet together.
//!
//! Each stream is only consistent on its own, so a two-stream operation is a
//! small orchestration with a compensating step:
//!
//! ```text
//! approve cash      wallet advance     → order approve     (fail: reverse advance)
//! confirm purchase  wallet purchase    → order purchased   (fail: reverse purchase, delete receipt)
//! confirm delivery  wallet collection  → order delivered   (fail: reverse collection)
//! cancel            order cancelled    → reverse advance   (fail: error! and surfaced)
//! ```
//!
//! Every order command is validated against the current order before the
//! wallet is touched, so compensation only runs when the order append itself
//! failed (a concurrent writer or a store error). A bus failure after the
//! append is logged and the step counts as done.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use quickdrop_agents::profile::ProfileId;
use quickdrop_agents::wallet::{
    IssueAdvance, RecordCollection, RecordPurchase, ReverseTransaction, WalletId,
};
use quickdrop_agents::{AgentProfile, AgentWallet, WalletCommand};
use quickdrop_core::{Aggregate, Money, TenantId, UserId};
use quickdrop_events::{EventBus, EventEnvelope};
use quickdrop_orders::order::{
    AcceptJob, ApproveCash, CancelOrder, ConfirmDelivery, ConfirmPurchase,
};
use quickdrop_orders::{CancelActor, Order, OrderCommand, OrderId, PurchaseType};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::storage::{ObjectStorage, StorageError, StoredObject};

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The primary step failed and undoing the wallet side failed too.
    #[error("{operation} failed and its compensation failed: {compensation}")]
    CompensationFailed {
        operation: &'static str,
        compensation: DispatchError,
    },
}

impl FulfillmentError {
    fn rejected(msg: impl Into<String>) -> Self {
        FulfillmentError::Dispatch(DispatchError::InvariantViolation(msg.into()))
    }
}

pub struct FulfillmentCoordinator<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    storage: Arc<dyn ObjectStorage>,
}

impl<S, B> FulfillmentCoordinator<S, B> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            dispatcher,
            storage,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }
}

impl<S, B> FulfillmentCoordinator<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Assign a pending order to an agent (the agent themselves or an admin).
    ///
    /// The agent must be approved; CPO jobs also need an open wallet that can
    /// still receive advances. A job already taken is a conflict.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub fn accept_job(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        agent_id: UserId,
        purchase_type: PurchaseType,
    ) -> Result<Vec<StoredEvent>, FulfillmentError> {
        let profile = self.load_profile(tenant_id, agent_id)?;
        if !profile.can_take_jobs() {
            return Err(FulfillmentError::rejected("agent is not approved"));
        }
        if purchase_type == PurchaseType::Cpo {
            let wallet = self.load_wallet(tenant_id, agent_id)?;
            if !wallet.can_receive_advances() {
                return Err(FulfillmentError::rejected(
                    "cash purchases need an open, active wallet",
                ));
            }
        }

        let command = OrderCommand::AcceptJob(AcceptJob {
            tenant_id,
            order_id,
            agent_id,
            purchase_type,
            occurred_at: Utc::now(),
        });
        Ok(self.dispatch_order(tenant_id, order_id, command)?)
    }

    /// Approve a cash request: advance the agent's wallet, then move the
    /// order to `cash_approved`.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub fn approve_cash(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        approved_by: UserId,
        amount: Money,
    ) -> Result<Vec<StoredEvent>, FulfillmentError> {
        let now = Utc::now();
        let command = OrderCommand::ApproveCash(ApproveCash {
            tenant_id,
            order_id,
            approved_by,
            amount,
            occurred_at: now,
        });
        let order = self.preflight(tenant_id, order_id, &command)?;
        let agent_id = order
            .agent_id()
            .ok_or_else(|| FulfillmentError::rejected("order has no agent"))?;

        let advance_id = Uuid::now_v7();
        self.dispatch_wallet(
            tenant_id,
            agent_id,
            WalletCommand::IssueAdvance(IssueAdvance {
                tenant_id,
                transaction_id: advance_id,
                order_id,
                amount,
                occurred_at: now,
            }),
        )?;

        match self.dispatch_order(tenant_id, order_id, command) {
            Ok(events) => {
                info!(agent_id = %agent_id, amount = %amount, "cash advance issued");
                Ok(events)
            }
            Err(err) => Err(self.compensate(
                "approve cash",
                tenant_id,
                agent_id,
                advance_id,
                err,
            )),
        }
    }

    /// Confirm the agent bought the goods. `receipt` is already stored; it is
    /// deleted again if the purchase cannot be recorded.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn confirm_purchase(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        agent_id: UserId,
        cost: Money,
        receipt: StoredObject,
    ) -> Result<Vec<StoredEvent>, FulfillmentError> {
        let result = self.record_purchase(tenant_id, order_id, agent_id, cost, &receipt);
        if result.is_err() {
            if let Err(err) = self.storage.delete(receipt.bucket, &receipt.path).await {
                warn!(path = %receipt.path, error = %err, "failed to delete orphaned receipt");
            }
        }
        result
    }

    fn record_purchase(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        agent_id: UserId,
        cost: Money,
        receipt: &StoredObject,
    ) -> Result<Vec<StoredEvent>, FulfillmentError> {
        let now = Utc::now();
        let command = OrderCommand::ConfirmPurchase(ConfirmPurchase {
            tenant_id,
            order_id,
            agent_id,
            cost,
            receipt_url: receipt.public_url.clone(),
            occurred_at: now,
        });
        let order = self.preflight(tenant_id, order_id, &command)?;

        // Card purchases never touch company cash.
        if order.purchase_type() != Some(PurchaseType::Cpo) {
            return Ok(self.dispatch_order(tenant_id, order_id, command)?);
        }

        let purchase_id = Uuid::now_v7();
        self.dispatch_wallet(
            tenant_id,
            agent_id,
            WalletCommand::RecordPurchase(RecordPurchase {
                tenant_id,
                transaction_id: purchase_id,
                order_id,
                amount: cost,
                occurred_at: now,
            }),
        )?;

        self.dispatch_order(tenant_id, order_id, command).map_err(|err| {
            self.compensate("confirm purchase", tenant_id, agent_id, purchase_id, err)
        })
    }

    /// Hand over the goods: the order total collected from the customer goes
    /// into the agent's wallet, then the order is delivered and paid.
    ///
    /// An APO agent without a wallet delivers without a collection row.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub fn confirm_delivery(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        agent_id: UserId,
    ) -> Result<Vec<StoredEvent>, FulfillmentError> {
        let now = Utc::now();
        let command = OrderCommand::ConfirmDelivery(ConfirmDelivery {
            tenant_id,
            order_id,
            agent_id,
            occurred_at: now,
        });
        let order = self.preflight(tenant_id, order_id, &command)?;

        let wallet = self.load_wallet(tenant_id, agent_id)?;
        if !wallet.exists() {
            if order.purchase_type() == Some(PurchaseType::Cpo) {
                return Err(FulfillmentError::rejected("agent has no wallet"));
            }
            info!(agent_id = %agent_id, "no wallet, delivering without collection");
            return Ok(self.dispatch_order(tenant_id, order_id, command)?);
        }

        let collection_id = Uuid::now_v7();
        self.dispatch_wallet(
            tenant_id,
            agent_id,
            WalletCommand::RecordCollection(RecordCollection {
                tenant_id,
                transaction_id: collection_id,
                order_id,
                amount: order.total(),
                occurred_at: now,
            }),
        )?;

        self.dispatch_order(tenant_id, order_id, command).map_err(|err| {
            self.compensate("confirm delivery", tenant_id, agent_id, collection_id, err)
        })
    }

    /// Cancel an order, then give back any cash advanced for it.
    ///
    /// The order stays cancelled if the reversal fails; the failure is logged
    /// and returned so an admin can correct the wallet by hand.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub fn cancel_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        actor: CancelActor,
        reason: String,
    ) -> Result<Vec<StoredEvent>, FulfillmentError> {
        let order = self.load_order(tenant_id, order_id)?;
        let events = self.dispatch_order(
            tenant_id,
            order_id,
            OrderCommand::Cancel(CancelOrder {
                tenant_id,
                order_id,
                actor,
                reason: reason.clone(),
                occurred_at: Utc::now(),
            }),
        )?;

        let Some(agent_id) = order.agent_id() else {
            return Ok(events);
        };
        let wallet = self.load_wallet(tenant_id, agent_id)?;
        let Some(advance) = wallet.advance_for(order_id) else {
            return Ok(events);
        };

        let reason = format!("order cancelled: {reason}");
        match self.reverse(tenant_id, agent_id, advance.transaction_id, reason) {
            Ok(()) => Ok(events),
            Err(err) => {
                error!(
                    agent_id = %agent_id,
                    transaction_id = %advance.transaction_id,
                    error = %err,
                    "cash advance not reversed after cancellation"
                );
                Err(FulfillmentError::CompensationFailed {
                    operation: "cancel order",
                    compensation: err,
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    /// Run `command` against the current order without committing it.
    fn preflight(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        command: &OrderCommand,
    ) -> Result<Order, FulfillmentError> {
        let order = self.load_order(tenant_id, order_id)?;
        order.handle(command).map_err(DispatchError::from)?;
        Ok(order)
    }

    /// Post the opposite of `transaction_id` after `cause` failed.
    fn compensate(
        &self,
        operation: &'static str,
        tenant_id: TenantId,
        agent_id: UserId,
        transaction_id: Uuid,
        cause: DispatchError,
    ) -> FulfillmentError {
        warn!(operation, error = %cause, "order update failed, reversing wallet entry");
        let reason = format!("{operation} failed: {cause}");
        match self.reverse(tenant_id, agent_id, transaction_id, reason) {
            Ok(()) => FulfillmentError::Dispatch(cause),
            Err(err) => {
                error!(
                    operation,
                    agent_id = %agent_id,
                    transaction_id = %transaction_id,
                    error = %err,
                    "compensating reversal failed"
                );
                FulfillmentError::CompensationFailed {
                    operation,
                    compensation: err,
                }
            }
        }
    }

    /// Reverse `transaction_id`. A reversal that loses to another writer
    /// reversing the same entry counts as done.
    fn reverse(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
        transaction_id: Uuid,
        reason: String,
    ) -> Result<(), DispatchError> {
        let reversal = WalletCommand::Reverse(ReverseTransaction {
            tenant_id,
            transaction_id: Uuid::now_v7(),
            original_transaction_id: transaction_id,
            reason,
            occurred_at: Utc::now(),
        });
        match self.dispatch_wallet(tenant_id, agent_id, reversal) {
            Ok(_) => Ok(()),
            Err(err) => {
                let reversed = self
                    .load_wallet(tenant_id, agent_id)
                    .is_ok_and(|w| w.is_reversed(transaction_id));
                if reversed {
                    info!(transaction_id = %transaction_id, "entry already reversed");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn load_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order, DispatchError> {
        self.dispatcher
            .load(tenant_id, order_id.0, |_, id| Order::empty(OrderId::new(id)))
    }

    fn load_profile(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
    ) -> Result<AgentProfile, DispatchError> {
        self.dispatcher.load(tenant_id, ProfileId::for_agent(agent_id).0, |_, id| {
            AgentProfile::empty(ProfileId(id))
        })
    }

    fn load_wallet(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
    ) -> Result<AgentWallet, DispatchError> {
        self.dispatcher.load(tenant_id, WalletId::for_agent(agent_id).0, |_, id| {
            AgentWallet::empty(WalletId(id))
        })
    }

    fn dispatch_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        committed(self.dispatcher.dispatch(
            tenant_id,
            order_id.0,
            Order::AGGREGATE_TYPE,
            command,
            |_, id| Order::empty(OrderId::new(id)),
        ))
    }

    fn dispatch_wallet(
        &self,
        tenant_id: TenantId,
        agent_id: UserId,
        command: WalletCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        committed(self.dispatcher.dispatch(
            tenant_id,
            WalletId::for_agent(agent_id).0,
            AgentWallet::AGGREGATE_TYPE,
            command,
            |_, id| AgentWallet::empty(WalletId(id)),
        ))
    }
}

/// Events that reached the store stay committed even if the bus dropped them,
/// so a publish failure must not trigger compensation.
fn committed(
    result: Result<Vec<StoredEvent>, DispatchError>,
) -> Result<Vec<StoredEvent>, DispatchError> {
    match result {
        Err(DispatchError::Publish { message, committed }) => {
            warn!(
                error = %message,
                events = committed.len(),
                "committed events were not published"
            );
            Ok(committed)
        }
        other => other,
    }
}
