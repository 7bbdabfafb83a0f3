//! Agent directory and wallet views (balances plus the transaction log).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use quickdrop_agents::{
    AgentProfile, AgentProfileEvent, AgentStatus, AgentWallet, WalletEvent, WalletStatus,
    WalletTransaction,
};
use quickdrop_core::{Money, TenantId, UserId};
use quickdrop_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, ensure_tenant, next_event};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentReadModel {
    pub agent_id: UserId,
    pub full_name: String,
    pub phone: String,
    pub vehicle: Option<String>,
    pub status: AgentStatus,
    pub online: bool,
    pub suspension_reason: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AgentsProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> AgentsProjection<S>
where
    S: TenantStore<UserId, AgentReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, agent_id: &UserId) -> Option<AgentReadModel> {
        self.store.get(tenant_id, agent_id)
    }

    pub fn list(&self, tenant_id: TenantId, status: Option<AgentStatus>) -> Vec<AgentReadModel> {
        let mut agents: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .collect();
        agents.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        agents
    }
}

impl<S> Projection for AgentsProjection<S>
where
    S: TenantStore<UserId, AgentReadModel>,
{
    fn aggregate_type(&self) -> &'static str {
        AgentProfile::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<AgentProfileEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        let (event_tenant, agent_id) = match &ev {
            AgentProfileEvent::Registered(e) => (e.tenant_id, e.agent_id),
            AgentProfileEvent::Approved(e) => (e.tenant_id, e.agent_id),
            AgentProfileEvent::Suspended(e) => (e.tenant_id, e.agent_id),
            AgentProfileEvent::AvailabilityChanged(e) => (e.tenant_id, e.agent_id),
        };
        ensure_tenant(envelope, event_tenant)?;

        if let AgentProfileEvent::Registered(e) = ev {
            self.store.upsert(
                tenant_id,
                agent_id,
                AgentReadModel {
                    agent_id,
                    full_name: e.full_name,
                    phone: e.phone,
                    vehicle: e.vehicle,
                    status: AgentStatus::PendingApproval,
                    online: false,
                    suspension_reason: None,
                    registered_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            );
        } else if let Some(mut rm) = self.store.get(tenant_id, &agent_id) {
            match ev {
                AgentProfileEvent::Approved(e) => {
                    rm.status = AgentStatus::Approved;
                    rm.suspension_reason = None;
                    rm.updated_at = e.occurred_at;
                }
                AgentProfileEvent::Suspended(e) => {
                    rm.status = AgentStatus::Suspended;
                    rm.online = false;
                    rm.suspension_reason = Some(e.reason);
                    rm.updated_at = e.occurred_at;
                }
                AgentProfileEvent::AvailabilityChanged(e) => {
                    rm.online = e.online;
                    rm.updated_at = e.occurred_at;
                }
                AgentProfileEvent::Registered(_) => {}
            }
            self.store.upsert(tenant_id, agent_id, rm);
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

// ─────────────────────────────────────────────────────────────────────────────
// Wallets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletReadModel {
    pub agent_id: UserId,
    pub company_cash_balance: Money,
    pub limit: Money,
    pub status: WalletStatus,
    pub freeze_reason: Option<String>,
    pub transaction_count: u64,
    pub updated_at: DateTime<Utc>,
}

/// A transaction row tagged with its wallet owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRow {
    pub agent_id: UserId,
    #[serde(flatten)]
    pub transaction: WalletTransaction,
}

#[derive(Debug)]
pub struct WalletsProjection<S, T> {
    wallets: S,
    transactions: T,
    cursors: StreamCursors,
}

impl<S, T> WalletsProjection<S, T>
where
    S: TenantStore<UserId, WalletReadModel>,
    T: TenantStore<Uuid, TransactionRow>,
{
    pub fn new(wallets: S, transactions: T) -> Self {
        Self {
            wallets,
            transactions,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, agent_id: &UserId) -> Option<WalletReadModel> {
        self.wallets.get(tenant_id, agent_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<WalletReadModel> {
        let mut wallets = self.wallets.list(tenant_id);
        wallets.sort_by(|a, b| b.company_cash_balance.cmp(&a.company_cash_balance));
        wallets
    }

    /// An agent's ledger, newest first.
    pub fn transactions_for(&self, tenant_id: TenantId, agent_id: UserId) -> Vec<TransactionRow> {
        let mut rows: Vec<_> = self
            .transactions
            .list(tenant_id)
            .into_iter()
            .filter(|r| r.agent_id == agent_id)
            .collect();
        rows.sort_by(|a, b| {
            b.transaction
                .occurred_at
                .cmp(&a.transaction.occurred_at)
                .then(b.transaction.transaction_id.cmp(&a.transaction.transaction_id))
        });
        rows
    }

    /// Total company cash currently held by all agents.
    pub fn outstanding_cash(&self, tenant_id: TenantId) -> Money {
        self.wallets
            .list(tenant_id)
            .iter()
            .map(|w| &w.company_cash_balance)
            .sum()
    }
}

impl<S, T> Projection for WalletsProjection<S, T>
where
    S: TenantStore<UserId, WalletReadModel>,
    T: TenantStore<Uuid, TransactionRow>,
{
    fn aggregate_type(&self) -> &'static str {
        AgentWallet::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<WalletEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        match ev {
            WalletEvent::Opened(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.wallets.upsert(
                    tenant_id,
                    e.agent_id,
                    WalletReadModel {
                        agent_id: e.agent_id,
                        company_cash_balance: Money::ZERO,
                        limit: e.limit,
                        status: WalletStatus::Active,
                        freeze_reason: None,
                        transaction_count: 0,
                        updated_at: e.occurred_at,
                    },
                );
            }
            WalletEvent::TransactionRecorded(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.wallets.get(tenant_id, &e.agent_id) {
                    rm.company_cash_balance = e.transaction.balance_after;
                    rm.transaction_count += 1;
                    rm.updated_at = e.transaction.occurred_at;
                    self.wallets.upsert(tenant_id, e.agent_id, rm);
                }
                self.transactions.upsert(
                    tenant_id,
                    e.transaction.transaction_id,
                    TransactionRow {
                        agent_id: e.agent_id,
                        transaction: e.transaction,
                    },
                );
            }
            WalletEvent::LimitChanged(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.wallets.get(tenant_id, &e.agent_id) {
                    rm.limit = e.limit;
                    rm.updated_at = e.occurred_at;
                    self.wallets.upsert(tenant_id, e.agent_id, rm);
                }
            }
            WalletEvent::Frozen(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.wallets.get(tenant_id, &e.agent_id) {
                    rm.status = WalletStatus::Frozen;
                    rm.freeze_reason = Some(e.reason);
                    rm.updated_at = e.occurred_at;
                    self.wallets.upsert(tenant_id, e.agent_id, rm);
                }
            }
            WalletEvent::Unfrozen(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.wallets.get(tenant_id, &e.agent_id) {
                    rm.status = WalletStatus::Active;
                    rm.freeze_reason = None;
                    rm.updated_at = e.occurred_at;
                    self.wallets.upsert(tenant_id, e.agent_id, rm);
                }
            }
        }

        self.cursors
            .advance(tenant_id, envelope.aggregate_id(), envelope.sequence_number());
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.wallets.clear_tenant(tenant_id);
        self.transactions.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
