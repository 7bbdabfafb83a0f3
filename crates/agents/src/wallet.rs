//! Agent wallet: the company cash an agent is holding, as an append-only ledger.
//!
//! Every money movement is a [`WalletTransaction`] carrying the balance before
//! and after it, so the current balance is always the sum of the ledger and
//! any row can be audited on its own.
//!
//! | kind        | sign | when                                              |
//! |-------------|------|---------------------------------------------------|
//! | advance     | +    | admin approves cash for a CPO order               |
//! | purchase    | -    | agent pays the store with company cash            |
//! | collection  | +    | agent collects the order total from the customer  |
//! | remittance  | -    | agent hands cash back to the company              |
//! | adjustment  | +/-  | manual correction by an admin                     |
//! | reversal    | -x   | undoes one earlier transaction, at most once      |
//!
//! Only advances are checked against the wallet limit and only advances are
//! blocked on a frozen wallet; the balance itself can never go below zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quickdrop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId};
use quickdrop_events::Event;
use quickdrop_orders::OrderId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub AggregateId);

impl WalletId {
    /// Each agent has exactly one wallet, on a stream derived from their user id.
    pub fn for_agent(agent_id: UserId) -> Self {
        Self(AggregateId::for_user(AgentWallet::AGGREGATE_TYPE, agent_id))
    }
}

impl core::fmt::Display for WalletId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Advance,
    Purchase,
    Collection,
    Remittance,
    Adjustment,
    Reversal,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Advance => "advance",
            TransactionKind::Purchase => "purchase",
            TransactionKind::Collection => "collection",
            TransactionKind::Remittance => "remittance",
            TransactionKind::Adjustment => "adjustment",
            TransactionKind::Reversal => "reversal",
        }
    }
}

/// One ledger row. `amount` is signed: positive rows increase the cash held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_before: Money,
    pub balance_after: Money,
    pub order_id: Option<OrderId>,
    pub reverses: Option<Uuid>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentWallet {
    id: WalletId,
    tenant_id: Option<TenantId>,
    agent_id: Option<UserId>,
    balance: Money,
    limit: Money,
    status: WalletStatus,
    transactions: Vec<WalletTransaction>,
    version: u64,
    created: bool,
}

impl AgentWallet {
    /// Stream type recorded with every event of this aggregate.
    pub const AGGREGATE_TYPE: &'static str = "agents.wallet";

    pub fn empty(id: WalletId) -> Self {
        Self {
            id,
            tenant_id: None,
            agent_id: None,
            balance: Money::ZERO,
            limit: Money::ZERO,
            status: WalletStatus::Active,
            transactions: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WalletId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn agent_id(&self) -> Option<UserId> {
        self.agent_id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn limit(&self) -> Money {
        self.limit
    }

    pub fn status(&self) -> WalletStatus {
        self.status
    }

    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    /// Cash that can still be advanced before hitting the limit.
    pub fn available_credit(&self) -> Money {
        self.limit.checked_sub(self.balance).unwrap_or(Money::ZERO)
    }

    pub fn can_receive_advances(&self) -> bool {
        self.created && self.status == WalletStatus::Active
    }

    pub fn transaction(&self, transaction_id: Uuid) -> Option<&WalletTransaction> {
        self.transactions
            .iter()
            .find(|t| t.transaction_id == transaction_id)
    }

    pub fn is_reversed(&self, transaction_id: Uuid) -> bool {
        self.transactions
            .iter()
            .any(|t| t.reverses == Some(transaction_id))
    }

    /// The live (not reversed) advance issued for an order, if any.
    pub fn advance_for(&self, order_id: OrderId) -> Option<&WalletTransaction> {
        self.transactions.iter().find(|t| {
            t.kind == TransactionKind::Advance
                && t.order_id == Some(order_id)
                && !self.is_reversed(t.transaction_id)
        })
    }
}

impl AggregateRoot for AgentWallet {
    type Id = WalletId;

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
pub struct OpenWallet {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub limit: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueAdvance {
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub order_id: OrderId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub order_id: OrderId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCollection {
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub order_id: OrderId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRemittance {
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustBalance {
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseTransaction {
    pub tenant_id: TenantId,
    pub transaction_id: Uuid,
    pub original_transaction_id: Uuid,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLimit {
    pub tenant_id: TenantId,
    pub limit: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeWallet {
    pub tenant_id: TenantId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfreezeWallet {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletCommand {
    Open(OpenWallet),
    IssueAdvance(IssueAdvance),
    RecordPurchase(RecordPurchase),
    RecordCollection(RecordCollection),
    RecordRemittance(RecordRemittance),
    Adjust(AdjustBalance),
    Reverse(ReverseTransaction),
    SetLimit(SetLimit),
    Freeze(FreezeWallet),
    Unfreeze(UnfreezeWallet),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOpened {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub limit: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub transaction: WalletTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitChanged {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub previous: Money,
    pub limit: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletFrozen {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUnfrozen {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    Opened(WalletOpened),
    TransactionRecorded(TransactionRecorded),
    LimitChanged(LimitChanged),
    Frozen(WalletFrozen),
    Unfrozen(WalletUnfrozen),
}

impl Event for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::Opened(_) => "agents.wallet.opened",
            WalletEvent::TransactionRecorded(_) => "agents.wallet.transaction_recorded",
            WalletEvent::LimitChanged(_) => "agents.wallet.limit_changed",
            WalletEvent::Frozen(_) => "agents.wallet.frozen",
            WalletEvent::Unfrozen(_) => "agents.wallet.unfrozen",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WalletEvent::Opened(e) => e.occurred_at,
            WalletEvent::TransactionRecorded(e) => e.transaction.occurred_at,
            WalletEvent::LimitChanged(e) => e.occurred_at,
            WalletEvent::Frozen(e) => e.occurred_at,
            WalletEvent::Unfrozen(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for AgentWallet {
    type Command = WalletCommand;
    type Event = WalletEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WalletEvent::Opened(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.agent_id = Some(e.agent_id);
                self.limit = e.limit;
                self.status = WalletStatus::Active;
                self.created = true;
            }
            WalletEvent::TransactionRecorded(e) => {
                self.balance = e.transaction.balance_after;
                self.transactions.push(e.transaction.clone());
            }
            WalletEvent::LimitChanged(e) => self.limit = e.limit,
            WalletEvent::Frozen(_) => self.status = WalletStatus::Frozen,
            WalletEvent::Unfrozen(_) => self.status = WalletStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WalletCommand::Open(cmd) => self.handle_open(cmd),
            WalletCommand::IssueAdvance(cmd) => self.handle_advance(cmd),
            WalletCommand::RecordPurchase(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if self.transaction(cmd.transaction_id).is_some() {
                    return Ok(vec![]);
                }
                let amount = positive(cmd.amount)?;
                let event = self
                    .post(
                        cmd.tenant_id,
                        cmd.transaction_id,
                        TransactionKind::Purchase,
                        -amount,
                        cmd.occurred_at,
                    )
                    .for_order(cmd.order_id)
                    .record(self)?;
                Ok(vec![event])
            }
            WalletCommand::RecordCollection(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if self.transaction(cmd.transaction_id).is_some() {
                    return Ok(vec![]);
                }
                let amount = positive(cmd.amount)?;
                let event = self
                    .post(
                        cmd.tenant_id,
                        cmd.transaction_id,
                        TransactionKind::Collection,
                        amount,
                        cmd.occurred_at,
                    )
                    .for_order(cmd.order_id)
                    .record(self)?;
                Ok(vec![event])
            }
            WalletCommand::RecordRemittance(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if self.transaction(cmd.transaction_id).is_some() {
                    return Ok(vec![]);
                }
                let amount = positive(cmd.amount)?;
                let event = self
                    .post(
                        cmd.tenant_id,
                        cmd.transaction_id,
                        TransactionKind::Remittance,
                        -amount,
                        cmd.occurred_at,
                    )
                    .with_note(cmd.note.clone())
                    .record(self)?;
                Ok(vec![event])
            }
            WalletCommand::Adjust(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if self.transaction(cmd.transaction_id).is_some() {
                    return Ok(vec![]);
                }
                if cmd.amount == 0 {
                    return Err(DomainError::validation("adjustment cannot be zero"));
                }
                let reason = required_reason(&cmd.reason)?;
                let event = self
                    .post(
                        cmd.tenant_id,
                        cmd.transaction_id,
                        TransactionKind::Adjustment,
                        cmd.amount,
                        cmd.occurred_at,
                    )
                    .with_note(Some(reason))
                    .record(self)?;
                Ok(vec![event])
            }
            WalletCommand::Reverse(cmd) => self.handle_reverse(cmd),
            WalletCommand::SetLimit(cmd) => {
                let agent_id = self.ensure_existing(cmd.tenant_id)?;
                if cmd.limit == self.limit {
                    return Ok(vec![]);
                }
                Ok(vec![WalletEvent::LimitChanged(LimitChanged {
                    tenant_id: cmd.tenant_id,
                    agent_id,
                    previous: self.limit,
                    limit: cmd.limit,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WalletCommand::Freeze(cmd) => {
                let agent_id = self.ensure_existing(cmd.tenant_id)?;
                if self.status == WalletStatus::Frozen {
                    return Err(DomainError::invariant("wallet already frozen"));
                }
                Ok(vec![WalletEvent::Frozen(WalletFrozen {
                    tenant_id: cmd.tenant_id,
                    agent_id,
                    reason: required_reason(&cmd.reason)?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WalletCommand::Unfreeze(cmd) => {
                let agent_id = self.ensure_existing(cmd.tenant_id)?;
                if self.status == WalletStatus::Active {
                    return Err(DomainError::invariant("wallet is not frozen"));
                }
                Ok(vec![WalletEvent::Unfrozen(WalletUnfrozen {
                    tenant_id: cmd.tenant_id,
                    agent_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AgentWallet {
    fn handle_open(&self, cmd: &OpenWallet) -> Result<Vec<WalletEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("wallet already open"));
        }
        if WalletId::for_agent(cmd.agent_id) != self.id {
            return Err(DomainError::validation("wallet id must match the agent"));
        }
        Ok(vec![WalletEvent::Opened(WalletOpened {
            tenant_id: cmd.tenant_id,
            agent_id: cmd.agent_id,
            limit: cmd.limit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &IssueAdvance) -> Result<Vec<WalletEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id)?;
        if self.transaction(cmd.transaction_id).is_some() {
            return Ok(vec![]);
        }
        if self.status == WalletStatus::Frozen {
            return Err(DomainError::invariant("wallet is frozen"));
        }
        if self.advance_for(cmd.order_id).is_some() {
            return Err(DomainError::conflict("order already has a cash advance"));
        }
        let amount = positive(cmd.amount)?;
        if self.balance.checked_add(cmd.amount)? > self.limit {
            return Err(DomainError::invariant(format!(
                "advance of {} would exceed the cash limit of {}",
                cmd.amount, self.limit
            )));
        }
        let event = self
            .post(
                cmd.tenant_id,
                cmd.transaction_id,
                TransactionKind::Advance,
                amount,
                cmd.occurred_at,
            )
            .for_order(cmd.order_id)
            .record(self)?;
        Ok(vec![event])
    }

    fn handle_reverse(&self, cmd: &ReverseTransaction) -> Result<Vec<WalletEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id)?;
        if self.transaction(cmd.transaction_id).is_some() {
            return Ok(vec![]);
        }
        let original = self
            .transaction(cmd.original_transaction_id)
            .ok_or_else(DomainError::not_found)?;
        if original.kind == TransactionKind::Reversal {
            return Err(DomainError::invariant("a reversal cannot be reversed"));
        }
        if self.is_reversed(original.transaction_id) {
            return Err(DomainError::conflict("transaction already reversed"));
        }
        let reason = required_reason(&cmd.reason)?;
        let mut posting = self
            .post(
                cmd.tenant_id,
                cmd.transaction_id,
                TransactionKind::Reversal,
                -original.amount,
                cmd.occurred_at,
            )
            .with_note(Some(reason));
        posting.order_id = original.order_id;
        posting.reverses = Some(original.transaction_id);
        Ok(vec![posting.record(self)?])
    }

    fn post(
        &self,
        tenant_id: TenantId,
        transaction_id: Uuid,
        kind: TransactionKind,
        amount: i64,
        occurred_at: DateTime<Utc>,
    ) -> Posting {
        Posting {
            tenant_id,
            transaction_id,
            kind,
            amount,
            order_id: None,
            reverses: None,
            note: None,
            occurred_at,
        }
    }

    fn ensure_existing(&self, tenant_id: TenantId) -> Result<UserId, DomainError> {
        let agent_id = match (self.created, self.agent_id) {
            (true, Some(agent_id)) => agent_id,
            _ => return Err(DomainError::not_found()),
        };
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(agent_id)
    }
}

/// A ledger row under construction; `record` checks it against the balance.
struct Posting {
    tenant_id: TenantId,
    transaction_id: Uuid,
    kind: TransactionKind,
    amount: i64,
    order_id: Option<OrderId>,
    reverses: Option<Uuid>,
    note: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl Posting {
    fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }

    fn record(self, wallet: &AgentWallet) -> Result<WalletEvent, DomainError> {
        let agent_id = wallet.ensure_existing(self.tenant_id)?;
        let before = wallet.balance;
        let after = i128::from(before.minor()) + i128::from(self.amount);
        if after < 0 {
            return Err(DomainError::invariant(format!(
                "{} of {} exceeds the cash held ({before})",
                self.kind.as_str(),
                Money::from_minor(self.amount.unsigned_abs()),
            )));
        }
        let after = u64::try_from(after)
            .map(Money::from_minor)
            .map_err(|_| DomainError::validation("wallet balance overflow"))?;

        Ok(WalletEvent::TransactionRecorded(TransactionRecorded {
            tenant_id: self.tenant_id,
            agent_id,
            transaction: WalletTransaction {
                transaction_id: self.transaction_id,
                kind: self.kind,
                amount: self.amount,
                balance_before: before,
                balance_after: after,
                order_id: self.order_id,
                reverses: self.reverses,
                note: self.note,
                occurred_at: self.occurred_at,
            },
        }))
    }
}

fn positive(amount: Money) -> Result<i64, DomainError> {
    if amount.is_zero() {
        return Err(DomainError::validation("amount must be positive"));
    }
    i64::try_from(amount.minor()).map_err(|_| DomainError::validation("amount too large"))
}

fn required_reason(reason: &str) -> Result<String, DomainError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(DomainError::validation("a reason is required"));
    }
    Ok(reason.to_string())
}
