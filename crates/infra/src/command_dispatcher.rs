//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (tenant-scoped) and validate it
//!   ↓
//! 2. Rehydrate the aggregate from history
//!   ↓
//! 3. Handle the command (pure, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! Publication happens only after a successful append. If publishing fails the
//! events are already durable and the caller sees `DispatchError::Publish`,
//! which still carries the committed events.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use quickdrop_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use quickdrop_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version or a business-level conflict (job already taken).
    #[error("conflict: {0}")]
    Concurrency(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// Historical payload did not decode into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append; `committed` is durable.
    #[error("event publication failed: {message}")]
    Publish {
        message: String,
        committed: Vec<StoredEvent>,
    },
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine, generic over the store and bus so tests
/// run against the in-memory pair and production against Postgres.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate and return the committed events.
    ///
    /// A command that decides no events is a successful no-op and returns an
    /// empty vector without touching the store.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: quickdrop_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_type = aggregate_type.into();
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, Some(aggregate_type.as_str()), &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        debug!(
            tenant_id = %tenant_id,
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            events = committed.len(),
            "events committed"
        );

        let failed = committed
            .iter()
            .find_map(|stored| self.bus.publish(stored.to_envelope()).err());
        if let Some(e) = failed {
            return Err(DispatchError::Publish {
                message: format!("{e:?}"),
                committed,
            });
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, None, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// A stream holds one tenant's events for one aggregate of one type. Without an
/// expected type the first event's type is the reference.
fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: Option<&str>,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A misbehaving backend must never leak another tenant's events.
    let expected_type = aggregate_type.or(stream.first().map(|e| e.aggregate_type.as_str()));
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if let Some(expected) = expected_type {
            if e.aggregate_type != expected {
                return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                    "stream {aggregate_id} holds `{}` at index {idx}, expected `{expected}`",
                    e.aggregate_type
                ))));
            }
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = stored
            .decode()
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
