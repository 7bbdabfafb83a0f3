use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use quickdrop_core::{AggregateId, ExpectedVersion, TenantId};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`], which
/// serializes the payload and captures `event_type`, `event_version` and
/// `occurred_at` so the event can be decoded again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event with its position in the stream.
///
/// Sequence numbers start at 1, are per `(tenant_id, aggregate_id)` stream and
/// have no gaps. They double as the stream version for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped event envelope for publication.
    pub fn to_envelope(&self) -> quickdrop_events::EventEnvelope<JsonValue> {
        quickdrop_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }

    /// Decode the payload back into a typed domain event.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Event store failure. These are infrastructure errors; business rule
/// failures are `DomainError`s and never reach the store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Append-only, tenant-scoped event store.
///
/// Streams are keyed by `(tenant_id, aggregate_id)`. Implementations must:
/// - reject batches that mix tenants, aggregates or aggregate types
/// - check `expected_version` against the current stream version
/// - assign sequence numbers `current + 1 ..` without gaps
/// - persist a batch atomically
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load one stream in sequence order. Unknown streams are empty.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every event of a tenant, ordered per stream. Used to rebuild projections.
    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Tenants with at least one stream.
    fn tenants(&self) -> Result<Vec<TenantId>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all(tenant_id)
    }

    fn tenants(&self) -> Result<Vec<TenantId>, EventStoreError> {
        (**self).tenants()
    }
}

impl UncommittedEvent {
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: quickdrop_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Check that a batch targets exactly one tenant, aggregate and aggregate type.
pub(crate) fn validate_batch(
    events: &[UncommittedEvent],
) -> Result<(TenantId, AggregateId, String), EventStoreError> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend("empty batch".to_string()));
    };
    for (idx, e) in events.iter().enumerate() {
        if e.tenant_id != first.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "batch contains multiple tenant_ids (index {idx})"
            )));
        }
        if e.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }
    Ok((first.tenant_id, first.aggregate_id, first.aggregate_type.clone()))
}
