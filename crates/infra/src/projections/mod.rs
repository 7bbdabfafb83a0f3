//! Read-model projections.
//!
//! Projections consume committed envelopes and maintain tenant-isolated,
//! query-shaped views. They are idempotent (per-stream cursors) and can be
//! rebuilt from the event store at any time.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use quickdrop_core::TenantId;
use quickdrop_events::EventEnvelope;

use crate::event_store::StoredEvent;

pub mod agents;
pub mod catalog;
pub mod cursor;
pub mod orders;
pub mod users;

pub use agents::{
    AgentReadModel, AgentsProjection, TransactionRow, WalletReadModel, WalletsProjection,
};
pub use catalog::{
    CategoriesProjection, CategoryReadModel, ProductFilter, ProductReadModel, ProductsProjection,
    StoreReadModel, StoresProjection,
};
pub use cursor::StreamCursors;
pub use orders::{OrderReadModel, OrdersProjection, StatusChange};
pub use users::{UserReadModel, UsersProjection};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// A read model fed from one aggregate type.
pub trait Projection: Send + Sync {
    fn aggregate_type(&self) -> &'static str;

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop all rows and cursors of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

/// Cursor check plus payload decode shared by every projection.
///
/// Returns `Ok(None)` when the envelope was already applied.
pub(crate) fn next_event<E: DeserializeOwned>(
    cursors: &StreamCursors,
    envelope: &EventEnvelope<JsonValue>,
) -> Result<Option<E>, ProjectionError> {
    if !cursors.should_apply(
        envelope.tenant_id(),
        envelope.aggregate_id(),
        envelope.sequence_number(),
    )? {
        return Ok(None);
    }
    serde_json::from_value(envelope.payload().clone())
        .map(Some)
        .map_err(|e| ProjectionError::Deserialize(e.to_string()))
}

pub(crate) fn ensure_tenant(
    envelope: &EventEnvelope<JsonValue>,
    event_tenant: TenantId,
) -> Result<(), ProjectionError> {
    if envelope.tenant_id() != event_tenant {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    Ok(())
}

/// Route one envelope to every projection interested in its aggregate type.
pub fn apply_all(
    projections: &[&dyn Projection],
    envelope: &EventEnvelope<JsonValue>,
) -> Result<(), ProjectionError> {
    for p in projections
        .iter()
        .filter(|p| p.aggregate_type() == envelope.aggregate_type())
    {
        p.apply_envelope(envelope)?;
    }
    Ok(())
}

/// Clear a tenant and replay its full history through the projections.
pub fn rebuild_tenant(
    projections: &[&dyn Projection],
    tenant_id: TenantId,
    history: &[StoredEvent],
) -> Result<usize, ProjectionError> {
    for p in projections {
        p.clear_tenant(tenant_id);
    }
    let mut applied = 0;
    for stored in history.iter().filter(|e| e.tenant_id == tenant_id) {
        apply_all(projections, &stored.to_envelope())?;
        applied += 1;
    }
    Ok(applied)
}
