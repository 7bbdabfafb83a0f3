use std::collections::HashMap;
use std::sync::RwLock;

use quickdrop_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store for tests and single-process runs.
///
/// Streams remember insertion order so `load_all` replays deterministically.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    order: Vec<StreamKey>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (tenant_id, aggregate_id, aggregate_type) = validate_batch(&events)?;
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let current = inner
            .streams
            .get(&key)
            .map(|s| Self::current_version(s))
            .unwrap_or(0);
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = inner.streams.get(&key).and_then(|s| s.first()) {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        if current == 0 {
            inner.order.push(key);
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            committed.push(StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
        }
        inner
            .streams
            .entry(key)
            .or_default()
            .extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        Ok(inner
            .order
            .iter()
            .filter(|k| k.tenant_id == tenant_id)
            .filter_map(|k| inner.streams.get(k))
            .flat_map(|s| s.iter().cloned())
            .collect())
    }

    fn tenants(&self) -> Result<Vec<TenantId>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let mut tenants: Vec<TenantId> = Vec::new();
        for key in &inner.order {
            if !tenants.contains(&key.tenant_id) {
                tenants.push(key.tenant_id);
            }
        }
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, n: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: "catalog.store".to_string(),
            event_type: "catalog.store.opened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn assigns_sequence_numbers_and_checks_versions() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();

        let first = store
            .append(vec![event(tenant, agg, 1), event(tenant, agg, 2)], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first[1].sequence_number, 2);

        let err = store
            .append(vec![event(tenant, agg, 3)], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));

        store
            .append(vec![event(tenant, agg, 3)], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(store.load_stream(tenant, agg).unwrap().len(), 3);
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        let agg = AggregateId::new();
        store
            .append(vec![event(a, agg, 1)], ExpectedVersion::Any)
            .unwrap();

        assert!(store.load_stream(b, agg).unwrap().is_empty());
        assert!(store.load_all(b).unwrap().is_empty());
        assert_eq!(store.load_all(a).unwrap().len(), 1);
    }

    #[test]
    fn mixed_tenant_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let agg = AggregateId::new();
        let err = store
            .append(
                vec![event(TenantId::new(), agg, 1), event(TenantId::new(), agg, 2)],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn load_all_keeps_stream_order() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let (x, y) = (AggregateId::new(), AggregateId::new());
        store.append(vec![event(tenant, x, 1)], ExpectedVersion::Exact(0)).unwrap();
        store.append(vec![event(tenant, y, 1)], ExpectedVersion::Exact(0)).unwrap();
        store.append(vec![event(tenant, x, 2)], ExpectedVersion::Exact(1)).unwrap();

        let all = store.load_all(tenant).unwrap();
        let x_seqs: Vec<u64> = all
            .iter()
            .filter(|e| e.aggregate_id == x)
            .map(|e| e.sequence_number)
            .collect();
        assert_eq!(x_seqs, vec![1, 2]);
        assert_eq!(all.len(), 3);
    }
}
