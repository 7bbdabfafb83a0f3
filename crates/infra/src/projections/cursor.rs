//! Per-stream projection checkpoints.
//!
//! A projection remembers the last `sequence_number` it applied for each
//! `(tenant, aggregate)` stream. Replays at or below the cursor are skipped,
//! which makes every projection safe under at-least-once delivery.

use std::collections::HashMap;
use std::sync::RwLock;

use quickdrop_core::{AggregateId, TenantId};

use super::ProjectionError;

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    /// Whether `seq` is the next event to apply for the stream.
    ///
    /// Returns `Ok(false)` for duplicates. A gap is an error unless the
    /// projection has never seen the stream.
    pub fn should_apply(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<bool, ProjectionError> {
        let last = self.get(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut m) = self.inner.write() {
            m.insert((tenant_id, aggregate_id), seq);
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut m) = self.inner.write() {
            m.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert!(cursors.should_apply(t, a, 1).unwrap());
        cursors.advance(t, a, 1);
        assert!(!cursors.should_apply(t, a, 1).unwrap());
        assert!(cursors.should_apply(t, a, 2).unwrap());
        assert!(matches!(
            cursors.should_apply(t, a, 4),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        ));

        cursors.clear_tenant(t);
        assert_eq!(cursors.get(t, a), 0);
    }
}
