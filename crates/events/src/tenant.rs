use quickdrop_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one tenant.
///
/// Consumers that fan out to clients (the realtime feed) use this to drop
/// messages from other marketplaces before anything leaves the process.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;

    fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}
