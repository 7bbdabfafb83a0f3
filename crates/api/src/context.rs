use quickdrop_auth::{Principal, Role};
use quickdrop_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated caller with the permissions its roles grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        self.principal.roles()
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.principal.has_role(role)
    }

    pub fn is_admin(&self) -> bool {
        self.principal.is_admin()
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
