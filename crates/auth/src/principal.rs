use serde::{Deserialize, Serialize};

use quickdrop_core::{TenantId, UserId};

use crate::{Permission, Role};

/// Roles and effective permissions a principal holds inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// An authenticated caller, resolved from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    pub fn has_role(&self, role: &Role) -> bool {
        self.membership.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(&Role::ADMIN)
    }

    pub fn roles(&self) -> &[Role] {
        &self.membership.roles
    }
}
