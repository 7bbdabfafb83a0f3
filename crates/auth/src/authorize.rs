use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check that `principal` holds `required` in its active tenant.
///
/// Ownership rules ("only the assigned agent", "only the store owner") are
/// applied by callers on top of this.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, TenantMembership};
    use quickdrop_core::{TenantId, UserId};

    fn principal(perms: Vec<Permission>) -> Principal {
        let tenant_id = TenantId::new();
        Principal {
            user_id: UserId::new(),
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                roles: vec![Role::CUSTOMER],
                permissions: perms,
            },
        }
    }

    #[test]
    fn explicit_permission_grants() {
        let p = principal(vec![Permission::ORDERS_PLACE]);
        assert!(authorize(&p, &Permission::ORDERS_PLACE).is_ok());
        assert_eq!(
            authorize(&p, &Permission::ORDERS_ADMIN),
            Err(AuthzError::Forbidden("orders.admin".into()))
        );
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(vec![Permission::WILDCARD]);
        assert!(authorize(&p, &Permission::WALLETS_ADMIN).is_ok());
    }

    #[test]
    fn foreign_membership_is_rejected() {
        let mut p = principal(vec![Permission::WILDCARD]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(authorize(&p, &Permission::CATALOG_READ), Err(AuthzError::TenantMismatch));
    }
}
