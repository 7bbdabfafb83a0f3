//! Role to permission mapping for the marketplace.

use crate::{JwtClaims, Permission, Principal, Role, TenantMembership};

/// Permissions granted by a single role. Unknown roles grant nothing.
pub fn default_role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::WILDCARD],
        "store" => vec![
            Permission::CATALOG_READ,
            Permission::CATALOG_STORES_MANAGE,
            Permission::CATALOG_PRODUCTS_MANAGE,
            Permission::STORAGE_UPLOAD,
            Permission::ORDERS_STORE_READ,
            Permission::ORDERS_STORE_REJECT,
        ],
        "agent" => vec![
            Permission::CATALOG_READ,
            Permission::AGENTS_PROFILE_MANAGE,
            Permission::ORDERS_JOBS_READ,
            Permission::ORDERS_JOBS_ACCEPT,
            Permission::ORDERS_FULFILL,
            Permission::STORAGE_UPLOAD,
            Permission::WALLETS_OWN_READ,
        ],
        "customer" => vec![
            Permission::CATALOG_READ,
            Permission::ORDERS_PLACE,
            Permission::ORDERS_OWN_READ,
            Permission::ORDERS_OWN_CANCEL,
        ],
        _ => Vec::new(),
    }
}

/// Union of the permissions of every role, without duplicates.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for perm in roles.iter().flat_map(default_role_permissions) {
        if !out.contains(&perm) {
            out.push(perm);
        }
    }
    out
}

/// Build the principal for a verified token.
pub fn principal_from_claims(claims: &JwtClaims) -> Principal {
    Principal {
        user_id: claims.sub,
        active_tenant_id: claims.tenant_id,
        membership: TenantMembership {
            tenant_id: claims.tenant_id,
            roles: claims.roles.clone(),
            permissions: permissions_for_roles(&claims.roles),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorize;
    use quickdrop_core::{TenantId, UserId};

    fn principal(roles: Vec<Role>) -> Principal {
        principal_from_claims(&JwtClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            roles,
            iat: 0,
            exp: 1,
        })
    }

    #[test]
    fn customer_cannot_fulfill_or_manage_catalog() {
        let p = principal(vec![Role::CUSTOMER]);
        assert!(authorize(&p, &Permission::ORDERS_PLACE).is_ok());
        assert!(authorize(&p, &Permission::ORDERS_FULFILL).is_err());
        assert!(authorize(&p, &Permission::CATALOG_PRODUCTS_MANAGE).is_err());
    }

    #[test]
    fn agent_cannot_approve_cash() {
        let p = principal(vec![Role::AGENT]);
        assert!(authorize(&p, &Permission::ORDERS_JOBS_ACCEPT).is_ok());
        assert!(authorize(&p, &Permission::ORDERS_ADMIN).is_err());
        assert!(authorize(&p, &Permission::WALLETS_ADMIN).is_err());
    }

    #[test]
    fn multiple_roles_union_without_duplicates() {
        let perms = permissions_for_roles(&[Role::STORE, Role::AGENT]);
        let reads = perms.iter().filter(|p| **p == Permission::CATALOG_READ).count();
        assert_eq!(reads, 1);
        assert!(perms.contains(&Permission::ORDERS_FULFILL));
        assert!(perms.contains(&Permission::CATALOG_PRODUCTS_MANAGE));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(default_role_permissions(&Role::new("viewer")).is_empty());
    }
}
