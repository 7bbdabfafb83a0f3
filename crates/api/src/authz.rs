//! API-side authorization guard.
//!
//! Permission checks run at the route boundary, before dispatch, so domain
//! aggregates and infra stay auth-agnostic. Ownership rules (own orders,
//! owned stores, assigned jobs) are applied by the handlers on top.

use axum::response::Response;

use quickdrop_auth::{Permission, authorize};

use crate::app::errors::authz_error_to_response;
use crate::context::{PrincipalContext, TenantContext};

/// Require `permission` in the request's tenant.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), Response> {
    if principal.principal().active_tenant_id != tenant.tenant_id() {
        return Err(authz_error_to_response(
            quickdrop_auth::AuthzError::TenantMismatch,
        ));
    }
    authorize(principal.principal(), permission).map_err(authz_error_to_response)
}

/// Pass if any of `permissions` is held.
pub fn require_any(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permissions: &[Permission],
) -> Result<(), Response> {
    let mut last = None;
    for permission in permissions {
        match require(tenant, principal, permission) {
            Ok(()) => return Ok(()),
            Err(resp) => last = Some(resp),
        }
    }
    Err(last.unwrap_or_else(|| {
        authz_error_to_response(quickdrop_auth::AuthzError::Forbidden(String::new()))
    }))
}
