//! User directory per tenant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use quickdrop_auth::{Permission, Role, User, UserEvent, UserStatus, permissions_for_roles};
use quickdrop_core::{TenantId, UserId};
use quickdrop_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, ensure_tenant, next_event};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub roles: Vec<String>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserReadModel {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn effective_permissions(&self) -> Vec<Permission> {
        let roles: Vec<Role> = self.roles.iter().map(|r| Role::new(r.clone())).collect();
        permissions_for_roles(&roles)
    }
}

pub struct UsersProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(tenant_id, user_id)
    }

    pub fn list(&self, tenant_id: TenantId, role: Option<&Role>) -> Vec<UserReadModel> {
        let mut users: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|u| role.is_none_or(|r| u.has_role(r)))
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Case-insensitive email lookup (linear scan).
    pub fn get_by_email(&self, tenant_id: TenantId, email: &str) -> Option<UserReadModel> {
        let normalized = email.trim().to_lowercase();
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|u| u.email == normalized)
    }

    fn update(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut UserReadModel),
    ) {
        if let Some(mut rm) = self.store.get(tenant_id, &user_id) {
            f(&mut rm);
            rm.updated_at = at;
            self.store.upsert(tenant_id, user_id, rm);
        }
    }
}

impl<S> Projection for UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    fn aggregate_type(&self) -> &'static str {
        User::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<UserEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        match ev {
            UserEvent::Created(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        email: e.email.trim().to_lowercase(),
                        display_name: e.display_name,
                        phone: e.phone,
                        roles: e.roles.iter().map(|r| r.as_str().to_string()).collect(),
                        status: UserStatus::Active,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            UserEvent::RoleAssigned(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.user_id, e.occurred_at, |rm| {
                    let role = e.role.as_str().to_string();
                    if !rm.roles.contains(&role) {
                        rm.roles.push(role);
                    }
                });
            }
            UserEvent::RoleRevoked(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.user_id, e.occurred_at, |rm| {
                    rm.roles.retain(|r| r != e.role.as_str());
                });
            }
            UserEvent::Suspended(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.user_id, e.occurred_at, |rm| {
                    rm.status = UserStatus::Suspended;
                });
            }
            UserEvent::Activated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.user_id, e.occurred_at, |rm| {
                    rm.status = UserStatus::Active;
                });
            }
        }

        self.cursors
            .advance(tenant_id, envelope.aggregate_id(), envelope.sequence_number());
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
