//! Marketplace user accounts (event-sourced).
//!
//! A user belongs to one tenant and holds one or more of the four marketplace
//! roles. Admins manage accounts; suspended users keep their history but cannot
//! be granted new roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use quickdrop_events::Event;

use crate::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => f.write_str("active"),
            UserStatus::Suspended => f.write_str("suspended"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub version: u64,
    pub created: bool,
}

impl User {
    /// Stream type recorded with every event of this aggregate.
    pub const AGGREGATE_TYPE: &'static str = "auth.user";

    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            tenant_id: None,
            email: String::new(),
            display_name: String::new(),
            phone: None,
            roles: Vec::new(),
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    /// Empty means `customer`.
    pub initial_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    /// Roles of the caller; only admins may hand out `admin`.
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
    Suspend(SuspendUser),
    Activate(ActivateUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRevoked {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSuspended {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleAssigned(RoleAssigned),
    RoleRevoked(RoleRevoked),
    Suspended(UserSuspended),
    Activated(UserActivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
            UserEvent::Suspended(_) => "auth.user.suspended",
            UserEvent::Activated(_) => "auth.user.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::RoleRevoked(e) => e.occurred_at,
            UserEvent::Suspended(e) => e.occurred_at,
            UserEvent::Activated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.tenant_id = Some(e.tenant_id);
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.phone = e.phone.clone();
                self.roles = e.roles.clone();
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::RoleAssigned(e) => self.roles.push(e.role.clone()),
            UserEvent::RoleRevoked(e) => self.roles.retain(|r| r != &e.role),
            UserEvent::Suspended(_) => self.status = UserStatus::Suspended,
            UserEvent::Activated(_) => self.status = UserStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            UserCommand::Suspend(cmd) => self.handle_suspend(cmd),
            UserCommand::Activate(cmd) => self.handle_activate(cmd),
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        let email = cmd.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }
        if let Some(bad) = cmd.initial_roles.iter().find(|r| !r.is_known()) {
            return Err(DomainError::validation(format!("unknown role '{bad}'")));
        }

        let mut roles: Vec<Role> = Vec::new();
        for role in &cmd.initial_roles {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        if roles.is_empty() {
            roles.push(Role::CUSTOMER);
        }

        Ok(vec![UserEvent::Created(UserCreated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email: email.to_lowercase(),
            display_name: cmd.display_name.trim().to_string(),
            phone: cmd.phone.as_ref().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            roles,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user is suspended"));
        }
        if !cmd.role.is_known() {
            return Err(DomainError::validation(format!("unknown role '{}'", cmd.role)));
        }
        if self.has_role(&cmd.role) {
            return Err(DomainError::invariant("role already assigned"));
        }
        if cmd.role == Role::ADMIN && !cmd.actor_roles.contains(&Role::ADMIN) {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![UserEvent::RoleAssigned(RoleAssigned {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if !self.has_role(&cmd.role) {
            return Err(DomainError::invariant("role not assigned"));
        }
        if self.roles.len() == 1 {
            return Err(DomainError::invariant("a user must keep at least one role"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleRevoked {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user already suspended"));
        }

        Ok(vec![UserEvent::Suspended(UserSuspended {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status == UserStatus::Active {
            return Err(DomainError::invariant("user already active"));
        }

        Ok(vec![UserEvent::Activated(UserActivated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickdrop_events::execute;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(tenant_id: TenantId, roles: Vec<Role>) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        execute(
            &mut user,
            &UserCommand::Create(CreateUser {
                tenant_id,
                user_id,
                email: " Rider@Example.com ".to_string(),
                display_name: "Rider".to_string(),
                phone: Some("  ".to_string()),
                initial_roles: roles,
                occurred_at: now(),
            }),
        )
        .unwrap();
        user
    }

    #[test]
    fn create_normalizes_and_defaults_to_customer() {
        let user = created(TenantId::new(), vec![]);
        assert_eq!(user.email, "rider@example.com");
        assert_eq!(user.roles, vec![Role::CUSTOMER]);
        assert_eq!(user.phone, None);
        assert_eq!(user.version, 1);
    }

    #[test]
    fn create_rejects_unknown_role() {
        let user_id = UserId::new();
        let user = User::empty(user_id);
        let err = user
            .handle(&UserCommand::Create(CreateUser {
                tenant_id: TenantId::new(),
                user_id,
                email: "a@b.c".to_string(),
                display_name: "A".to_string(),
                phone: None,
                initial_roles: vec![Role::new("manager")],
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn only_admins_grant_admin() {
        let tenant_id = TenantId::new();
        let user = created(tenant_id, vec![Role::AGENT]);

        let by_store = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id,
            role: Role::ADMIN,
            actor_roles: vec![Role::STORE],
            occurred_at: now(),
        });
        assert_eq!(user.handle(&by_store).unwrap_err(), DomainError::Unauthorized);

        let by_admin = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id,
            role: Role::STORE,
            actor_roles: vec![Role::ADMIN],
            occurred_at: now(),
        });
        assert_eq!(user.handle(&by_admin).unwrap().len(), 1);
    }

    #[test]
    fn last_role_cannot_be_revoked() {
        let tenant_id = TenantId::new();
        let user = created(tenant_id, vec![Role::AGENT]);
        let err = user
            .handle(&UserCommand::RevokeRole(RevokeRole {
                tenant_id,
                user_id: user.id,
                role: Role::AGENT,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("at least one role"));
    }

    #[test]
    fn suspended_user_gets_no_new_roles_until_activated() {
        let tenant_id = TenantId::new();
        let mut user = created(tenant_id, vec![Role::CUSTOMER]);
        let user_id = user.id;
        execute(
            &mut user,
            &UserCommand::Suspend(SuspendUser {
                tenant_id,
                user_id,
                reason: "chargebacks".to_string(),
                occurred_at: now(),
            }),
        )
        .unwrap();

        let assign = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id,
            role: Role::AGENT,
            actor_roles: vec![Role::ADMIN],
            occurred_at: now(),
        });
        assert!(user.handle(&assign).unwrap_err().to_string().contains("suspended"));

        execute(
            &mut user,
            &UserCommand::Activate(ActivateUser {
                tenant_id,
                user_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        execute(&mut user, &assign).unwrap();
        assert!(user.has_role(&Role::AGENT));
        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn other_tenant_cannot_touch_user() {
        let user = created(TenantId::new(), vec![Role::CUSTOMER]);
        let err = user
            .handle(&UserCommand::Suspend(SuspendUser {
                tenant_id: TenantId::new(),
                user_id: user.id,
                reason: "x".to_string(),
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("tenant"));
    }
}
