//! Agent profile aggregate. One stream per agent, derived from the agent's user id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use quickdrop_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub AggregateId);

impl ProfileId {
    pub fn for_agent(agent_id: UserId) -> Self {
        Self(AggregateId::for_user(AgentProfile::AGGREGATE_TYPE, agent_id))
    }
}

impl core::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    PendingApproval,
    Approved,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    id: ProfileId,
    tenant_id: Option<TenantId>,
    agent_id: Option<UserId>,
    full_name: String,
    phone: String,
    vehicle: Option<String>,
    status: AgentStatus,
    online: bool,
    version: u64,
    created: bool,
}

impl AgentProfile {
    pub const AGGREGATE_TYPE: &'static str = "agents.profile";

    pub fn empty(id: ProfileId) -> Self {
        Self {
            id,
            tenant_id: None,
            agent_id: None,
            full_name: String::new(),
            phone: String::new(),
            vehicle: None,
            status: AgentStatus::PendingApproval,
            online: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProfileId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn agent_id(&self) -> Option<UserId> {
        self.agent_id
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn vehicle(&self) -> Option<&str> {
        self.vehicle.as_deref()
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Approved agents may take jobs.
    pub fn can_take_jobs(&self) -> bool {
        self.created && self.status == AgentStatus::Approved
    }
}

impl AggregateRoot for AgentProfile {
    type Id = ProfileId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAgent {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub full_name: String,
    pub phone: String,
    pub vehicle: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveAgent {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendAgent {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAvailability {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub online: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentProfileCommand {
    Register(RegisterAgent),
    Approve(ApproveAgent),
    Suspend(SuspendAgent),
    SetAvailability(SetAvailability),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistered {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub full_name: String,
    pub phone: String,
    pub vehicle: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentApproved {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSuspended {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityChanged {
    pub tenant_id: TenantId,
    pub agent_id: UserId,
    pub online: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentProfileEvent {
    Registered(AgentRegistered),
    Approved(AgentApproved),
    Suspended(AgentSuspended),
    AvailabilityChanged(AvailabilityChanged),
}

impl Event for AgentProfileEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AgentProfileEvent::Registered(_) => "agents.profile.registered",
            AgentProfileEvent::Approved(_) => "agents.profile.approved",
            AgentProfileEvent::Suspended(_) => "agents.profile.suspended",
            AgentProfileEvent::AvailabilityChanged(_) => "agents.profile.availability_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AgentProfileEvent::Registered(e) => e.occurred_at,
            AgentProfileEvent::Approved(e) => e.occurred_at,
            AgentProfileEvent::Suspended(e) => e.occurred_at,
            AgentProfileEvent::AvailabilityChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for AgentProfile {
    type Command = AgentProfileCommand;
    type Event = AgentProfileEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AgentProfileEvent::Registered(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.agent_id = Some(e.agent_id);
                self.full_name = e.full_name.clone();
                self.phone = e.phone.clone();
                self.vehicle = e.vehicle.clone();
                self.status = AgentStatus::PendingApproval;
                self.created = true;
            }
            AgentProfileEvent::Approved(_) => self.status = AgentStatus::Approved,
            AgentProfileEvent::Suspended(_) => {
                self.status = AgentStatus::Suspended;
                self.online = false;
            }
            AgentProfileEvent::AvailabilityChanged(e) => self.online = e.online,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AgentProfileCommand::Register(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("agent profile already exists"));
                }
                let full_name = cmd.full_name.trim();
                let phone = cmd.phone.trim();
                if full_name.is_empty() {
                    return Err(DomainError::validation("full name cannot be empty"));
                }
                if phone.is_empty() {
                    return Err(DomainError::validation("phone cannot be empty"));
                }
                Ok(vec![AgentProfileEvent::Registered(AgentRegistered {
                    tenant_id: cmd.tenant_id,
                    agent_id: cmd.agent_id,
                    full_name: full_name.to_string(),
                    phone: phone.to_string(),
                    vehicle: cmd
                        .vehicle
                        .as_deref()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string),
                    occurred_at: cmd.occurred_at,
                })])
            }
            AgentProfileCommand::Approve(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if self.status == AgentStatus::Approved {
                    return Err(DomainError::invariant("agent already approved"));
                }
                Ok(vec![AgentProfileEvent::Approved(AgentApproved {
                    tenant_id: cmd.tenant_id,
                    agent_id: cmd.agent_id,
                    approved_by: cmd.approved_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            AgentProfileCommand::Suspend(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if self.status == AgentStatus::Suspended {
                    return Err(DomainError::invariant("agent already suspended"));
                }
                let reason = cmd.reason.trim();
                if reason.is_empty() {
                    return Err(DomainError::validation("a reason is required"));
                }
                Ok(vec![AgentProfileEvent::Suspended(AgentSuspended {
                    tenant_id: cmd.tenant_id,
                    agent_id: cmd.agent_id,
                    reason: reason.to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            AgentProfileCommand::SetAvailability(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if cmd.online && self.status != AgentStatus::Approved {
                    return Err(DomainError::invariant("only approved agents can go online"));
                }
                if self.online == cmd.online {
                    return Ok(vec![]);
                }
                Ok(vec![AgentProfileEvent::AvailabilityChanged(AvailabilityChanged {
                    tenant_id: cmd.tenant_id,
                    agent_id: cmd.agent_id,
                    online: cmd.online,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AgentProfile {
    fn ensure_existing(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickdrop_events::execute;

    fn registered() -> (AgentProfile, TenantId, UserId) {
        let tenant_id = TenantId::new();
        let agent_id = UserId::new();
        let mut profile = AgentProfile::empty(ProfileId::for_agent(agent_id));
        execute(
            &mut profile,
            &AgentProfileCommand::Register(RegisterAgent {
                tenant_id,
                agent_id,
                full_name: "Sam Rider".to_string(),
                phone: "+15550100".to_string(),
                vehicle: Some("scooter".to_string()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (profile, tenant_id, agent_id)
    }

    fn availability(tenant_id: TenantId, agent_id: UserId, online: bool) -> AgentProfileCommand {
        AgentProfileCommand::SetAvailability(SetAvailability {
            tenant_id,
            agent_id,
            online,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn pending_agent_cannot_go_online_or_take_jobs() {
        let (profile, tenant_id, agent_id) = registered();
        assert!(!profile.can_take_jobs());
        assert!(profile.handle(&availability(tenant_id, agent_id, true)).is_err());
    }

    #[test]
    fn approval_then_suspension_drops_online_flag() {
        let (mut profile, tenant_id, agent_id) = registered();
        execute(
            &mut profile,
            &AgentProfileCommand::Approve(ApproveAgent {
                tenant_id,
                agent_id,
                approved_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(&mut profile, &availability(tenant_id, agent_id, true)).unwrap();
        assert!(profile.is_online());
        assert!(profile.can_take_jobs());

        execute(
            &mut profile,
            &AgentProfileCommand::Suspend(SuspendAgent {
                tenant_id,
                agent_id,
                reason: "late deliveries".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!profile.is_online());
        assert!(!profile.can_take_jobs());
        assert_eq!(profile.version(), 4);
    }

    #[test]
    fn going_offline_twice_is_a_no_op() {
        let (profile, tenant_id, agent_id) = registered();
        assert!(profile.handle(&availability(tenant_id, agent_id, false)).unwrap().is_empty());
    }
}
