//! Store aggregate: a merchant's storefront on the marketplace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use quickdrop_events::Event;

use crate::required_text;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub AggregateId);

impl StoreId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StoreId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    id: StoreId,
    tenant_id: Option<TenantId>,
    owner_id: Option<UserId>,
    name: String,
    address: String,
    phone: Option<String>,
    logo_url: Option<String>,
    is_open: bool,
    status: StoreStatus,
    version: u64,
    created: bool,
}

impl Store {
    /// Stream type recorded with every event of this aggregate.
    pub const AGGREGATE_TYPE: &'static str = "catalog.store";

    pub fn empty(id: StoreId) -> Self {
        Self {
            id,
            tenant_id: None,
            owner_id: None,
            name: String::new(),
            address: String::new(),
            phone: None,
            logo_url: None,
            is_open: false,
            status: StoreStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StoreId {
        self.id
    }

    pub fn owner_id(&self) -> Option<UserId> {
        self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn status(&self) -> StoreStatus {
        self.status
    }

    pub fn logo_url(&self) -> Option<&str> {
        self.logo_url.as_deref()
    }

    /// Whether customers can currently order from this store.
    pub fn accepts_orders(&self) -> bool {
        self.created && self.is_open && self.status == StoreStatus::Active
    }
}

impl AggregateRoot for Store {
    type Id = StoreId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStore {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub owner_id: UserId,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStoreProfile {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStoreOpen {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub open: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendStore {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinstateStore {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreCommand {
    Register(RegisterStore),
    UpdateProfile(UpdateStoreProfile),
    SetOpen(SetStoreOpen),
    Suspend(SuspendStore),
    Reinstate(ReinstateStore),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRegistered {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub owner_id: UserId,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full profile after the update so readers need no history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProfileUpdated {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOpened {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreClosed {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSuspended {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReinstated {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    Registered(StoreRegistered),
    ProfileUpdated(StoreProfileUpdated),
    Opened(StoreOpened),
    Closed(StoreClosed),
    Suspended(StoreSuspended),
    Reinstated(StoreReinstated),
}

impl Event for StoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::Registered(_) => "catalog.store.registered",
            StoreEvent::ProfileUpdated(_) => "catalog.store.profile_updated",
            StoreEvent::Opened(_) => "catalog.store.opened",
            StoreEvent::Closed(_) => "catalog.store.closed",
            StoreEvent::Suspended(_) => "catalog.store.suspended",
            StoreEvent::Reinstated(_) => "catalog.store.reinstated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StoreEvent::Registered(e) => e.occurred_at,
            StoreEvent::ProfileUpdated(e) => e.occurred_at,
            StoreEvent::Opened(e) => e.occurred_at,
            StoreEvent::Closed(e) => e.occurred_at,
            StoreEvent::Suspended(e) => e.occurred_at,
            StoreEvent::Reinstated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Store {
    type Command = StoreCommand;
    type Event = StoreEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StoreEvent::Registered(e) => {
                self.id = e.store_id;
                self.tenant_id = Some(e.tenant_id);
                self.owner_id = Some(e.owner_id);
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.phone = e.phone.clone();
                self.is_open = false;
                self.status = StoreStatus::Active;
                self.created = true;
            }
            StoreEvent::ProfileUpdated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.phone = e.phone.clone();
                self.logo_url = e.logo_url.clone();
            }
            StoreEvent::Opened(_) => self.is_open = true,
            StoreEvent::Closed(_) => self.is_open = false,
            StoreEvent::Suspended(_) => {
                self.status = StoreStatus::Suspended;
                self.is_open = false;
            }
            StoreEvent::Reinstated(_) => self.status = StoreStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StoreCommand::Register(cmd) => self.handle_register(cmd),
            StoreCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            StoreCommand::SetOpen(cmd) => self.handle_set_open(cmd),
            StoreCommand::Suspend(cmd) => self.handle_suspend(cmd),
            StoreCommand::Reinstate(cmd) => self.handle_reinstate(cmd),
        }
    }
}

impl Store {
    fn ensure_existing(&self, tenant_id: TenantId, store_id: StoreId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != store_id {
            return Err(DomainError::invariant("store_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_suspended(&self) -> Result<(), DomainError> {
        if self.status == StoreStatus::Suspended {
            return Err(DomainError::invariant("store is suspended"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterStore) -> Result<Vec<StoreEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("store already exists"));
        }
        let name = required_text("store name", &cmd.name)?;
        let address = required_text("store address", &cmd.address)?;

        Ok(vec![StoreEvent::Registered(StoreRegistered {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            owner_id: cmd.owner_id,
            name,
            address,
            phone: normalize_optional(cmd.phone.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(
        &self,
        cmd: &UpdateStoreProfile,
    ) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.store_id)?;
        self.ensure_not_suspended()?;

        let name = match &cmd.name {
            Some(n) => required_text("store name", n)?,
            None => self.name.clone(),
        };
        let address = match &cmd.address {
            Some(a) => required_text("store address", a)?,
            None => self.address.clone(),
        };
        let phone = match &cmd.phone {
            Some(p) => normalize_optional(Some(p)),
            None => self.phone.clone(),
        };
        let logo_url = match &cmd.logo_url {
            Some(l) => normalize_optional(Some(l)),
            None => self.logo_url.clone(),
        };

        if name == self.name
            && address == self.address
            && phone == self.phone
            && logo_url == self.logo_url
        {
            return Ok(vec![]);
        }

        Ok(vec![StoreEvent::ProfileUpdated(StoreProfileUpdated {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            name,
            address,
            phone,
            logo_url,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_open(&self, cmd: &SetStoreOpen) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.store_id)?;
        self.ensure_not_suspended()?;

        match (self.is_open, cmd.open) {
            (false, true) => Ok(vec![StoreEvent::Opened(StoreOpened {
                tenant_id: cmd.tenant_id,
                store_id: cmd.store_id,
                occurred_at: cmd.occurred_at,
            })]),
            (true, false) => Ok(vec![StoreEvent::Closed(StoreClosed {
                tenant_id: cmd.tenant_id,
                store_id: cmd.store_id,
                occurred_at: cmd.occurred_at,
            })]),
            (true, true) => Err(DomainError::invariant("store is already open")),
            (false, false) => Err(DomainError::invariant("store is already closed")),
        }
    }

    fn handle_suspend(&self, cmd: &SuspendStore) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.store_id)?;
        self.ensure_not_suspended()?;
        let reason = required_text("suspension reason", &cmd.reason)?;

        Ok(vec![StoreEvent::Suspended(StoreSuspended {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reinstate(&self, cmd: &ReinstateStore) -> Result<Vec<StoreEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.store_id)?;
        if self.status != StoreStatus::Suspended {
            return Err(DomainError::invariant("store is not suspended"));
        }

        Ok(vec![StoreEvent::Reinstated(StoreReinstated {
            tenant_id: cmd.tenant_id,
            store_id: cmd.store_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quickdrop_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn registered() -> (Store, TenantId) {
        let tenant_id = TenantId::new();
        let store_id = StoreId::new(AggregateId::new());
        let mut store = Store::empty(store_id);
        execute(
            &mut store,
            &StoreCommand::Register(RegisterStore {
                tenant_id,
                store_id,
                owner_id: UserId::new(),
                name: "  Corner Grocer ".to_string(),
                address: "1 Main St".to_string(),
                phone: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (store, tenant_id)
    }

    #[test]
    fn registered_store_starts_closed() {
        let (store, _) = registered();
        assert_eq!(store.name(), "Corner Grocer");
        assert!(!store.is_open());
        assert!(!store.accepts_orders());
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let (store, tenant_id) = registered();
        let err = store
            .handle(&StoreCommand::Register(RegisterStore {
                tenant_id,
                store_id: store.id_typed(),
                owner_id: UserId::new(),
                name: "Other".to_string(),
                address: "2 Main St".to_string(),
                phone: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn open_then_close_toggles_and_rejects_no_ops() {
        let (mut store, tenant_id) = registered();
        let store_id = store.id_typed();
        let set_open = |open| {
            StoreCommand::SetOpen(SetStoreOpen {
                tenant_id,
                store_id,
                open,
                occurred_at: test_time(),
            })
        };
        let close = set_open(false);
        let open = set_open(true);

        assert!(store.handle(&close).is_err());
        execute(&mut store, &open).unwrap();
        assert!(store.accepts_orders());
        assert!(store.handle(&open).is_err());
        execute(&mut store, &close).unwrap();
        assert!(!store.is_open());
    }

    #[test]
    fn suspension_closes_store_and_blocks_profile_edits() {
        let (mut store, tenant_id) = registered();
        let store_id = store.id_typed();
        execute(
            &mut store,
            &StoreCommand::SetOpen(SetStoreOpen {
                tenant_id,
                store_id,
                open: true,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut store,
            &StoreCommand::Suspend(SuspendStore {
                tenant_id,
                store_id,
                reason: "health inspection".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(store.status(), StoreStatus::Suspended);
        assert!(!store.accepts_orders());

        let update = StoreCommand::UpdateProfile(UpdateStoreProfile {
            tenant_id,
            store_id,
            name: Some("New".to_string()),
            address: None,
            phone: None,
            logo_url: None,
            occurred_at: test_time(),
        });
        assert!(store.handle(&update).unwrap_err().to_string().contains("suspended"));

        execute(
            &mut store,
            &StoreCommand::Reinstate(ReinstateStore {
                tenant_id,
                store_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(store.status(), StoreStatus::Active);
        assert!(!store.is_open());
    }

    #[test]
    fn unchanged_profile_emits_nothing() {
        let (store, tenant_id) = registered();
        let events = store
            .handle(&StoreCommand::UpdateProfile(UpdateStoreProfile {
                tenant_id,
                store_id: store.id_typed(),
                name: Some("Corner Grocer".to_string()),
                address: None,
                phone: None,
                logo_url: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn blank_name_is_rejected_on_update() {
        let (store, tenant_id) = registered();
        let err = store
            .handle(&StoreCommand::UpdateProfile(UpdateStoreProfile {
                tenant_id,
                store_id: store.id_typed(),
                name: Some("   ".to_string()),
                address: None,
                phone: None,
                logo_url: Some("https://cdn/logo.png".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
