//! Platform-wide product categories, curated by admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use quickdrop_events::Event;

use crate::required_text;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub AggregateId);

impl CategoryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    tenant_id: Option<TenantId>,
    name: String,
    sort_order: i32,
    archived: bool,
    version: u64,
    created: bool,
}

impl Category {
    pub const AGGREGATE_TYPE: &'static str = "catalog.category";

    pub fn empty(id: CategoryId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            sort_order: 0,
            archived: false,
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }
}

impl AggregateRoot for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategory {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub name: String,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameCategory {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub name: String,
    pub sort_order: Option<i32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCategory {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryCommand {
    Create(CreateCategory),
    Rename(RenameCategory),
    Archive(ArchiveCategory),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCreated {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub name: String,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRenamed {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub name: String,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryArchived {
    pub tenant_id: TenantId,
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryEvent {
    Created(CategoryCreated),
    Renamed(CategoryRenamed),
    Archived(CategoryArchived),
}

impl Event for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::Created(_) => "catalog.category.created",
            CategoryEvent::Renamed(_) => "catalog.category.renamed",
            CategoryEvent::Archived(_) => "catalog.category.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CategoryEvent::Created(e) => e.occurred_at,
            CategoryEvent::Renamed(e) => e.occurred_at,
            CategoryEvent::Archived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Category {
    type Command = CategoryCommand;
    type Event = CategoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CategoryEvent::Created(e) => {
                self.id = e.category_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.sort_order = e.sort_order;
                self.created = true;
            }
            CategoryEvent::Renamed(e) => {
                self.name = e.name.clone();
                self.sort_order = e.sort_order;
            }
            CategoryEvent::Archived(_) => self.archived = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CategoryCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("category already exists"));
                }
                Ok(vec![CategoryEvent::Created(CategoryCreated {
                    tenant_id: cmd.tenant_id,
                    category_id: cmd.category_id,
                    name: required_text("category name", &cmd.name)?,
                    sort_order: cmd.sort_order,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CategoryCommand::Rename(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                let name = required_text("category name", &cmd.name)?;
                let sort_order = cmd.sort_order.unwrap_or(self.sort_order);
                if name == self.name && sort_order == self.sort_order {
                    return Ok(vec![]);
                }
                Ok(vec![CategoryEvent::Renamed(CategoryRenamed {
                    tenant_id: cmd.tenant_id,
                    category_id: cmd.category_id,
                    name,
                    sort_order,
                    occurred_at: cmd.occurred_at,
                })])
            }
            CategoryCommand::Archive(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                Ok(vec![CategoryEvent::Archived(CategoryArchived {
                    tenant_id: cmd.tenant_id,
                    category_id: cmd.category_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Category {
    fn ensure_active(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.archived {
            return Err(DomainError::invariant("category is archived"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickdrop_events::execute;

    #[test]
    fn archived_category_is_frozen() {
        let tenant_id = TenantId::new();
        let category_id = CategoryId::new(AggregateId::new());
        let mut category = Category::empty(category_id);

        execute(
            &mut category,
            &CategoryCommand::Create(CreateCategory {
                tenant_id,
                category_id,
                name: "Produce".to_string(),
                sort_order: 1,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut category,
            &CategoryCommand::Archive(ArchiveCategory {
                tenant_id,
                category_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert!(category.is_archived());
        let err = category
            .handle(&CategoryCommand::Rename(RenameCategory {
                tenant_id,
                category_id,
                name: "Fruit".to_string(),
                sort_order: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("archived"));
    }

    #[test]
    fn rename_keeps_sort_order_when_not_given() {
        let tenant_id = TenantId::new();
        let category_id = CategoryId::new(AggregateId::new());
        let mut category = Category::empty(category_id);
        execute(
            &mut category,
            &CategoryCommand::Create(CreateCategory {
                tenant_id,
                category_id,
                name: "Drinks".to_string(),
                sort_order: 4,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut category,
            &CategoryCommand::Rename(RenameCategory {
                tenant_id,
                category_id,
                name: "Beverages".to_string(),
                sort_order: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(category.name(), "Beverages");
        assert_eq!(category.sort_order(), 4);
        assert_eq!(category.version(), 2);
    }
}
