//! Product aggregate: an item on a store's menu.
//!
//! Prices are in minor units. Whether the store or category referenced by a
//! product exists is checked by the caller against the read side; the
//! aggregate only guards its own fields and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quickdrop_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use quickdrop_events::Event;

use crate::{CategoryId, StoreId, required_text};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    store_id: Option<StoreId>,
    category_id: Option<CategoryId>,
    name: String,
    description: String,
    price: Money,
    image_url: Option<String>,
    available: bool,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    pub const AGGREGATE_TYPE: &'static str = "catalog.product";

    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            store_id: None,
            category_id: None,
            name: String::new(),
            description: String::new(),
            price: Money::ZERO,
            image_url: None,
            available: false,
            status: ProductStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Active and marked available by the store.
    pub fn is_orderable(&self) -> bool {
        self.created && self.available && self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub category_id: Option<CategoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub image_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProductAvailability {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub available: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    Update(UpdateProduct),
    SetAvailability(SetProductAvailability),
    Archive(ArchiveProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Full post-update snapshot of the editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAvailabilityChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub available: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Created(ProductCreated),
    Updated(ProductUpdated),
    AvailabilityChanged(ProductAvailabilityChanged),
    Archived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => "catalog.product.created",
            ProductEvent::Updated(_) => "catalog.product.updated",
            ProductEvent::AvailabilityChanged(_) => "catalog.product.availability_changed",
            ProductEvent::Archived(_) => "catalog.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Created(e) => e.occurred_at,
            ProductEvent::Updated(e) => e.occurred_at,
            ProductEvent::AvailabilityChanged(e) => e.occurred_at,
            ProductEvent::Archived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Created(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.store_id = Some(e.store_id);
                self.category_id = Some(e.category_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.price = e.price;
                self.image_url = e.image_url.clone();
                self.available = true;
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::Updated(e) => {
                self.category_id = Some(e.category_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.price = e.price;
                self.image_url = e.image_url.clone();
            }
            ProductEvent::AvailabilityChanged(e) => self.available = e.available,
            ProductEvent::Archived(_) => {
                self.status = ProductStatus::Archived;
                self.available = false;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => self.handle_create(cmd),
            ProductCommand::Update(cmd) => self.handle_update(cmd),
            ProductCommand::SetAvailability(cmd) => self.handle_set_availability(cmd),
            ProductCommand::Archive(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Product {
    fn ensure_editable(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("product is archived"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        let name = required_text("product name", &cmd.name)?;
        if cmd.price.is_zero() {
            return Err(DomainError::validation("price must be positive"));
        }

        Ok(vec![ProductEvent::Created(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            store_id: cmd.store_id,
            category_id: cmd.category_id,
            name,
            description: cmd.description.trim().to_string(),
            price: cmd.price,
            image_url: cmd.image_url.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;

        let name = match &cmd.name {
            Some(n) => required_text("product name", n)?,
            None => self.name.clone(),
        };
        let price = cmd.price.unwrap_or(self.price);
        if price.is_zero() {
            return Err(DomainError::validation("price must be positive"));
        }
        let description = cmd
            .description
            .as_deref()
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| self.description.clone());
        let image_url = cmd.image_url.clone().or_else(|| self.image_url.clone());
        let category_id = cmd
            .category_id
            .or(self.category_id)
            .ok_or_else(|| DomainError::invariant("product has no category"))?;

        Ok(vec![ProductEvent::Updated(ProductUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            category_id,
            name,
            description,
            price,
            image_url,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_availability(
        &self,
        cmd: &SetProductAvailability,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;
        if self.available == cmd.available {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::AvailabilityChanged(ProductAvailabilityChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            available: cmd.available,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_editable(cmd.tenant_id, cmd.product_id)?;

        Ok(vec![ProductEvent::Archived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quickdrop_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn create_cmd(tenant_id: TenantId, product_id: ProductId, price: u64) -> ProductCommand {
        ProductCommand::Create(CreateProduct {
            tenant_id,
            product_id,
            store_id: StoreId::new(AggregateId::new()),
            category_id: CategoryId::new(AggregateId::new()),
            name: "Sourdough loaf".to_string(),
            description: " Baked daily ".to_string(),
            price: Money::from_minor(price),
            image_url: None,
            occurred_at: test_time(),
        })
    }

    fn created() -> (Product, TenantId) {
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(product_id);
        execute(&mut product, &create_cmd(tenant_id, product_id, 650)).unwrap();
        (product, tenant_id)
    }

    #[test]
    fn new_product_is_orderable() {
        let (product, _) = created();
        assert!(product.is_orderable());
        assert_eq!(product.price(), Money::from_minor(650));
    }

    #[test]
    fn zero_price_is_rejected() {
        let product_id = ProductId::new(AggregateId::new());
        let err = Product::empty(product_id)
            .handle(&create_cmd(TenantId::new(), product_id, 0))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_merges_partial_fields() {
        let (mut product, tenant_id) = created();
        let category = product.category_id();
        let product_id = product.id_typed();
        execute(
            &mut product,
            &ProductCommand::Update(UpdateProduct {
                tenant_id,
                product_id,
                category_id: None,
                name: None,
                description: None,
                price: Some(Money::from_minor(700)),
                image_url: Some("https://files/p.png".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(product.name(), "Sourdough loaf");
        assert_eq!(product.price(), Money::from_minor(700));
        assert_eq!(product.image_url(), Some("https://files/p.png"));
        assert_eq!(product.category_id(), category);
    }

    #[test]
    fn availability_toggle_is_idempotent() {
        let (mut product, tenant_id) = created();
        let off = ProductCommand::SetAvailability(SetProductAvailability {
            tenant_id,
            product_id: product.id_typed(),
            available: false,
            occurred_at: test_time(),
        });
        assert_eq!(execute(&mut product, &off).unwrap().len(), 1);
        assert!(!product.is_orderable());
        assert!(execute(&mut product, &off).unwrap().is_empty());
    }

    #[test]
    fn archived_product_cannot_change() {
        let (mut product, tenant_id) = created();
        let product_id = product.id_typed();
        execute(
            &mut product,
            &ProductCommand::Archive(ArchiveProduct {
                tenant_id,
                product_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(!product.is_orderable());

        let err = product
            .handle(&ProductCommand::SetAvailability(SetProductAvailability {
                tenant_id,
                product_id,
                available: true,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("archived"));
    }
}
