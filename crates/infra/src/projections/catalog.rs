//! Store, category and product listings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use quickdrop_catalog::{
    Category, CategoryEvent, CategoryId, Product, ProductEvent, ProductId, ProductStatus, Store,
    StoreEvent, StoreId, StoreStatus,
};
use quickdrop_core::{Money, TenantId, UserId};
use quickdrop_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, ensure_tenant, next_event};
use crate::read_model::TenantStore;

// ─────────────────────────────────────────────────────────────────────────────
// Stores
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReadModel {
    pub store_id: StoreId,
    pub owner_id: UserId,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub is_open: bool,
    pub status: StoreStatus,
    pub suspension_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StoresProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> StoresProjection<S>
where
    S: TenantStore<StoreId, StoreReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, store_id: &StoreId) -> Option<StoreReadModel> {
        self.store.get(tenant_id, store_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<StoreReadModel> {
        let mut stores = self.store.list(tenant_id);
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        stores
    }

    pub fn owned_by(&self, tenant_id: TenantId, owner_id: UserId) -> Vec<StoreReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|s| s.owner_id == owner_id)
            .collect()
    }

    fn update(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut StoreReadModel),
    ) {
        if let Some(mut rm) = self.store.get(tenant_id, &store_id) {
            f(&mut rm);
            rm.updated_at = at;
            self.store.upsert(tenant_id, store_id, rm);
        }
    }
}

impl<S> Projection for StoresProjection<S>
where
    S: TenantStore<StoreId, StoreReadModel>,
{
    fn aggregate_type(&self) -> &'static str {
        Store::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<StoreEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        match ev {
            StoreEvent::Registered(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.store_id,
                    StoreReadModel {
                        store_id: e.store_id,
                        owner_id: e.owner_id,
                        name: e.name,
                        address: e.address,
                        phone: e.phone,
                        logo_url: None,
                        is_open: false,
                        status: StoreStatus::Active,
                        suspension_reason: None,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            StoreEvent::ProfileUpdated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.store_id, e.occurred_at, |rm| {
                    rm.name = e.name;
                    rm.address = e.address;
                    rm.phone = e.phone;
                    rm.logo_url = e.logo_url;
                });
            }
            StoreEvent::Opened(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.store_id, e.occurred_at, |rm| rm.is_open = true);
            }
            StoreEvent::Closed(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.store_id, e.occurred_at, |rm| rm.is_open = false);
            }
            StoreEvent::Suspended(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.store_id, e.occurred_at, |rm| {
                    rm.status = StoreStatus::Suspended;
                    rm.is_open = false;
                    rm.suspension_reason = Some(e.reason);
                });
            }
            StoreEvent::Reinstated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.update(tenant_id, e.store_id, e.occurred_at, |rm| {
                    rm.status = StoreStatus::Active;
                    rm.suspension_reason = None;
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

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReadModel {
    pub category_id: CategoryId,
    pub name: String,
    pub sort_order: i32,
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CategoriesProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> CategoriesProjection<S>
where
    S: TenantStore<CategoryId, CategoryReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, category_id: &CategoryId) -> Option<CategoryReadModel> {
        self.store.get(tenant_id, category_id)
    }

    /// Active categories ordered for display.
    pub fn list_active(&self, tenant_id: TenantId) -> Vec<CategoryReadModel> {
        let mut categories: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|c| !c.archived)
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        categories
    }
}

impl<S> Projection for CategoriesProjection<S>
where
    S: TenantStore<CategoryId, CategoryReadModel>,
{
    fn aggregate_type(&self) -> &'static str {
        Category::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<CategoryEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        match ev {
            CategoryEvent::Created(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.category_id,
                    CategoryReadModel {
                        category_id: e.category_id,
                        name: e.name,
                        sort_order: e.sort_order,
                        archived: false,
                        updated_at: e.occurred_at,
                    },
                );
            }
            CategoryEvent::Renamed(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.category_id) {
                    rm.name = e.name;
                    rm.sort_order = e.sort_order;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.category_id, rm);
                }
            }
            CategoryEvent::Archived(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.category_id) {
                    rm.archived = true;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.category_id, rm);
                }
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

// ─────────────────────────────────────────────────────────────────────────────
// Products
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub available: bool,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

/// Optional filters for product listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductFilter {
    pub store_id: Option<StoreId>,
    pub category_id: Option<CategoryId>,
    pub include_unavailable: bool,
}

#[derive(Debug)]
pub struct ProductsProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> ProductsProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(tenant_id, product_id)
    }

    /// Archived products never show up; unavailable ones only on request.
    pub fn list(&self, tenant_id: TenantId, filter: ProductFilter) -> Vec<ProductReadModel> {
        let mut products: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|p| p.status == ProductStatus::Active)
            .filter(|p| filter.include_unavailable || p.available)
            .filter(|p| filter.store_id.is_none_or(|s| p.store_id == s))
            .filter(|p| filter.category_id.is_none_or(|c| p.category_id == c))
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }
}

impl<S> Projection for ProductsProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    fn aggregate_type(&self) -> &'static str {
        Product::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some(ev) = next_event::<ProductEvent>(&self.cursors, envelope)? else {
            return Ok(());
        };
        let tenant_id = envelope.tenant_id();

        match ev {
            ProductEvent::Created(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        store_id: e.store_id,
                        category_id: e.category_id,
                        name: e.name,
                        description: e.description,
                        price: e.price,
                        image_url: e.image_url,
                        available: true,
                        status: ProductStatus::Active,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ProductEvent::Updated(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.category_id = e.category_id;
                    rm.name = e.name;
                    rm.description = e.description;
                    rm.price = e.price;
                    rm.image_url = e.image_url;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::AvailabilityChanged(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.available = e.available;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::Archived(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                if let Some(mut rm) = self.store.get(tenant_id, &e.product_id) {
                    rm.status = ProductStatus::Archived;
                    rm.available = false;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.product_id, rm);
                }
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
