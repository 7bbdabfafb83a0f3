use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Multipart, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use quickdrop_auth::Permission;
use quickdrop_catalog::product::{
    ArchiveProduct, CreateProduct, SetProductAvailability, UpdateProduct,
};
use quickdrop_catalog::{CategoryId, Product, ProductCommand, ProductId, StoreId, StoreStatus};
use quickdrop_core::{AggregateId, AggregateRoot, Money};
use quickdrop_infra::projections::ProductFilter;
use quickdrop_infra::storage::Bucket;

use crate::app::dto::{
    CreateProductRequest, ProductAvailabilityRequest, ProductsQuery, UpdateProductRequest,
};
use crate::app::errors;
use crate::app::routes::common::{self, HandlerResult};
use crate::app::routes::stores::managed_store;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).patch(update_product))
        .route("/:id/availability", post(set_availability))
        .route("/:id/archive", post(archive_product))
        .route("/:id/image", post(upload_image))
}

fn product_id(raw: &str) -> Result<ProductId, Response> {
    common::parse_aggregate_id(raw, "product").map(ProductId::new)
}

/// A category new or moved products may use.
fn usable_category(
    services: &AppServices,
    tenant: &TenantContext,
    category_id: CategoryId,
) -> Result<(), Response> {
    let category = services
        .load_category(tenant.tenant_id(), category_id)
        .map_err(errors::dispatch_error_to_response)?;
    if category.version() == 0 {
        return Err(errors::not_found("category"));
    }
    if category.is_archived() {
        return Err(errors::rejected("category is archived"));
    }
    Ok(())
}

/// Load a product whose store the caller manages.
fn managed_product(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    product_id: ProductId,
) -> Result<Product, Response> {
    let product = services
        .load_product(tenant.tenant_id(), product_id)
        .map_err(errors::dispatch_error_to_response)?;
    let Some(store_id) = product.store_id() else {
        return Err(errors::not_found("product"));
    };
    managed_store(services, tenant, principal, store_id)?;
    Ok(product)
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateProductRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_PRODUCTS_MANAGE)?;
    let store_id = StoreId::new(common::parse_aggregate_id(&body.store_id, "store")?);
    let category_id = CategoryId::new(common::parse_aggregate_id(&body.category_id, "category")?);

    let store = managed_store(&services, &tenant, &principal, store_id)?;
    if store.status() == StoreStatus::Suspended {
        return Err(errors::rejected("store is suspended"));
    }
    usable_category(&services, &tenant, category_id)?;

    let product_id = ProductId::new(AggregateId::new());
    let cmd = ProductCommand::Create(CreateProduct {
        tenant_id: tenant.tenant_id(),
        product_id,
        store_id,
        category_id,
        name: body.name,
        description: body.description,
        price: Money::from_minor(body.price),
        image_url: body.image_url,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_product(tenant.tenant_id(), product_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    common::created(json!({ "id": product_id.0.to_string() }))
}

/// `GET /products?store_id=&category_id=&include_unavailable=`.
///
/// Customers see available products of active stores. Unavailable ones are
/// listed only for admins and for the owner of the requested store.
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ProductsQuery>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let tenant_id = tenant.tenant_id();

    let store_id = match query.store_id.as_deref() {
        Some(raw) => Some(StoreId::new(common::parse_aggregate_id(raw, "store")?)),
        None => None,
    };
    let category_id = match query.category_id.as_deref() {
        Some(raw) => Some(CategoryId::new(common::parse_aggregate_id(raw, "category")?)),
        None => None,
    };

    let owns_store = store_id
        .and_then(|id| services.stores.get(tenant_id, &id))
        .is_some_and(|s| s.owner_id == principal.user_id());
    let privileged = principal.is_admin() || owns_store;

    let products = services
        .products
        .list(
            tenant_id,
            ProductFilter {
                store_id,
                category_id,
                include_unavailable: query.include_unavailable && privileged,
            },
        )
        .into_iter()
        .filter(|p| {
            privileged
                || services
                    .stores
                    .get(tenant_id, &p.store_id)
                    .is_some_and(|s| s.status == StoreStatus::Active)
        })
        .collect();
    common::list(products)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let product_id = product_id(&id)?;

    services
        .products
        .get(tenant.tenant_id(), &product_id)
        .map(common::ok)
        .unwrap_or_else(|| Err(errors::not_found("product")))
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProductRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_PRODUCTS_MANAGE)?;
    let product_id = product_id(&id)?;
    managed_product(&services, &tenant, &principal, product_id)?;

    let category_id = match body.category_id.as_deref() {
        Some(raw) => {
            let id = CategoryId::new(common::parse_aggregate_id(raw, "category")?);
            usable_category(&services, &tenant, id)?;
            Some(id)
        }
        None => None,
    };

    let cmd = ProductCommand::Update(UpdateProduct {
        tenant_id: tenant.tenant_id(),
        product_id,
        category_id,
        name: body.name,
        description: body.description,
        price: body.price.map(Money::from_minor),
        image_url: body.image_url,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(&services, &tenant, product_id, cmd)
}

pub async fn set_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ProductAvailabilityRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_PRODUCTS_MANAGE)?;
    let product_id = product_id(&id)?;
    managed_product(&services, &tenant, &principal, product_id)?;

    let cmd = ProductCommand::SetAvailability(SetProductAvailability {
        tenant_id: tenant.tenant_id(),
        product_id,
        available: body.available,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(&services, &tenant, product_id, cmd)
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_PRODUCTS_MANAGE)?;
    let product_id = product_id(&id)?;
    managed_product(&services, &tenant, &principal, product_id)?;

    let cmd = ProductCommand::Archive(ArchiveProduct {
        tenant_id: tenant.tenant_id(),
        product_id,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(&services, &tenant, product_id, cmd)
}

/// `POST /products/:id/image` with a `file` part.
pub async fn upload_image(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_PRODUCTS_MANAGE)?;
    require(&tenant, &principal, &Permission::STORAGE_UPLOAD)?;
    let product_id = product_id(&id)?;
    managed_product(&services, &tenant, &principal, product_id)?;

    let (_, file) = common::read_upload(multipart, "file").await?.require_file()?;
    let path = format!(
        "{}/{}/{}.{}",
        tenant.tenant_id(),
        product_id,
        Uuid::now_v7(),
        file.extension()
    );
    let object = services
        .storage
        .put(Bucket::ProductImages, &path, file.bytes, &file.content_type)
        .await
        .map_err(errors::storage_error_to_response)?;

    let cmd = ProductCommand::Update(UpdateProduct {
        tenant_id: tenant.tenant_id(),
        product_id,
        category_id: None,
        name: None,
        description: None,
        price: None,
        image_url: Some(object.public_url.clone()),
        occurred_at: Utc::now(),
    });
    if let Err(e) = services.dispatch_product(tenant.tenant_id(), product_id, cmd) {
        if let Err(del) = services.storage.delete(object.bucket, &object.path).await {
            warn!(path = %object.path, error = %del, "failed to delete orphaned product image");
        }
        return Err(errors::dispatch_error_to_response(e));
    }

    common::created(object)
}

fn dispatch_and_describe(
    services: &AppServices,
    tenant: &TenantContext,
    product_id: ProductId,
    cmd: ProductCommand,
) -> HandlerResult {
    services
        .dispatch_product(tenant.tenant_id(), product_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    let product = services
        .load_product(tenant.tenant_id(), product_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(json!({
        "id": product_id.0.to_string(),
        "name": product.name(),
        "price": product.price(),
        "image_url": product.image_url(),
        "status": product.status(),
        "orderable": product.is_orderable(),
    }))
}
