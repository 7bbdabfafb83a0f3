use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    routing::{patch, post},
};
use chrono::Utc;
use serde_json::json;

use quickdrop_auth::Permission;
use quickdrop_catalog::category::{ArchiveCategory, CreateCategory, RenameCategory};
use quickdrop_catalog::{CategoryCommand, CategoryId};
use quickdrop_core::AggregateId;

use crate::app::dto::{CreateCategoryRequest, UpdateCategoryRequest};
use crate::app::errors;
use crate::app::routes::common::{self, HandlerResult};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_category).get(list_categories))
        .route("/:id", patch(update_category))
        .route("/:id/archive", post(archive_category))
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateCategoryRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_CATEGORIES_MANAGE)?;

    let category_id = CategoryId::new(AggregateId::new());
    let cmd = CategoryCommand::Create(CreateCategory {
        tenant_id: tenant.tenant_id(),
        category_id,
        name: body.name,
        sort_order: body.sort_order,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_category(tenant.tenant_id(), category_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    common::created(json!({ "id": category_id.0.to_string() }))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_READ)?;
    common::list(services.categories.list_active(tenant.tenant_id()))
}

pub async fn update_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCategoryRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_CATEGORIES_MANAGE)?;
    let category_id = CategoryId::new(common::parse_aggregate_id(&id, "category")?);

    let cmd = CategoryCommand::Rename(RenameCategory {
        tenant_id: tenant.tenant_id(),
        category_id,
        name: body.name,
        sort_order: body.sort_order,
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch_category(tenant.tenant_id(), category_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    common::ok(json!({
        "id": category_id.0.to_string(),
        "events_committed": committed.len(),
    }))
}

pub async fn archive_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_CATEGORIES_MANAGE)?;
    let category_id = CategoryId::new(common::parse_aggregate_id(&id, "category")?);

    let cmd = CategoryCommand::Archive(ArchiveCategory {
        tenant_id: tenant.tenant_id(),
        category_id,
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch_category(tenant.tenant_id(), category_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    common::ok(json!({
        "id": category_id.0.to_string(),
        "archived": true,
        "events_committed": committed.len(),
    }))
}
