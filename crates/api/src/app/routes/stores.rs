use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Multipart, Path},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use quickdrop_auth::{Permission, Role};
use quickdrop_catalog::store::{
    RegisterStore, ReinstateStore, SetStoreOpen, SuspendStore, UpdateStoreProfile,
};
use quickdrop_catalog::{Store, StoreCommand, StoreId, StoreStatus};
use quickdrop_core::AggregateId;
use quickdrop_infra::storage::Bucket;

use crate::app::dto::{ReasonRequest, RegisterStoreRequest, UpdateStoreRequest};
use crate::app::errors;
use crate::app::routes::common::{self, HandlerResult};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_store).get(list_stores))
        .route("/:id", get(get_store).patch(update_store))
        .route("/:id/open", post(open_store))
        .route("/:id/close", post(close_store))
        .route("/:id/suspend", post(suspend_store))
        .route("/:id/reinstate", post(reinstate_store))
        .route("/:id/logo", post(upload_logo))
}

/// Load a store the caller may manage: admins manage every store, store
/// users only their own.
pub(crate) fn managed_store(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    store_id: StoreId,
) -> Result<Store, Response> {
    let store = services
        .load_store(tenant.tenant_id(), store_id)
        .map_err(errors::dispatch_error_to_response)?;
    let Some(owner) = store.owner_id() else {
        return Err(errors::not_found("store"));
    };
    if !principal.is_admin() && owner != principal.user_id() {
        return Err(errors::forbidden("store belongs to another owner"));
    }
    Ok(store)
}

fn store_id(raw: &str) -> Result<StoreId, Response> {
    common::parse_aggregate_id(raw, "store").map(StoreId::new)
}

pub async fn register_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<RegisterStoreRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_STORES_MANAGE)?;

    let owner_id = match body.owner_id.as_deref() {
        Some(raw) if principal.is_admin() => common::parse_user_id(raw)?,
        Some(_) => return Err(errors::forbidden("only admins register stores for others")),
        None => principal.user_id(),
    };
    if !principal.is_admin() && !principal.has_role(&Role::STORE) {
        return Err(errors::forbidden("only store users own stores"));
    }

    let store_id = StoreId::new(AggregateId::new());
    let cmd = StoreCommand::Register(RegisterStore {
        tenant_id: tenant.tenant_id(),
        store_id,
        owner_id,
        name: body.name,
        address: body.address,
        phone: body.phone,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_store(tenant.tenant_id(), store_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    common::created(json!({
        "id": store_id.0.to_string(),
        "owner_id": owner_id,
        "status": StoreStatus::Active,
        "is_open": false,
    }))
}

/// Active stores for everyone; admins also see suspended ones.
pub async fn list_stores(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_READ)?;

    let user_id = principal.user_id();
    let stores = services
        .stores
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|s| {
            s.status == StoreStatus::Active || principal.is_admin() || s.owner_id == user_id
        })
        .collect();
    common::list(stores)
}

pub async fn get_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let store_id = store_id(&id)?;

    match services.stores.get(tenant.tenant_id(), &store_id) {
        Some(s)
            if s.status == StoreStatus::Active
                || principal.is_admin()
                || s.owner_id == principal.user_id() =>
        {
            common::ok(s)
        }
        _ => Err(errors::not_found("store")),
    }
}

pub async fn update_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateStoreRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_STORES_MANAGE)?;
    let store_id = store_id(&id)?;
    managed_store(&services, &tenant, &principal, store_id)?;

    let cmd = StoreCommand::UpdateProfile(UpdateStoreProfile {
        tenant_id: tenant.tenant_id(),
        store_id,
        name: body.name,
        address: body.address,
        phone: body.phone,
        logo_url: body.logo_url,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(&services, &tenant, store_id, cmd)
}

pub async fn open_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    set_open(&services, &tenant, &principal, &id, true)
}

pub async fn close_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    set_open(&services, &tenant, &principal, &id, false)
}

fn set_open(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: &str,
    open: bool,
) -> HandlerResult {
    require(tenant, principal, &Permission::CATALOG_STORES_MANAGE)?;
    let store_id = store_id(id)?;
    managed_store(services, tenant, principal, store_id)?;

    let cmd = StoreCommand::SetOpen(SetStoreOpen {
        tenant_id: tenant.tenant_id(),
        store_id,
        open,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(services, tenant, store_id, cmd)
}

pub async fn suspend_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_STORES_MODERATE)?;
    let store_id = store_id(&id)?;

    let cmd = StoreCommand::Suspend(SuspendStore {
        tenant_id: tenant.tenant_id(),
        store_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(&services, &tenant, store_id, cmd)
}

pub async fn reinstate_store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_STORES_MODERATE)?;
    let store_id = store_id(&id)?;

    let cmd = StoreCommand::Reinstate(ReinstateStore {
        tenant_id: tenant.tenant_id(),
        store_id,
        occurred_at: Utc::now(),
    });
    dispatch_and_describe(&services, &tenant, store_id, cmd)
}

/// `POST /stores/:id/logo` with a `file` part. The stored object is removed
/// again when the profile update is rejected.
pub async fn upload_logo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::CATALOG_STORES_MANAGE)?;
    require(&tenant, &principal, &Permission::STORAGE_UPLOAD)?;
    let store_id = store_id(&id)?;
    managed_store(&services, &tenant, &principal, store_id)?;

    let (_, file) = common::read_upload(multipart, "file").await?.require_file()?;
    let path = format!(
        "{}/{}/{}.{}",
        tenant.tenant_id(),
        store_id,
        Uuid::now_v7(),
        file.extension()
    );
    let object = services
        .storage
        .put(Bucket::StoreLogos, &path, file.bytes, &file.content_type)
        .await
        .map_err(errors::storage_error_to_response)?;

    let cmd = StoreCommand::UpdateProfile(UpdateStoreProfile {
        tenant_id: tenant.tenant_id(),
        store_id,
        name: None,
        address: None,
        phone: None,
        logo_url: Some(object.public_url.clone()),
        occurred_at: Utc::now(),
    });
    if let Err(e) = services.dispatch_store(tenant.tenant_id(), store_id, cmd) {
        if let Err(del) = services.storage.delete(object.bucket, &object.path).await {
            warn!(path = %object.path, error = %del, "failed to delete orphaned logo");
        }
        return Err(errors::dispatch_error_to_response(e));
    }

    common::created(object)
}

fn dispatch_and_describe(
    services: &AppServices,
    tenant: &TenantContext,
    store_id: StoreId,
    cmd: StoreCommand,
) -> HandlerResult {
    services
        .dispatch_store(tenant.tenant_id(), store_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    let store = services
        .load_store(tenant.tenant_id(), store_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(json!({
        "id": store_id.0.to_string(),
        "name": store.name(),
        "status": store.status(),
        "is_open": store.is_open(),
        "logo_url": store.logo_url(),
    }))
}
