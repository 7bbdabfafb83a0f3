use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Multipart, Path},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use quickdrop_agents::profile::{RegisterAgent, SetAvailability};
use quickdrop_agents::{AgentProfile, AgentProfileCommand};
use quickdrop_auth::Permission;
use quickdrop_core::{Money, UserId};
use quickdrop_infra::storage::Bucket;
use quickdrop_orders::order::{ReleaseJob, RequestCash, StartDelivery};
use quickdrop_orders::{Order, OrderCommand, OrderId};

use crate::app::dto::{
    self, AcceptJobRequest, AgentAvailabilityRequest, AmountRequest, RegisterAgentRequest,
    ReleaseJobRequest,
};
use crate::app::errors;
use crate::app::routes::common::{self, HandlerResult};
use crate::app::routes::orders::order_id;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/profile", post(register_profile).get(get_profile))
        .route("/availability", post(set_availability))
        .route("/jobs", get(open_jobs))
        .route("/jobs/mine", get(my_jobs))
        .route("/jobs/:id/accept", post(accept_job))
        .route("/jobs/:id/release", post(release_job))
        .route("/jobs/:id/request-cash", post(request_cash))
        .route("/jobs/:id/purchase", post(confirm_purchase))
        .route("/jobs/:id/start-delivery", post(start_delivery))
        .route("/jobs/:id/deliver", post(confirm_delivery))
        .route("/wallet", get(my_wallet))
}

fn profile_snapshot(agent_id: UserId, profile: &AgentProfile) -> serde_json::Value {
    json!({
        "agent_id": agent_id,
        "full_name": profile.full_name(),
        "phone": profile.phone(),
        "vehicle": profile.vehicle(),
        "status": profile.status(),
        "online": profile.is_online(),
    })
}

/// Load an order the calling agent is assigned to.
fn assigned_order(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    order_id: OrderId,
) -> Result<Order, Response> {
    let order = services
        .load_order(tenant.tenant_id(), order_id)
        .map_err(errors::dispatch_error_to_response)?;
    if !order.exists() {
        return Err(errors::not_found("order"));
    }
    if order.agent_id() != Some(principal.user_id()) {
        return Err(errors::forbidden("order is not assigned to you"));
    }
    Ok(order)
}

fn order_response(
    services: &AppServices,
    tenant: &TenantContext,
    order_id: OrderId,
) -> HandlerResult {
    let order = services
        .load_order(tenant.tenant_id(), order_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(dto::order_snapshot(&order))
}

pub async fn register_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<RegisterAgentRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::AGENTS_PROFILE_MANAGE)?;
    let agent_id = principal.user_id();

    let cmd = AgentProfileCommand::Register(RegisterAgent {
        tenant_id: tenant.tenant_id(),
        agent_id,
        full_name: body.full_name,
        phone: body.phone,
        vehicle: body.vehicle,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_profile(tenant.tenant_id(), agent_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    let profile = services
        .load_profile(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::created(profile_snapshot(agent_id, &profile))
}

pub async fn get_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::AGENTS_PROFILE_MANAGE)?;
    let agent_id = principal.user_id();

    let profile = services
        .load_profile(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    if !profile.exists() {
        return Err(errors::not_found("agent profile"));
    }
    common::ok(profile_snapshot(agent_id, &profile))
}

pub async fn set_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<AgentAvailabilityRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::AGENTS_PROFILE_MANAGE)?;
    let agent_id = principal.user_id();

    let cmd = AgentProfileCommand::SetAvailability(SetAvailability {
        tenant_id: tenant.tenant_id(),
        agent_id,
        online: body.online,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_profile(tenant.tenant_id(), agent_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    let profile = services
        .load_profile(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(profile_snapshot(agent_id, &profile))
}

/// Pending orders nobody has accepted, oldest first.
pub async fn open_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_JOBS_READ)?;
    common::list(services.orders.open_jobs(tenant.tenant_id()))
}

pub async fn my_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_JOBS_READ)?;
    common::list(
        services
            .orders
            .for_agent(tenant.tenant_id(), principal.user_id()),
    )
}

/// `POST /agent/jobs/:id/accept`. A job someone else took first is a 409.
pub async fn accept_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AcceptJobRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_JOBS_ACCEPT)?;
    let order_id = order_id(&id)?;

    services
        .coordinator
        .accept_job(tenant.tenant_id(), order_id, principal.user_id(), body.purchase_type)
        .map_err(errors::fulfillment_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

pub async fn release_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_JOBS_ACCEPT)?;
    let order_id = order_id(&id)?;
    let body: ReleaseJobRequest = common::optional_json(&body)?;
    assigned_order(&services, &tenant, &principal, order_id)?;

    let cmd = OrderCommand::ReleaseJob(ReleaseJob {
        tenant_id: tenant.tenant_id(),
        order_id,
        agent_id: principal.user_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_order(tenant.tenant_id(), order_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

/// Ask for company cash for a CPO job; an admin approves or rejects it.
pub async fn request_cash(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AmountRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_FULFILL)?;
    let order_id = order_id(&id)?;
    assigned_order(&services, &tenant, &principal, order_id)?;

    let cmd = OrderCommand::RequestCash(RequestCash {
        tenant_id: tenant.tenant_id(),
        order_id,
        agent_id: principal.user_id(),
        amount: Money::from_minor(body.amount),
        occurred_at: Utc::now(),
    });
    services
        .dispatch_order(tenant.tenant_id(), order_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

/// `POST /agent/jobs/:id/purchase`, multipart with a `cost` field and a
/// `receipt` file.
pub async fn confirm_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_FULFILL)?;
    require(&tenant, &principal, &Permission::STORAGE_UPLOAD)?;
    let order_id = order_id(&id)?;
    assigned_order(&services, &tenant, &principal, order_id)?;

    let (fields, receipt) = common::read_upload(multipart, "receipt")
        .await?
        .require_file()?;
    let cost = fields
        .get("cost")
        .map(|raw| raw.trim())
        .ok_or_else(|| errors::bad_request("missing cost field"))?
        .parse::<u64>()
        .map(Money::from_minor)
        .map_err(|_| errors::bad_request("cost must be a non-negative integer"))?;

    let path = format!(
        "{}/{}/{}.{}",
        tenant.tenant_id(),
        order_id,
        Uuid::now_v7(),
        receipt.extension()
    );
    let object = services
        .storage
        .put(Bucket::Receipts, &path, receipt.bytes, &receipt.content_type)
        .await
        .map_err(errors::storage_error_to_response)?;

    services
        .coordinator
        .confirm_purchase(tenant.tenant_id(), order_id, principal.user_id(), cost, object)
        .await
        .map_err(errors::fulfillment_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

pub async fn start_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_FULFILL)?;
    let order_id = order_id(&id)?;
    assigned_order(&services, &tenant, &principal, order_id)?;

    let cmd = OrderCommand::StartDelivery(StartDelivery {
        tenant_id: tenant.tenant_id(),
        order_id,
        agent_id: principal.user_id(),
        occurred_at: Utc::now(),
    });
    services
        .dispatch_order(tenant.tenant_id(), order_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

pub async fn confirm_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_FULFILL)?;
    let order_id = order_id(&id)?;
    assigned_order(&services, &tenant, &principal, order_id)?;

    services
        .coordinator
        .confirm_delivery(tenant.tenant_id(), order_id, principal.user_id())
        .map_err(errors::fulfillment_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

/// The caller's wallet and its ledger, newest row last.
pub async fn my_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_OWN_READ)?;

    let wallet = services
        .load_wallet(tenant.tenant_id(), principal.user_id())
        .map_err(errors::dispatch_error_to_response)?;
    if !wallet.exists() {
        return Err(errors::not_found("wallet"));
    }
    common::ok(json!({
        "wallet": dto::wallet_snapshot(&wallet),
        "transactions": wallet.transactions(),
    }))
}
