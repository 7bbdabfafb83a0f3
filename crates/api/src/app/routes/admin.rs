//! Admin routes: accounts, agent onboarding, wallets and cash approvals.
//!
//! Every handler checks its own permission. Role changes carry the caller's
//! roles so the `User` aggregate can refuse privilege escalation.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use quickdrop_agents::AgentProfileCommand;
use quickdrop_agents::WalletCommand;
use quickdrop_agents::profile::{ApproveAgent, SuspendAgent};
use quickdrop_agents::wallet::{
    AdjustBalance, FreezeWallet, OpenWallet, RecordRemittance, SetLimit, UnfreezeWallet,
};
use quickdrop_auth::user::{ActivateUser, AssignRole, CreateUser, RevokeRole, SuspendUser};
use quickdrop_auth::{Permission, Role, User, UserCommand};
use quickdrop_core::{Money, UserId};
use quickdrop_infra::projections::ProductFilter;
use quickdrop_orders::order::RejectCash;
use quickdrop_orders::{OrderCommand, OrderId};

use crate::app::dto::{
    self, AdjustRequest, AgentsQuery, ApproveCashRequest, AssignJobRequest, AssignRoleRequest,
    CreateUserRequest, OpenWalletRequest, ReasonRequest, RemittanceRequest, SetLimitRequest,
    UsersQuery,
};
use crate::app::errors;
use crate::app::routes::common::{self, HandlerResult};
use crate::app::routes::orders::order_id;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id/permissions", get(inspect_permissions))
        .route("/users/:id/roles", post(assign_role))
        .route("/users/:id/roles/:role", delete(revoke_role))
        .route("/users/:id/suspend", post(suspend_user))
        .route("/users/:id/activate", post(activate_user))
        .route("/agents", get(list_agents))
        .route("/agents/:id/approve", post(approve_agent))
        .route("/agents/:id/suspend", post(suspend_agent))
        .route("/agents/:id/wallet", post(open_wallet))
        .route("/wallets", get(list_wallets))
        .route("/wallets/:agent_id", get(get_wallet))
        .route("/wallets/:agent_id/limit", post(set_limit))
        .route("/wallets/:agent_id/freeze", post(freeze_wallet))
        .route("/wallets/:agent_id/unfreeze", post(unfreeze_wallet))
        .route("/wallets/:agent_id/remittance", post(record_remittance))
        .route("/wallets/:agent_id/adjust", post(adjust_wallet))
        .route("/orders/:id/assign", post(assign_order))
        .route("/orders/:id/approve-cash", post(approve_cash))
        .route("/orders/:id/reject-cash", post(reject_cash))
        .route("/stats", get(stats))
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

fn parse_role(raw: &str) -> Result<Role, Response> {
    let role = Role::new(raw.trim().to_ascii_lowercase());
    if !role.is_known() {
        return Err(errors::bad_request(format!("unknown role '{raw}'")));
    }
    Ok(role)
}

fn user_snapshot(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "email": user.email,
        "display_name": user.display_name,
        "phone": user.phone,
        "roles": user.roles,
        "status": user.status,
    })
}

fn dispatch_user_and_describe(
    services: &AppServices,
    tenant: &TenantContext,
    user_id: UserId,
    cmd: UserCommand,
) -> HandlerResult {
    services
        .dispatch_user(tenant.tenant_id(), user_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    let user = services
        .load_user(tenant.tenant_id(), user_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(user_snapshot(&user))
}

/// `POST /admin/users`. The id may be supplied so accounts can mirror an
/// external identity provider's subject.
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateUserRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;

    let user_id = match body.user_id.as_deref() {
        Some(raw) => common::parse_user_id(raw)?,
        None => UserId::new(),
    };
    let initial_roles = body
        .roles
        .iter()
        .map(|r| parse_role(r))
        .collect::<Result<Vec<_>, _>>()?;
    if services
        .users
        .get_by_email(tenant.tenant_id(), &body.email)
        .is_some()
    {
        return Err(errors::json_error(
            StatusCode::CONFLICT,
            "conflict",
            "email already registered",
        ));
    }

    let cmd = UserCommand::Create(CreateUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        email: body.email,
        display_name: body.display_name,
        phone: body.phone,
        initial_roles,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_user(tenant.tenant_id(), user_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    let user = services
        .load_user(tenant.tenant_id(), user_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::created(user_snapshot(&user))
}

/// `GET /admin/users?role=`
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<UsersQuery>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let role = match query.role.as_deref() {
        Some(raw) => Some(parse_role(raw)?),
        None => None,
    };
    common::list(services.users.list(tenant.tenant_id(), role.as_ref()))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let user_id = common::parse_user_id(&id)?;

    let user = services
        .load_user(tenant.tenant_id(), user_id)
        .map_err(errors::dispatch_error_to_response)?;
    if !user.created {
        return Err(errors::not_found("user"));
    }
    common::ok(user_snapshot(&user))
}

/// Effective permissions of a user, as resolved from their roles.
pub async fn inspect_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let user_id = common::parse_user_id(&id)?;

    let Some(user) = services.users.get(tenant.tenant_id(), &user_id) else {
        return Err(errors::not_found("user"));
    };
    let mut permissions: Vec<String> = user
        .effective_permissions()
        .iter()
        .map(ToString::to_string)
        .collect();
    permissions.sort();
    permissions.dedup();

    common::ok(json!({
        "user_id": user.user_id,
        "roles": user.roles,
        "permissions": permissions,
    }))
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let user_id = common::parse_user_id(&id)?;

    let cmd = UserCommand::AssignRole(AssignRole {
        tenant_id: tenant.tenant_id(),
        user_id,
        role: parse_role(&body.role)?,
        actor_roles: principal.roles().to_vec(),
        occurred_at: Utc::now(),
    });
    dispatch_user_and_describe(&services, &tenant, user_id, cmd)
}

pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, role)): Path<(String, String)>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let user_id = common::parse_user_id(&id)?;

    let cmd = UserCommand::RevokeRole(RevokeRole {
        tenant_id: tenant.tenant_id(),
        user_id,
        role: parse_role(&role)?,
        occurred_at: Utc::now(),
    });
    dispatch_user_and_describe(&services, &tenant, user_id, cmd)
}

/// Suspended users are turned away by the auth middleware on their next
/// request.
pub async fn suspend_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let user_id = common::parse_user_id(&id)?;
    if user_id == principal.user_id() {
        return Err(errors::rejected("admins cannot suspend themselves"));
    }

    let cmd = UserCommand::Suspend(SuspendUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_user_and_describe(&services, &tenant, user_id, cmd)
}

pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::USERS_ADMIN)?;
    let user_id = common::parse_user_id(&id)?;

    let cmd = UserCommand::Activate(ActivateUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        occurred_at: Utc::now(),
    });
    dispatch_user_and_describe(&services, &tenant, user_id, cmd)
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_agents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AgentsQuery>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::AGENTS_ADMIN)?;
    common::list(services.agents.list(tenant.tenant_id(), query.status))
}

fn dispatch_profile_and_describe(
    services: &AppServices,
    tenant: &TenantContext,
    agent_id: UserId,
    cmd: AgentProfileCommand,
) -> HandlerResult {
    services
        .dispatch_profile(tenant.tenant_id(), agent_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    let profile = services
        .load_profile(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(json!({
        "agent_id": agent_id,
        "full_name": profile.full_name(),
        "status": profile.status(),
        "online": profile.is_online(),
    }))
}

pub async fn approve_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::AGENTS_ADMIN)?;
    let agent_id = common::parse_user_id(&id)?;

    let cmd = AgentProfileCommand::Approve(ApproveAgent {
        tenant_id: tenant.tenant_id(),
        agent_id,
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    dispatch_profile_and_describe(&services, &tenant, agent_id, cmd)
}

pub async fn suspend_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::AGENTS_ADMIN)?;
    let agent_id = common::parse_user_id(&id)?;

    let cmd = AgentProfileCommand::Suspend(SuspendAgent {
        tenant_id: tenant.tenant_id(),
        agent_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_profile_and_describe(&services, &tenant, agent_id, cmd)
}

/// `POST /admin/agents/:id/wallet`; the body is optional and defaults the
/// limit to `DEFAULT_WALLET_LIMIT`.
pub async fn open_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&id)?;
    let body: OpenWalletRequest = common::optional_json(&body)?;

    let profile = services
        .load_profile(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    if !profile.exists() {
        return Err(errors::not_found("agent"));
    }

    let limit = body
        .limit
        .map(Money::from_minor)
        .unwrap_or(services.settings.default_wallet_limit);
    let cmd = WalletCommand::Open(OpenWallet {
        tenant_id: tenant.tenant_id(),
        agent_id,
        limit,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_wallet(tenant.tenant_id(), agent_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    let wallet = services
        .load_wallet(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::created(dto::wallet_snapshot(&wallet))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallets
// ─────────────────────────────────────────────────────────────────────────────

fn dispatch_wallet_and_describe(
    services: &AppServices,
    tenant: &TenantContext,
    agent_id: UserId,
    cmd: WalletCommand,
) -> HandlerResult {
    services
        .dispatch_wallet(tenant.tenant_id(), agent_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    let wallet = services
        .load_wallet(tenant.tenant_id(), agent_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(dto::wallet_snapshot(&wallet))
}

pub async fn list_wallets(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    common::list(services.wallets.list(tenant.tenant_id()))
}

pub async fn get_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(agent_id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&agent_id)?;

    let Some(wallet) = services.wallets.get(tenant.tenant_id(), &agent_id) else {
        return Err(errors::not_found("wallet"));
    };
    let transactions = services.wallets.transactions_for(tenant.tenant_id(), agent_id);
    common::ok(json!({
        "wallet": wallet,
        "transactions": transactions,
    }))
}

pub async fn set_limit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(agent_id): Path<String>,
    Json(body): Json<SetLimitRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&agent_id)?;

    let cmd = WalletCommand::SetLimit(SetLimit {
        tenant_id: tenant.tenant_id(),
        limit: Money::from_minor(body.limit),
        occurred_at: Utc::now(),
    });
    dispatch_wallet_and_describe(&services, &tenant, agent_id, cmd)
}

pub async fn freeze_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(agent_id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&agent_id)?;

    let cmd = WalletCommand::Freeze(FreezeWallet {
        tenant_id: tenant.tenant_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_wallet_and_describe(&services, &tenant, agent_id, cmd)
}

pub async fn unfreeze_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(agent_id): Path<String>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&agent_id)?;

    let cmd = WalletCommand::Unfreeze(UnfreezeWallet {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    dispatch_wallet_and_describe(&services, &tenant, agent_id, cmd)
}

/// Cash the agent handed back to the company.
pub async fn record_remittance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(agent_id): Path<String>,
    Json(body): Json<RemittanceRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&agent_id)?;

    let cmd = WalletCommand::RecordRemittance(RecordRemittance {
        tenant_id: tenant.tenant_id(),
        transaction_id: Uuid::now_v7(),
        amount: Money::from_minor(body.amount),
        note: body.note,
        occurred_at: Utc::now(),
    });
    dispatch_wallet_and_describe(&services, &tenant, agent_id, cmd)
}

pub async fn adjust_wallet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(agent_id): Path<String>,
    Json(body): Json<AdjustRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let agent_id = common::parse_user_id(&agent_id)?;

    let cmd = WalletCommand::Adjust(AdjustBalance {
        tenant_id: tenant.tenant_id(),
        transaction_id: Uuid::now_v7(),
        amount: body.amount,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_wallet_and_describe(&services, &tenant, agent_id, cmd)
}

// ─────────────────────────────────────────────────────────────────────────────
// Orders
// ─────────────────────────────────────────────────────────────────────────────

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

/// Hand a pending order to a specific agent, with the same checks an agent
/// accepting it would face.
pub async fn assign_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignJobRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_ADMIN)?;
    let order_id = order_id(&id)?;
    let agent_id = common::parse_user_id(&body.agent_id)?;

    services
        .coordinator
        .accept_job(tenant.tenant_id(), order_id, agent_id, body.purchase_type)
        .map_err(errors::fulfillment_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

/// Approve a cash request. Without an `amount` the requested amount is
/// advanced.
pub async fn approve_cash(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_ADMIN)?;
    require(&tenant, &principal, &Permission::WALLETS_ADMIN)?;
    let order_id = order_id(&id)?;
    let body: ApproveCashRequest = common::optional_json(&body)?;

    let amount = match body.amount {
        Some(amount) => Money::from_minor(amount),
        None => {
            let order = services
                .load_order(tenant.tenant_id(), order_id)
                .map_err(errors::dispatch_error_to_response)?;
            if !order.exists() {
                return Err(errors::not_found("order"));
            }
            order
                .cash_requested()
                .ok_or_else(|| errors::rejected("no cash was requested for this order"))?
        }
    };

    services
        .coordinator
        .approve_cash(tenant.tenant_id(), order_id, principal.user_id(), amount)
        .map_err(errors::fulfillment_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

pub async fn reject_cash(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_ADMIN)?;
    let order_id = order_id(&id)?;

    let cmd = OrderCommand::RejectCash(RejectCash {
        tenant_id: tenant.tenant_id(),
        order_id,
        rejected_by: principal.user_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    services
        .dispatch_order(tenant.tenant_id(), order_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;
    order_response(&services, &tenant, order_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────────────────────────────────────

/// Row counts for the dashboard. Read models only, so freshly written rows
/// may lag.
pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::STATS_READ)?;
    let tenant_id = tenant.tenant_id();

    let orders = services.orders.list_where(tenant_id, |_| true);
    let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
    for order in &orders {
        *by_status.entry(order.status.as_str()).or_default() += 1;
    }

    let products = services.products.list(
        tenant_id,
        ProductFilter {
            include_unavailable: true,
            ..ProductFilter::default()
        },
    );

    common::ok(json!({
        "orders": {
            "total": orders.len(),
            "by_status": by_status,
        },
        "stores": services.stores.list(tenant_id).len(),
        "products": products.len(),
        "agents": services.agents.list(tenant_id, None).len(),
        "users": services.users.list(tenant_id, None).len(),
        "outstanding_cash": services.wallets.outstanding_cash(tenant_id),
    }))
}
