use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;

use quickdrop_auth::{Permission, Role, authorize};
use quickdrop_catalog::{ProductId, ProductStatus, StoreId};
use quickdrop_core::{AggregateId, UserId};
use quickdrop_orders::{Cart, CancelActor, Order, OrderId, OrderStatus};

use crate::app::dto::{self, CheckoutRequest, OrdersQuery, ReasonRequest};
use crate::app::errors;
use crate::app::routes::common::{self, HandlerResult};
use crate::app::services::AppServices;
use crate::authz::{require, require_any};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
}

pub(crate) fn order_id(raw: &str) -> Result<OrderId, Response> {
    common::parse_aggregate_id(raw, "order").map(OrderId::new)
}

fn holds(principal: &PrincipalContext, permission: &Permission) -> bool {
    authorize(principal.principal(), permission).is_ok()
}

fn owns_store(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    store_id: StoreId,
) -> bool {
    services
        .load_store(tenant.tenant_id(), store_id)
        .ok()
        .and_then(|s| s.owner_id())
        .is_some_and(|owner| owner == principal.user_id())
}

/// Who may see an order: admins, its customer, its agent, the owner of its
/// store, and agents browsing open jobs.
fn can_view(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    customer_id: UserId,
    store_id: StoreId,
    agent_id: Option<UserId>,
    open_job: bool,
) -> bool {
    let me = principal.user_id();
    holds(principal, &Permission::ORDERS_ADMIN)
        || (customer_id == me && holds(principal, &Permission::ORDERS_OWN_READ))
        || (agent_id == Some(me) && holds(principal, &Permission::ORDERS_JOBS_READ))
        || (open_job && holds(principal, &Permission::ORDERS_JOBS_READ))
        || (holds(principal, &Permission::ORDERS_STORE_READ)
            && owns_store(services, tenant, principal, store_id))
}

/// `POST /checkout`: price the submitted lines from the catalog and place
/// the order.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CheckoutRequest>,
) -> HandlerResult {
    require(&tenant, &principal, &Permission::ORDERS_PLACE)?;
    let tenant_id = tenant.tenant_id();
    let store_id = StoreId::new(common::parse_aggregate_id(&body.store_id, "store")?);

    if body.lines.is_empty() {
        return Err(errors::bad_request("checkout needs at least one line"));
    }
    let store = services
        .load_store(tenant_id, store_id)
        .map_err(errors::dispatch_error_to_response)?;
    if store.owner_id().is_none() {
        return Err(errors::not_found("store"));
    }
    if !store.accepts_orders() {
        return Err(errors::rejected("store is not accepting orders"));
    }

    let mut cart = Cart::new();
    for line in &body.lines {
        let product_id = ProductId::new(common::parse_aggregate_id(&line.product_id, "product")?);
        let Some(product) = services.products.get(tenant_id, &product_id) else {
            return Err(errors::rejected(format!("product {product_id} does not exist")));
        };
        if product.store_id != store_id {
            return Err(errors::rejected(format!(
                "product {product_id} belongs to another store"
            )));
        }
        if product.status != ProductStatus::Active || !product.available {
            return Err(errors::rejected(format!(
                "product {product_id} is not available"
            )));
        }
        cart.add(store_id, product_id, product.name, product.price, line.quantity)
            .map_err(errors::domain_error_to_response)?;
    }

    let order_id = OrderId::new(AggregateId::new());
    let cmd = cart
        .into_place_order(
            tenant_id,
            order_id,
            principal.user_id(),
            body.delivery_address,
            body.notes,
            services.settings.delivery_fee,
            Utc::now(),
        )
        .map_err(errors::domain_error_to_response)?;
    services
        .dispatch_order(tenant_id, order_id, cmd)
        .map_err(errors::dispatch_error_to_response)?;

    let order = services
        .load_order(tenant_id, order_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::created(dto::order_snapshot(&order))
}

/// `GET /orders?status=`: everything the caller's roles can see.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<OrdersQuery>,
) -> HandlerResult {
    require_any(
        &tenant,
        &principal,
        &[
            Permission::ORDERS_ADMIN,
            Permission::ORDERS_OWN_READ,
            Permission::ORDERS_STORE_READ,
            Permission::ORDERS_JOBS_READ,
        ],
    )?;
    let status = match query.status.as_deref() {
        Some(raw) => Some(raw.parse::<OrderStatus>().map_err(errors::domain_error_to_response)?),
        None => None,
    };
    let tenant_id = tenant.tenant_id();
    let me = principal.user_id();

    let orders = if holds(&principal, &Permission::ORDERS_ADMIN) {
        services.orders.list_where(tenant_id, |_| true)
    } else {
        let my_stores: HashSet<StoreId> = if principal.has_role(&Role::STORE)
            && holds(&principal, &Permission::ORDERS_STORE_READ)
        {
            services
                .stores
                .owned_by(tenant_id, me)
                .into_iter()
                .map(|s| s.store_id)
                .collect()
        } else {
            HashSet::new()
        };
        let own = holds(&principal, &Permission::ORDERS_OWN_READ);
        let jobs = holds(&principal, &Permission::ORDERS_JOBS_READ);

        services.orders.list_where(tenant_id, |o| {
            (own && o.customer_id == me)
                || (jobs && o.agent_id == Some(me))
                || my_stores.contains(&o.store_id)
        })
    };

    let orders = orders
        .into_iter()
        .filter(|o| status.is_none_or(|s| o.status == s))
        .collect();
    common::list(orders)
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let tenant_id = tenant.tenant_id();

    if let Some(rm) = services.orders.get(tenant_id, &order_id) {
        let open_job = rm.status == OrderStatus::Pending && rm.agent_id.is_none();
        let visible = can_view(
            &services,
            &tenant,
            &principal,
            rm.customer_id,
            rm.store_id,
            rm.agent_id,
            open_job,
        );
        if visible {
            return common::ok(rm);
        }
        return Err(errors::not_found("order"));
    }

    // Not projected yet: answer from the stream itself.
    let order = visible_order(&services, &tenant, &principal, order_id)?;
    common::ok(dto::order_snapshot(&order))
}

fn visible_order(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    order_id: OrderId,
) -> Result<Order, Response> {
    let order = services
        .load_order(tenant.tenant_id(), order_id)
        .map_err(errors::dispatch_error_to_response)?;
    let (Some(customer_id), Some(store_id)) = (order.customer_id(), order.store_id()) else {
        return Err(errors::not_found("order"));
    };
    if !can_view(
        services,
        tenant,
        principal,
        customer_id,
        store_id,
        order.agent_id(),
        order.is_open_job(),
    ) {
        return Err(errors::not_found("order"));
    }
    Ok(order)
}

/// `POST /orders/:id/cancel`. Customers cancel their own pending orders,
/// stores reject pending orders of their store, admins cancel anything up
/// to `cash_approved`. Any cash already advanced is reversed.
pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReasonRequest>,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let me = principal.user_id();

    let order = visible_order(&services, &tenant, &principal, order_id)?;
    let actor = if holds(&principal, &Permission::ORDERS_ADMIN) {
        CancelActor::Admin { user_id: me }
    } else if order.customer_id() == Some(me)
        && holds(&principal, &Permission::ORDERS_OWN_CANCEL)
    {
        CancelActor::Customer { user_id: me }
    } else if let Some(store_id) = order.store_id().filter(|s| {
        holds(&principal, &Permission::ORDERS_STORE_REJECT)
            && owns_store(&services, &tenant, &principal, *s)
    }) {
        CancelActor::Store { user_id: me, store_id }
    } else {
        return Err(errors::forbidden("not allowed to cancel this order"));
    };

    services
        .coordinator
        .cancel_order(tenant_id, order_id, actor, body.reason)
        .map_err(errors::fulfillment_error_to_response)?;

    let order = services
        .load_order(tenant_id, order_id)
        .map_err(errors::dispatch_error_to_response)?;
    common::ok(dto::order_snapshot(&order))
}
