use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use quickdrop_auth::{JwtValidator, UserStatus, principal_from_claims};

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub services: Arc<AppServices>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).ok_or_else(unauthenticated)?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        unauthenticated()
    })?;

    // Tokens outlive suspensions; the directory has the final say.
    let suspended = state
        .services
        .users
        .get(claims.tenant_id, &claims.sub)
        .is_some_and(|u| u.status == UserStatus::Suspended);
    if suspended {
        return Err(json_error(
            StatusCode::FORBIDDEN,
            "account_suspended",
            "this account is suspended",
        ));
    }

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(principal_from_claims(&claims)));

    Ok(next.run(req).await)
}

fn unauthenticated() -> Response {
    json_error(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "missing or invalid bearer token",
    )
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
