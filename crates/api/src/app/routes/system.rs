use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response, Sse, sse::Event as SseEvent},
};

use crate::app::dto::StreamQuery;
use crate::app::errors;
use crate::app::services::{self, AppServices, TOPICS};
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal
            .principal()
            .membership
            .permissions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
    }))
}

/// `GET /stream?tables=orders,wallets`: realtime changes of this tenant.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<StreamQuery>,
) -> Result<
    Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>>,
    Response,
> {
    let topics = match query.tables.as_deref() {
        None | Some("") => None,
        Some(raw) => {
            let wanted: Vec<String> = raw
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if let Some(unknown) = wanted.iter().find(|t| !TOPICS.contains(&t.as_str())) {
                return Err(errors::bad_request(format!("unknown table '{unknown}'")));
            }
            Some(wanted)
        }
    };
    Ok(services::tenant_sse_stream(services, tenant.tenant_id(), topics))
}
