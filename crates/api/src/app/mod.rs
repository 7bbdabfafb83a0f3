//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (event store/bus, projections, coordinator)
//! - `routes/`: HTTP routes + handlers (one file per marketplace area)
//! - `dto.rs`: request DTOs and response shapes
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;

use quickdrop_infra::storage::MAX_OBJECT_BYTES;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Multipart overhead allowed on top of the largest object.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: ApiConfig) -> anyhow::Result<Router> {
    let jwt = Arc::new(quickdrop_auth::Hs256JwtValidator::new(
        config.jwt_secret.as_bytes(),
    ));
    let services = Arc::new(services::build_services(&config).await?);
    // Uploaded objects are public; `<storage_dir>/<bucket>/<path>` matches the URL.
    let files = match &config.storage_dir {
        Some(dir) => Router::new().nest_service("/files", ServeDir::new(dir)),
        None => Router::new()
            .route("/files/:bucket/*path", get(routes::files::download))
            .layer(Extension(services.clone())),
    };

    let auth_state = middleware::AuthState {
        jwt,
        services: services.clone(),
    };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(files)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_OBJECT_BYTES + FORM_OVERHEAD_BYTES)),
        ))
}
