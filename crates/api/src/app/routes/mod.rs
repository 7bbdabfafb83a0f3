use axum::{Router, routing::get};

pub mod admin;
pub mod agent;
pub mod categories;
pub mod common;
pub mod files;
pub mod orders;
pub mod products;
pub mod stores;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/stores", stores::router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .merge(orders::router())
        .nest("/agent", agent::router())
        .nest("/admin", admin::router())
}
