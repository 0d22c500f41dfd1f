use axum::{routing::get, Router};

pub mod common;
pub mod orders;
pub mod pools;
pub mod products;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/orders", orders::router())
        .nest("/products", products::router())
        .nest("/pools", pools::router())
}
