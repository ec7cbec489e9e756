//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store backend, event bus and marketplace service
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use partsmarket_infra::MarketplaceConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &MarketplaceConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_router(services, config.admin_token.clone()))
}

/// Router over already built services; `main.rs` keeps its own handle to
/// them for the background workers.
pub fn build_router(services: Arc<services::AppServices>, admin_token: Option<String>) -> Router {
    let admin_state = middleware::AdminState {
        token: admin_token.map(Arc::from),
    };

    // Tenant routes: require the tenant header.
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn(middleware::tenant_middleware));

    // Operator routes: require the admin token, no tenant context.
    let admin = routes::admin::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            admin_state,
            middleware::admin_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/admin", admin)
        .merge(protected)
        .layer(ServiceBuilder::new())
}
