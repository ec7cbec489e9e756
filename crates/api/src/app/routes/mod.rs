use axum::{routing::get, Router};

pub mod admin;
pub mod credits;
pub mod favorites;
pub mod listings;
pub mod orders;
pub mod reputation;
pub mod suppliers;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/orders", orders::router())
        .nest("/credits", credits::router())
        .nest("/supplier", suppliers::own_router())
        .nest("/suppliers", suppliers::router())
        .nest("/listings", listings::router())
        .nest("/favorites", favorites::router())
        .nest("/reputation", reputation::router())
}
