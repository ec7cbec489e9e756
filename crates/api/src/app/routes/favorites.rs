use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_favorites).post(add_favorite))
        .route("/:supplier_id", delete(remove_favorite))
}

pub async fn list_favorites(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.market.favorites(tenant.tenant_id()).await {
        Ok(favorites) => {
            let items = favorites.iter().map(dto::favorite_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn add_favorite(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::AddFavoriteRequest>,
) -> axum::response::Response {
    let supplier_id = match dto::parse_tenant_id(&body.supplier_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.add_favorite(tenant.tenant_id(), supplier_id).await {
        Ok(favorite) => (StatusCode::OK, Json(dto::favorite_to_json(&favorite))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn remove_favorite(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(supplier_id): Path<String>,
) -> axum::response::Response {
    let supplier_id = match dto::parse_tenant_id(&supplier_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.remove_favorite(tenant.tenant_id(), supplier_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}
