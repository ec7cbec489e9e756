use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use partsmarket_suppliers::DeliveryConfig;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

/// The caller's own supplier profile (`/supplier`).
pub fn own_router() -> Router {
    Router::new()
        .route("/", put(upsert_profile).get(get_own_profile))
        .route("/delivery", put(set_delivery))
}

/// Public supplier lookups (`/suppliers`).
pub fn router() -> Router {
    Router::new()
        .route("/:tenant_id", get(get_profile))
        .route("/:tenant_id/listings", get(get_supplier_listings))
}

pub async fn upsert_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::UpsertSupplierRequest>,
) -> axum::response::Response {
    match services
        .market
        .upsert_supplier(tenant.tenant_id(), &body.display_name, body.eur_rate)
        .await
    {
        Ok(profile) => (StatusCode::OK, Json(dto::supplier_to_json(&profile))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn get_own_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.market.supplier(tenant.tenant_id()).await {
        Ok(profile) => (StatusCode::OK, Json(dto::supplier_to_json(&profile))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn set_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(config): Json<DeliveryConfig>,
) -> axum::response::Response {
    match services.market.set_delivery_config(tenant.tenant_id(), config).await {
        Ok(profile) => (StatusCode::OK, Json(dto::supplier_to_json(&profile))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn get_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tenant_id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&tenant_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.supplier(tenant_id).await {
        Ok(profile) => (StatusCode::OK, Json(dto::supplier_to_json(&profile))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn get_supplier_listings(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tenant_id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&tenant_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.supplier_listings(tenant_id).await {
        Ok(listings) => {
            let items = listings.iter().map(dto::listing_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::market_error_to_response(e),
    }
}
