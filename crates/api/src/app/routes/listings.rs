use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use partsmarket_listings::{Currency, ListingDraft};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(publish_listing))
        .route("/:id", get(get_listing))
        .route("/:id/price", post(reprice_listing))
        .route("/:id/active", post(set_listing_active))
}

pub async fn publish_listing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::PublishListingRequest>,
) -> axum::response::Response {
    let currency = match dto::parse_value::<Currency>(&body.currency) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let draft = ListingDraft {
        title: body.title,
        brand: body.brand,
        category: body.category,
        color: body.color,
        amount: body.amount,
        currency,
    };
    match services.market.publish_listing(tenant.tenant_id(), draft).await {
        Ok(listing) => (StatusCode::CREATED, Json(dto::listing_to_json(&listing))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn get_listing(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let listing_id = match dto::parse_listing_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.listing(listing_id).await {
        Ok(listing) => (StatusCode::OK, Json(dto::listing_to_json(&listing))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn reprice_listing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RepriceListingRequest>,
) -> axum::response::Response {
    let listing_id = match dto::parse_listing_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let currency = match dto::parse_value::<Currency>(&body.currency) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services
        .market
        .reprice_listing(tenant.tenant_id(), listing_id, body.amount, currency)
        .await
    {
        Ok(listing) => (StatusCode::OK, Json(dto::listing_to_json(&listing))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn set_listing_active(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetListingActiveRequest>,
) -> axum::response::Response {
    let listing_id = match dto::parse_listing_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .market
        .set_listing_active(tenant.tenant_id(), listing_id, body.active)
        .await
    {
        Ok(listing) => (StatusCode::OK, Json(dto::listing_to_json(&listing))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}
