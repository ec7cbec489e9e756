use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use partsmarket_core::PartyRole;
use partsmarket_infra::NewOrder;
use partsmarket_orders::OrderStatus;
use partsmarket_reputation::RatingValue;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/history", get(order_history))
        .route("/:id/offer", post(offer_order))
        .route("/:id/reject", post(reject_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/complete", post(complete_order))
        .route("/:id/rating", post(rate_order).get(order_ratings))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let listing_id = match dto::parse_listing_id(&body.listing_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let input = NewOrder {
        listing_id,
        quantity: body.quantity,
        buyer_city: body.buyer_city,
    };
    match services.market.create_order(tenant.tenant_id(), input).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::order_to_json(&order, &services.sla()))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> axum::response::Response {
    let role = match dto::parse_optional::<PartyRole>(query.role.as_deref()) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let status = match dto::parse_optional::<OrderStatus>(query.status.as_deref()) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.market.list_orders(tenant.tenant_id(), role, status).await {
        Ok(orders) => {
            let sla = services.sla();
            let items = orders
                .iter()
                .map(|o| dto::order_to_json(o, &sla))
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.order(tenant.tenant_id(), order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order, &services.sla()))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn order_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.order_history(tenant.tenant_id(), order_id).await {
        Ok(events) => (StatusCode::OK, Json(serde_json::json!({ "items": events }))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

/// Which transition a POST on `/orders/:id/<action>` performs.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Offer,
    Reject,
    Confirm,
    Cancel,
    Complete,
}

async fn transition(
    services: Arc<AppServices>,
    tenant: TenantContext,
    id: String,
    transition: Transition,
    reason: Option<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let market = &services.market;
    let actor = tenant.tenant_id();
    let result = match transition {
        Transition::Offer => market.offer(actor, order_id).await,
        Transition::Reject => market.reject(actor, order_id, reason).await,
        Transition::Confirm => market.confirm(actor, order_id).await,
        Transition::Cancel => market.cancel(actor, order_id, reason).await,
        Transition::Complete => market.complete(actor, order_id).await,
    };

    match result {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order, &services.sla()))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn offer_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(services, tenant, id, Transition::Offer, None).await
}

pub async fn reject_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> axum::response::Response {
    let reason = body.and_then(|Json(b)| b.reason);
    transition(services, tenant, id, Transition::Reject, reason).await
}

pub async fn confirm_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(services, tenant, id, Transition::Confirm, None).await
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> axum::response::Response {
    let reason = body.and_then(|Json(b)| b.reason);
    transition(services, tenant, id, Transition::Cancel, reason).await
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(services, tenant, id, Transition::Complete, None).await
}

pub async fn rate_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RateOrderRequest>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let value = match dto::parse_value::<RatingValue>(&body.value) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .market
        .rate(tenant.tenant_id(), tenant.user_id(), order_id, value, body.comment)
        .await
    {
        Ok(receipt) => {
            // A repeated rating is not an error: the stored one is returned.
            let status = if receipt.created { StatusCode::CREATED } else { StatusCode::OK };
            (
                status,
                Json(serde_json::json!({
                    "rating": dto::rating_to_json(&receipt.rating),
                    "created": receipt.created,
                    "reputation": dto::reputation_to_json(&receipt.reputation),
                })),
            )
                .into_response()
        }
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn order_ratings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match dto::parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.order_ratings(tenant.tenant_id(), order_id).await {
        Ok(ratings) => {
            let items = ratings.iter().map(dto::rating_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::market_error_to_response(e),
    }
}
