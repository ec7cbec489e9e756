//! Platform administration: credit top-ups and manual corrections.
//!
//! Mounted under `/admin` behind the admin token check rather than the
//! tenant header, since the operator acts on arbitrary tenants.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/credits/:tenant_id", post(grant_credits))
        .route("/credits/:tenant_id/adjust", post(adjust_credits))
}

pub async fn grant_credits(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tenant_id): Path<String>,
    Json(body): Json<dto::GrantCreditsRequest>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&tenant_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.grant_credits(tenant_id, body.amount, body.reference).await {
        Ok(entry) => (StatusCode::CREATED, Json(dto::ledger_entry_to_json(&entry))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn adjust_credits(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tenant_id): Path<String>,
    Json(body): Json<dto::AdjustCreditsRequest>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&tenant_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.adjust_credits(tenant_id, body.delta, &body.note).await {
        Ok(entry) => (StatusCode::CREATED, Json(dto::ledger_entry_to_json(&entry))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}
