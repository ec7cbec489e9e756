use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:tenant_id", get(get_reputation))
}

pub async fn get_reputation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tenant_id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&tenant_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.market.reputation(tenant_id).await {
        Ok(reputation) => (StatusCode::OK, Json(dto::reputation_to_json(&reputation))).into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}
