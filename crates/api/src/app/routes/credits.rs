use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

const DEFAULT_LEDGER_PAGE: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_balance))
        .route("/ledger", get(get_ledger))
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.market.account(tenant.tenant_id()).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "tenant_id": account.tenant_id().to_string(),
                "balance": account.balance(),
                "updated_at": account.updated_at(),
            })),
        )
            .into_response(),
        Err(e) => errors::market_error_to_response(e),
    }
}

pub async fn get_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::LedgerQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_LEDGER_PAGE);
    match services.market.ledger(tenant.tenant_id(), limit).await {
        Ok(entries) => {
            let items = entries.iter().map(dto::ledger_entry_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::market_error_to_response(e),
    }
}
