use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use partsmarket_infra::{ErrorKind, MarketError};

/// HTTP status for each stable error code.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidTransition | ErrorKind::OrderAlreadyClosed => StatusCode::CONFLICT,
        ErrorKind::InsufficientCredits | ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::NoDeliveryOption => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn market_error_to_response(err: MarketError) -> axum::response::Response {
    let kind = err.kind();
    if kind == ErrorKind::StorageUnavailable {
        tracing::error!(error = %err, "storage unavailable");
    }
    json_error(status_for(kind), kind.as_str(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_failures_are_payment_required() {
        assert_eq!(status_for(ErrorKind::InsufficientCredits), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(status_for(ErrorKind::InsufficientFunds), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(status_for(ErrorKind::OrderAlreadyClosed), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NoDeliveryOption), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
