use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use partsmarket_core::{TenantId, UserId};

use crate::context::TenantContext;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Derive the [`TenantContext`] from the gateway headers.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id: TenantId = header(req.headers(), TENANT_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id = match header(req.headers(), USER_HEADER) {
        Some(raw) => Some(raw.parse::<UserId>().map_err(|_| StatusCode::BAD_REQUEST)?),
        None => None,
    };

    req.extensions_mut()
        .insert(TenantContext::new(tenant_id, user_id));

    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct AdminState {
    /// `None` disables the admin routes entirely.
    pub token: Option<Arc<str>>,
}

pub async fn admin_middleware(
    State(state): State<AdminState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = state.token.as_deref().ok_or(StatusCode::NOT_FOUND)?;
    let presented = header(req.headers(), ADMIN_TOKEN_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;

    if !constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison_requires_exact_match() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
    }
}
