//! Admin bearer token validation

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::ApiError;

/// Validates the static admin token presented by the dashboard
#[derive(Clone)]
pub struct AdminAuth {
    token: Arc<Vec<u8>>,
}

impl AdminAuth {
    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::new(token.as_bytes().to_vec()),
        }
    }

    /// Check a presented token against the configured one
    pub fn verify(&self, candidate: &str) -> bool {
        constant_time_compare(candidate.as_bytes(), &self.token)
    }

    /// Extract and check a `Bearer` token from an `Authorization` header value
    pub fn verify_header(&self, header: Option<&str>) -> bool {
        header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| self.verify(token.trim()))
            .unwrap_or(false)
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        // Do a dummy comparison so the mismatch path costs the same work
        let dummy = vec![0u8; a.len()];
        let _ = a.ct_eq(&dummy);
        return false;
    }

    a.ct_eq(b).into()
}

/// Middleware rejecting requests without a valid admin token
pub async fn require_admin(State(auth): State<AdminAuth>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if !auth.verify_header(header) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request: invalid token");
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}
