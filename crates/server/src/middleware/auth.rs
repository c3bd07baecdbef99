//! API key authentication middleware

use axum::{
    Extension, Json,
    body::Body,
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use clinai_core::ErrorBody;

/// Header carrying the client's API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// API Key authentication state
#[derive(Clone)]
pub struct ApiKeyAuth {
    api_key: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// With no key configured every request is allowed
    fn allows(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.api_key.as_deref() else {
            return true;
        };
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|provided| provided == expected)
    }
}

/// Reject requests without a valid `X-API-Key` header
pub async fn auth_middleware(
    Extension(auth): Extension<ApiKeyAuth>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.allows(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("Invalid or missing API key")),
        )
            .into_response();
    }

    next.run(request).await
}
