//! Bearer API key check.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::Arc;

use crate::http::response::{request_id, ApiError};
use crate::policy::constant_time_eq;

/// Expected API key, compared in constant time.
#[derive(Clone)]
pub struct ApiKeyAuth {
    expected: Arc<[u8]>,
}

impl ApiKeyAuth {
    pub fn new(api_key: &str) -> Self {
        Self {
            expected: Arc::from(api_key.as_bytes()),
        }
    }

    /// An empty configured key matches nothing.
    pub fn verify(&self, presented: &str) -> bool {
        !self.expected.is_empty() && constant_time_eq(presented.as_bytes(), &self.expected)
    }
}

impl fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuth").field("expected", &"[redacted]").finish()
    }
}

/// Reject requests without `Authorization: Bearer <key>`.
pub async fn require_api_key(
    State(auth): State<ApiKeyAuth>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if auth.verify(token) => next.run(request).await,
        _ => {
            tracing::warn!(
                path = %request.uri().path(),
                has_credentials = presented.is_some(),
                "Rejected request without a valid API key"
            );
            ApiError::unauthorized(request_id(request.headers())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let auth = ApiKeyAuth::new("s3cret");
        assert!(auth.verify("s3cret"));
        assert!(!auth.verify("s3cre"));
        assert!(!auth.verify("s3cret "));
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_empty_key_matches_nothing() {
        let auth = ApiKeyAuth::new("");
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_debug_is_redacted() {
        assert!(!format!("{:?}", ApiKeyAuth::new("s3cret")).contains("s3cret"));
    }
}
