//! Axum middleware applying a dual-key rate limit policy.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limit::limiter::{RateDecision, RateLimiter};

/// Correlation header echoed on every rejection.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// One limit applied to one kind of identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub scope: String,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(scope: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            scope: scope.into(),
            limit,
            window,
        }
    }
}

/// Derives the resource part of a fine-grained key from a request.
pub type ResourceExtractor = Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>;

/// Middleware state: a coarse per-IP rule and an optional per-IP+resource rule.
///
/// Both rules must pass. The fine rule only applies when the extractor yields
/// a resource for the request.
#[derive(Clone)]
pub struct RateLimitGate {
    pub limiter: Arc<RateLimiter>,
    pub ip_rule: RateLimitRule,
    pub resource_rule: Option<(RateLimitRule, ResourceExtractor)>,
}

impl RateLimitGate {
    pub fn new(limiter: Arc<RateLimiter>, ip_rule: RateLimitRule) -> Self {
        Self {
            limiter,
            ip_rule,
            resource_rule: None,
        }
    }

    pub fn with_resource_rule<F>(mut self, rule: RateLimitRule, extractor: F) -> Self
    where
        F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
    {
        self.resource_rule = Some((rule, Arc::new(extractor)));
        self
    }
}

impl fmt::Debug for RateLimitGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitGate")
            .field("limiter", &self.limiter)
            .field("ip_rule", &self.ip_rule)
            .field("resource_rule", &self.resource_rule.as_ref().map(|(rule, _)| rule))
            .finish()
    }
}

/// Reject over-limit callers with 429 before the handler runs.
pub async fn rate_limit_middleware(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = request.headers().get(&X_REQUEST_ID).cloned();
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let ip_identity = format!("ip:{ip}");
    if let Err(response) = enforce(&gate.limiter, &gate.ip_rule, &ip_identity, &request_id).await {
        return response;
    }

    if let Some((rule, extractor)) = &gate.resource_rule {
        if let Some(resource) = extractor(&request) {
            let identity = format!("ip+resource:{ip}|{resource}");
            if let Err(response) = enforce(&gate.limiter, rule, &identity, &request_id).await {
                return response;
            }
        }
    }

    next.run(request).await
}

async fn enforce(
    limiter: &RateLimiter,
    rule: &RateLimitRule,
    identity: &str,
    request_id: &Option<HeaderValue>,
) -> Result<(), Response> {
    match limiter
        .check(&rule.scope, identity, rule.limit, rule.window)
        .await
    {
        Ok(decision) if decision.allowed => Ok(()),
        Ok(decision) => Err(too_many_requests(&decision, limiter.now_ms(), request_id)),
        Err(e) => {
            tracing::error!(scope = %rule.scope, error = %e, "Rate limit store failed, rejecting request");
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "rate_limit_unavailable",
                    "request_id": request_id.as_ref().and_then(|v| v.to_str().ok()),
                })),
            )
                .into_response();
            if let Some(id) = request_id {
                response.headers_mut().insert(X_REQUEST_ID, id.clone());
            }
            Err(response)
        }
    }
}

fn too_many_requests(
    decision: &RateDecision,
    now_ms: u64,
    request_id: &Option<HeaderValue>,
) -> Response {
    let retry_after = decision.retry_after(now_ms).as_secs();
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "retry_after_secs": retry_after,
            "request_id": request_id.as_ref().and_then(|v| v.to_str().ok()),
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Some(id) = request_id {
        headers.insert(X_REQUEST_ID, id.clone());
    }
    response
}
