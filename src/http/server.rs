//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Guard `/v1` with the rate limiter, then the API key
//! - Bind server to listener and shut down gracefully

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ShieldConfig;
use crate::content;
use crate::egress::EgressGuard;
use crate::http::auth::{require_api_key, ApiKeyAuth};
use crate::http::response::{request_id, ApiError};
use crate::policy::{EgressPolicy, SanitizationPolicy, Violation};
use crate::rate_limit::{rate_limit_middleware, RateLimitGate, RateLimitRule, RateLimiter, X_REQUEST_ID};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub egress: Arc<EgressGuard>,
    pub sanitization: Arc<SanitizationPolicy>,
    pub expose_violation_details: bool,
}

impl AppState {
    pub fn from_config(config: &ShieldConfig) -> Self {
        let policy = EgressPolicy::new(&config.egress.allowed_hosts)
            .with_timeout(Duration::from_millis(config.egress.timeout_ms))
            .with_max_bytes(config.egress.max_bytes);
        Self {
            egress: Arc::new(EgressGuard::new(policy)),
            sanitization: Arc::new(SanitizationPolicy::briefing_body()),
            expose_violation_details: config.security.expose_violation_details,
        }
    }

    fn reject(&self, violation: impl Into<Violation>, headers: &HeaderMap) -> Response {
        ApiError::violation(&violation.into(), self.expose_violation_details, request_id(headers))
            .into_response()
    }
}

/// HTTP server for the shield API.
pub struct HttpServer {
    router: Router,
    config: Arc<ShieldConfig>,
}

impl HttpServer {
    /// Create a server, connecting the configured rate limit store.
    pub async fn new(config: ShieldConfig) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit).await);
        Self::with_limiter(config, limiter)
    }

    pub fn with_limiter(config: ShieldConfig, limiter: Arc<RateLimiter>) -> Self {
        tracing::info!(backend = limiter.backend(), "Rate limiter ready");
        let router = build_router(&config, limiter);
        Self {
            router,
            config: Arc::new(config),
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        // Client IPs for rate limiting come from the socket.
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &ShieldConfig, limiter: Arc<RateLimiter>) -> Router {
    let limits = &config.rate_limit;
    let gate = RateLimitGate::new(
        limiter,
        RateLimitRule::new("api", limits.ip_limit, Duration::from_secs(limits.ip_window_secs)),
    )
    .with_resource_rule(
        RateLimitRule::new(
            "api-route",
            limits.resource_limit,
            Duration::from_secs(limits.resource_window_secs),
        ),
        |request: &Request| Some(request.uri().path().to_string()),
    );

    let v1 = Router::new()
        .route("/documents/validate", post(validate_document))
        .route("/html/sanitize", post(sanitize_html))
        .route("/egress/check", post(check_egress_url))
        .route_layer(from_fn_with_state(
            ApiKeyAuth::new(&config.security.api_key),
            require_api_key,
        ))
        // Outermost, so failed key guesses spend quota too.
        .route_layer(from_fn_with_state(gate, rate_limit_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", v1)
        .with_state(AppState::from_config(config))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(&X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.listener.request_timeout_secs,
                ))),
        )
}

async fn health() -> &'static str {
    "ok"
}

async fn validate_document(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    match content::assert_safe_document(&body) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(violation) => state.reject(violation, &headers),
    }
}

async fn sanitize_html(State(state): State<AppState>, body: String) -> Response {
    let html = content::sanitize_html(&body, &state.sanitization);
    ([(CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

#[derive(Debug, Deserialize)]
struct EgressCheckRequest {
    url: String,
}

async fn check_egress_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EgressCheckRequest>,
) -> Response {
    match state.egress.check_url(&request.url) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(violation) => state.reject(violation, &headers),
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn config() -> ShieldConfig {
        let mut config = ShieldConfig::default();
        config.security.api_key = "test-key".into();
        config.egress.allowed_hosts = vec!["api.example.com".into()];
        config
    }

    fn app() -> Router {
        build_router(&config(), Arc::new(RateLimiter::local()))
    }

    fn post(path: &str, body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri(path)
            .header("authorization", "Bearer test-key")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let res = app()
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(&X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_egress_check() {
        let ok = app()
            .oneshot(post("/v1/egress/check", r#"{"url":"https://api.example.com/v1"}"#))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);

        let denied = app()
            .oneshot(post("/v1/egress/check", r#"{"url":"https://evil.example.net/"}"#))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_sanitize_returns_html() {
        let res = app()
            .oneshot(post("/v1/html/sanitize", "<p onclick=x>hi</p><script>1</script>"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<p>hi</p>");
    }
}
