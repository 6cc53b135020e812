//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use input_shield::config::ShieldConfig;
use input_shield::rate_limit::RateLimiter;
use input_shield::HttpServer;

pub const API_KEY: &str = "integration-key";

/// Config with a known API key and one allowlisted egress host.
pub fn test_config() -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.security.api_key = API_KEY.to_string();
    config.egress.allowed_hosts = vec!["api.example.com".to_string()];
    config
}

/// Start the API server on an ephemeral port with an in-process limiter.
pub async fn spawn_server(config: ShieldConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::with_limiter(config, Arc::new(RateLimiter::local()));

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
