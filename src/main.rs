//! input-shield API server.
//!
//! ```text
//!     Client ──▶ request id ─▶ trace ─▶ timeout ─▶ body limit
//!                                                     │
//!                      /health ◀──────────────────────┤
//!                                                     ▼
//!                                   /v1: API key ─▶ rate limit ─▶ handler
//!                                                                   │
//!                     ┌───────────────────┬─────────────────────────┤
//!                     ▼                   ▼                         ▼
//!              document gate        HTML rebuilder           egress URL check
//! ```
//!
//! Configuration comes from the TOML file named by `SHIELD_CONFIG`, or
//! defaults, with `SHIELD_API_KEY` and `SHIELD_REDIS_URL` overriding.

use std::net::SocketAddr;
use tokio::net::TcpListener;

use input_shield::config::load_from_env;
use input_shield::observability::{init_logging, init_metrics};
use input_shield::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_from_env()?;
    init_logging(&config.observability)?;

    tracing::info!("input-shield v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        rate_limit_backend = ?config.rate_limit.backend,
        egress_hosts = config.egress.allowed_hosts.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config).await;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
