use clap::{Parser, Subcommand};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use input_shield::config::ObservabilityConfig;
use input_shield::content::{assert_safe_document, sanitize_html};
use input_shield::egress::{assert_allowed_url, safe_fetch_json};
use input_shield::observability::init_logging;
use input_shield::policy::{EgressPolicy, SanitizationPolicy, Violation};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Check URLs and documents against the input-shield policies", long_about = None)]
struct Cli {
    /// Log filter, e.g. "input_shield=debug"
    #[arg(long, default_value = "input_shield=warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a URL against an egress allowlist without fetching it
    CheckUrl {
        url: String,
        #[arg(long = "allow-host", required = true)]
        allow_hosts: Vec<String>,
    },
    /// Run the document gate over a file
    CheckDocument { path: PathBuf },
    /// Rebuild an HTML file with the briefing-body policy and print it
    Sanitize { path: PathBuf },
    /// Fetch JSON through the egress guard and print it
    Fetch {
        url: String,
        #[arg(long = "allow-host", required = true)]
        allow_hosts: Vec<String>,
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
        #[arg(long, default_value_t = 1024 * 1024)]
        max_bytes: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&ObservabilityConfig {
        log_filter: cli.log.clone(),
        ..ObservabilityConfig::default()
    })?;

    match cli.command {
        Commands::CheckUrl { url, allow_hosts } => {
            let policy = EgressPolicy::new(allow_hosts);
            let parsed = assert_allowed_url(&url, &policy.allowed_hosts).map_err(Violation::from)?;
            println!("allowed: {parsed}");
        }
        Commands::CheckDocument { path } => {
            let source = std::fs::read_to_string(&path)?;
            assert_safe_document(&source).map_err(Violation::from)?;
            println!("ok: {}", path.display());
        }
        Commands::Sanitize { path } => {
            let html = std::fs::read_to_string(&path)?;
            println!("{}", sanitize_html(&html, &SanitizationPolicy::briefing_body()));
        }
        Commands::Fetch {
            url,
            allow_hosts,
            timeout_ms,
            max_bytes,
        } => {
            let policy = EgressPolicy::new(allow_hosts)
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_max_bytes(max_bytes);
            let value: Value = safe_fetch_json(&url, &policy, &HeaderMap::new())
                .await
                .map_err(Violation::from)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
