//! Guarded JSON fetch.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, HOST, LOCATION};
use reqwest::{redirect, Client};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use url::{Host, Url};

use crate::egress::address::is_private_ip;
use crate::egress::url_policy::{assert_allowed_url, UrlViolation};
use crate::observability::metrics;
use crate::policy::{EgressPolicy, Violation, ViolationKind};

const JSON_MEDIA_TYPE: &str = "application/json";

/// Why a guarded fetch did not produce a value.
#[derive(Debug, Error)]
pub enum FetchViolation {
    #[error(transparent)]
    Url(#[from] UrlViolation),

    #[error("upstream answered with redirect {status}")]
    RedirectBlocked { status: u16, location: Option<String> },

    #[error("request did not complete within {0:?}")]
    Timeout(Duration),

    #[error("unexpected content type '{0}'")]
    UnexpectedContentType(String),

    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("response body is not valid JSON: {0}")]
    JsonParseFailed(String),

    #[error("upstream answered with status {0}")]
    UpstreamStatus(u16),

    #[error("network error: {0}")]
    Transport(String),
}

impl FetchViolation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Self::Url(v) => v.kind(),
            Self::RedirectBlocked { .. } => ViolationKind::RedirectBlocked,
            Self::Timeout(_) => ViolationKind::Timeout,
            Self::UnexpectedContentType(_) => ViolationKind::UnexpectedContentType,
            Self::ResponseTooLarge { .. } => ViolationKind::ResponseTooLarge,
            Self::JsonParseFailed(_) => ViolationKind::JsonParseFailed,
            Self::UpstreamStatus(_) => ViolationKind::UpstreamStatus,
            Self::Transport(_) => ViolationKind::Transport,
        }
    }
}

impl From<FetchViolation> for Violation {
    fn from(v: FetchViolation) -> Self {
        Violation::with_detail(v.kind(), v.to_string())
    }
}

/// A policy bound to a call site that fetches repeatedly.
#[derive(Debug, Clone)]
pub struct EgressGuard {
    policy: EgressPolicy,
}

impl EgressGuard {
    pub fn new(policy: EgressPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EgressPolicy {
        &self.policy
    }

    /// URL phase only, recorded like a refused fetch.
    pub fn check_url(&self, url: &str) -> Result<Url, UrlViolation> {
        assert_allowed_url(url, &self.policy.allowed_hosts).inspect_err(|violation| {
            metrics::record_egress_violation(violation.kind());
            tracing::warn!(kind = %violation.kind(), error = %violation, "Egress URL refused");
        })
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<T, FetchViolation> {
        safe_fetch_json(url, &self.policy, headers).await
    }
}

/// Fetch and decode JSON from a URL the policy allows.
///
/// Performs exactly one request. The URL is checked before any I/O, every
/// resolved address must be public, redirects are refused, the response must
/// be `application/json` and at most `max_bytes` long, and the whole call is
/// bounded by `policy.timeout`.
///
/// # Errors
/// A [`FetchViolation`] naming the first check that failed.
pub async fn safe_fetch_json<T: DeserializeOwned>(
    url: &str,
    policy: &EgressPolicy,
    headers: &HeaderMap,
) -> Result<T, FetchViolation> {
    let result = guarded_fetch(url, policy, headers).await;
    if let Err(violation) = &result {
        metrics::record_egress_violation(violation.kind());
        tracing::warn!(
            kind = %violation.kind(),
            error = %violation,
            "Egress fetch refused"
        );
    }
    result
}

async fn guarded_fetch<T: DeserializeOwned>(
    raw_url: &str,
    policy: &EgressPolicy,
    headers: &HeaderMap,
) -> Result<T, FetchViolation> {
    let url = assert_allowed_url(raw_url, &policy.allowed_hosts)?;
    let deadline = Instant::now() + policy.timeout;

    let addrs = timeout_at(deadline, resolve_public(&url))
        .await
        .map_err(|_| FetchViolation::Timeout(policy.timeout))??;

    let client = match url.host() {
        Some(Host::Domain(domain)) => build_client(policy, Some((domain, &addrs)))?,
        _ => build_client(policy, None)?,
    };

    tracing::debug!(host = url.host_str().unwrap_or_default(), path = url.path(), "Egress fetch");
    execute(&client, url, policy, headers, deadline).await
}

/// Resolve the URL's host and refuse if any address is private.
async fn resolve_public(url: &Url) -> Result<Vec<SocketAddr>, FetchViolation> {
    let port = url.port_or_known_default().unwrap_or(443);
    let addrs: Vec<SocketAddr> = match url.host() {
        Some(Host::Domain(domain)) => tokio::net::lookup_host((domain, port))
            .await
            .map_err(|e| FetchViolation::Transport(format!("resolving {domain}: {e}")))?
            .collect(),
        Some(Host::Ipv4(ip)) => vec![SocketAddr::new(ip.into(), port)],
        Some(Host::Ipv6(ip)) => vec![SocketAddr::new(ip.into(), port)],
        None => return Err(UrlViolation::Malformed("URL has no host".to_string()).into()),
    };

    if addrs.is_empty() {
        return Err(FetchViolation::Transport("host resolved to no addresses".to_string()));
    }

    if let Some(addr) = addrs.iter().find(|addr| is_private_ip(&addr.ip())) {
        tracing::warn!(
            host = url.host_str().unwrap_or_default(),
            resolved = %addr.ip(),
            "Allowlisted host resolved to a private address"
        );
        return Err(UrlViolation::PrivateAddressBlocked(
            url.host_str().unwrap_or_default().to_string(),
        )
        .into());
    }

    Ok(addrs)
}

/// One-shot client: no redirects, no proxies, optionally pinned to vetted
/// addresses so the connection cannot re-resolve elsewhere.
pub(crate) fn build_client(
    policy: &EgressPolicy,
    pinned: Option<(&str, &[SocketAddr])>,
) -> Result<Client, FetchViolation> {
    let mut builder = Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(policy.timeout)
        .connect_timeout(policy.timeout)
        .no_proxy();

    if let Some((domain, addrs)) = pinned {
        builder = builder.https_only(true).resolve_to_addrs(domain, addrs);
    }

    builder
        .build()
        .map_err(|e| FetchViolation::Transport(e.to_string()))
}

/// Network phase: request, status and media type checks, bounded read, parse.
pub(crate) async fn execute<T: DeserializeOwned>(
    client: &Client,
    url: Url,
    policy: &EgressPolicy,
    headers: &HeaderMap,
    deadline: Instant,
) -> Result<T, FetchViolation> {
    let body = timeout_at(deadline, read_json_body(client, url, policy, headers))
        .await
        .map_err(|_| FetchViolation::Timeout(policy.timeout))??;

    serde_json::from_slice(&body).map_err(|e| FetchViolation::JsonParseFailed(e.to_string()))
}

async fn read_json_body(
    client: &Client,
    url: Url,
    policy: &EgressPolicy,
    headers: &HeaderMap,
) -> Result<Vec<u8>, FetchViolation> {
    let mut request_headers = HeaderMap::new();
    for (name, value) in headers {
        if name != ACCEPT && name != HOST {
            request_headers.append(name.clone(), value.clone());
        }
    }
    request_headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));

    let mut response = client
        .get(url)
        .headers(request_headers)
        .send()
        .await
        .map_err(|e| transport_error(e, policy.timeout))?;

    let status = response.status();
    if status.is_redirection() {
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        return Err(FetchViolation::RedirectBlocked {
            status: status.as_u16(),
            location,
        });
    }
    if !status.is_success() {
        return Err(FetchViolation::UpstreamStatus(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !is_json_media_type(content_type) {
        return Err(FetchViolation::UnexpectedContentType(content_type.to_string()));
    }

    // A declared length can only make us stop sooner; it is never trusted
    // to bound the read.
    if let Some(declared) = response.content_length() {
        if declared > policy.max_bytes as u64 {
            return Err(FetchViolation::ResponseTooLarge {
                limit: policy.max_bytes,
            });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| transport_error(e, policy.timeout))?
    {
        if body.len() + chunk.len() > policy.max_bytes {
            return Err(FetchViolation::ResponseTooLarge {
                limit: policy.max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Media type without parameters must be exactly `application/json`.
fn is_json_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}

fn transport_error(error: reqwest::Error, budget: Duration) -> FetchViolation {
    if error.is_timeout() {
        FetchViolation::Timeout(budget)
    } else {
        FetchViolation::Transport(error.to_string())
    }
}
