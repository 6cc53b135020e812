//! Violation taxonomy shared by all engines.

use serde::Serialize;
use std::fmt;

/// Stable tag for every way untrusted input can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    // Rate limiter
    RateLimitExceeded,

    // Egress guard, URL phase
    MalformedUrl,
    DisallowedProtocol,
    DisallowedHost,
    EmbeddedCredentials,
    DisallowedPort,
    PrivateAddressBlocked,

    // Egress guard, fetch phase
    RedirectBlocked,
    Timeout,
    UnexpectedContentType,
    ResponseTooLarge,
    JsonParseFailed,
    UpstreamStatus,
    Transport,

    // Content safety, document gate
    DocumentTooLarge,
    ModuleDirectiveBlocked,
    DisallowedUrlScheme,
    DisallowedTag,
    DisallowedExpression,
    DisallowedEventAttribute,
}

impl ViolationKind {
    /// Snake-case code used in logs, metrics labels and response bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::MalformedUrl => "malformed_url",
            Self::DisallowedProtocol => "disallowed_protocol",
            Self::DisallowedHost => "disallowed_host",
            Self::EmbeddedCredentials => "embedded_credentials",
            Self::DisallowedPort => "disallowed_port",
            Self::PrivateAddressBlocked => "private_address_blocked",
            Self::RedirectBlocked => "redirect_blocked",
            Self::Timeout => "timeout",
            Self::UnexpectedContentType => "unexpected_content_type",
            Self::ResponseTooLarge => "response_too_large",
            Self::JsonParseFailed => "json_parse_failed",
            Self::UpstreamStatus => "upstream_status",
            Self::Transport => "transport",
            Self::DocumentTooLarge => "document_too_large",
            Self::ModuleDirectiveBlocked => "module_directive_blocked",
            Self::DisallowedUrlScheme => "disallowed_url_scheme",
            Self::DisallowedTag => "disallowed_tag",
            Self::DisallowedExpression => "disallowed_expression",
            Self::DisallowedEventAttribute => "disallowed_event_attribute",
        }
    }

    /// Generic message that is safe to show an untrusted client.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "Too many requests, try again later",
            Self::MalformedUrl
            | Self::DisallowedProtocol
            | Self::DisallowedHost
            | Self::EmbeddedCredentials
            | Self::DisallowedPort
            | Self::PrivateAddressBlocked => "URL is not permitted",
            Self::RedirectBlocked
            | Self::Timeout
            | Self::UnexpectedContentType
            | Self::ResponseTooLarge
            | Self::JsonParseFailed
            | Self::UpstreamStatus
            | Self::Transport => "Upstream data could not be retrieved",
            Self::DocumentTooLarge => "Document is too large",
            Self::ModuleDirectiveBlocked
            | Self::DisallowedUrlScheme
            | Self::DisallowedTag
            | Self::DisallowedExpression
            | Self::DisallowedEventAttribute => "Document contains disallowed content",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform violation value: a kind plus optional diagnostic detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: Option<String>,
}

impl Violation {
    pub fn new(kind: ViolationKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    /// Message for an outside party. Detail is only included when the
    /// deployment opted into diagnostics.
    pub fn public_message(&self, expose_detail: bool) -> String {
        match (&self.detail, expose_detail) {
            (Some(detail), true) => format!("{}: {}", self.kind.public_message(), detail),
            _ => self.kind.public_message().to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.kind, detail),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Violation {}

/// Outcome of a validating call: `Ok` or exactly one violation.
pub type ValidationResult = Result<(), Violation>;
