//! Egress policy.

use std::collections::HashSet;
use std::time::Duration;

/// Default deadline for one outbound fetch.
pub const DEFAULT_EGRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Default ceiling for one response body.
pub const DEFAULT_EGRESS_MAX_BYTES: usize = 1024 * 1024;

/// Where the server may fetch from, and how much it may wait and read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressPolicy {
    /// Exact hostnames; no wildcard or subdomain matching.
    pub allowed_hosts: HashSet<String>,

    /// Hard deadline for connect, headers and body together.
    pub timeout: Duration,

    /// Maximum body bytes read before aborting.
    pub max_bytes: usize,
}

impl EgressPolicy {
    pub fn new<I, S>(allowed_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
            timeout: DEFAULT_EGRESS_TIMEOUT,
            max_bytes: DEFAULT_EGRESS_MAX_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_are_lowercased() {
        let policy = EgressPolicy::new(["API.Example.com"]);
        assert!(policy.allowed_hosts.contains("api.example.com"));
        assert_eq!(policy.timeout, DEFAULT_EGRESS_TIMEOUT);
    }
}
