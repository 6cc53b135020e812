//! Private and local address classification.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::Host;

/// Hostname suffixes that only resolve inside a private network.
const PRIVATE_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal"];

/// True for names and addresses the server must never fetch from.
pub fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => is_private_name(name),
        Host::Ipv4(ip) => is_private_ipv4(ip),
        Host::Ipv6(ip) => is_private_ipv6(ip),
    }
}

/// `localhost` and the private-use suffixes, ignoring a trailing dot.
pub fn is_private_name(name: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    name == "localhost" || PRIVATE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ipv4_ranges() {
        for ip in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "172.20.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "100.64.0.1",
            "255.255.255.255",
        ] {
            let ip: Ipv4Addr = ip.parse().unwrap();
            assert!(is_private_ipv4(&ip), "{ip} should be private");
        }
    }

    #[test]
    fn test_public_ipv4() {
        for ip in ["8.8.8.8", "172.32.0.1", "100.128.0.1", "93.184.216.34"] {
            let ip: Ipv4Addr = ip.parse().unwrap();
            assert!(!is_private_ipv4(&ip), "{ip} should be public");
        }
    }

    #[test]
    fn test_private_ipv6() {
        for ip in ["::1", "::", "fd00::1", "fe80::1", "::ffff:10.0.0.1", "::ffff:127.0.0.1"] {
            let ip: Ipv6Addr = ip.parse().unwrap();
            assert!(is_private_ipv6(&ip), "{ip} should be private");
        }
        let public: Ipv6Addr = "2606:4700:4700::1111".parse().unwrap();
        assert!(!is_private_ipv6(&public));
    }

    #[test]
    fn test_private_names() {
        assert!(is_private_name("localhost"));
        assert!(is_private_name("LOCALHOST."));
        assert!(is_private_name("printer.local"));
        assert!(is_private_name("db.internal"));
        assert!(is_private_name("app.localhost"));
        assert!(!is_private_name("api.example.com"));
        assert!(!is_private_name("internal.example.com"));
    }
}
