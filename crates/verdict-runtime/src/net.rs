//! IP and CIDR toolkit
//!
//! Parsing, reserved-range tests and CIDR containment. Invoked once or more
//! per request, so everything here works on `IpAddr` values and integer masks
//! without allocating.

use crate::error::{Result, RuntimeError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("static regex"));

static TLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2,}$").expect("static regex"));

/// RFC-1035 hostname shape: at most 253 characters, LDH labels, alphabetic
/// TLD of two or more characters. Expects lowercased input.
pub fn is_valid_hostname(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    if !labels.iter().all(|label| LABEL_RE.is_match(label)) {
        return false;
    }
    TLD_RE.is_match(labels.last().expect("at least two labels"))
}

/// Parse an IP address string, failing on malformed input
pub fn parse_ip(value: &str) -> Result<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| RuntimeError::Check(format!("invalid ip address: {}", value)))
}

/// IP version as stored in reference tables
pub fn ip_version(ip: &IpAddr) -> i16 {
    match ip {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 6,
    }
}

/// Reserved IPv4 ranges per RFC 5735 as (network, prefix) pairs
const RESERVED_V4: [(Ipv4Addr, u8); 9] = [
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
    (Ipv4Addr::new(255, 255, 255, 255), 32),
];

/// Whether an address falls in a reserved range (RFC 5735 for v4; RFC 4291
/// unspecified/loopback/link-local/unique-local for v6)
pub fn is_reserved(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from(*v4);
            RESERVED_V4.iter().any(|(network, prefix)| {
                let mask = prefix_mask_v4(*prefix);
                bits & mask == u32::from(*network) & mask
            })
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(*v6);
            v6.is_unspecified()
                || v6.is_loopback()
                // fe80::/10 link-local
                || bits >> 118 == 0xfe80 >> 6
                // fc00::/7 unique-local
                || bits >> 121 == 0xfc00 >> 9
        }
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix as u32)
    }
}

/// A parsed CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `a.b.c.d/len` or `v6::/len` notation. A bare address is treated
    /// as a host route.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (addr_part, prefix_part) = match value.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (value, None),
        };

        let network = parse_ip(addr_part)?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        let prefix = match prefix_part {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max_prefix)
                .ok_or_else(|| RuntimeError::Check(format!("invalid cidr prefix: {}", value)))?,
            None => max_prefix,
        };

        Ok(Self { network, prefix })
    }

    /// Whether the block contains an address. Mixed-version comparisons are
    /// always false.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(network), IpAddr::V4(ip)) => {
                let mask = prefix_mask_v4(self.prefix);
                u32::from(*ip) & mask == u32::from(network) & mask
            }
            (IpAddr::V6(network), IpAddr::V6(ip)) => {
                let mask = prefix_mask_v6(self.prefix);
                u128::from(*ip) & mask == u128::from(network) & mask
            }
            _ => false,
        }
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

/// Extract candidate IP addresses from a header value that may carry a
/// comma-separated list, `host:port` entries, or RFC 7239 `for=` pairs
pub fn ips_in_header_value(value: &str) -> Vec<IpAddr> {
    value
        .split(',')
        .flat_map(|part| part.split(';'))
        .filter_map(|part| {
            let token = part.trim();
            let token = token
                .strip_prefix("for=")
                .or_else(|| token.strip_prefix("For="))
                .unwrap_or(token);
            let token = token.trim_matches('"');

            if let Ok(ip) = token.parse::<IpAddr>() {
                return Some(ip);
            }
            // v4 host:port
            if let Some((host, _port)) = token.rsplit_once(':') {
                if let Ok(ip) = host.parse::<Ipv4Addr>() {
                    return Some(IpAddr::V4(ip));
                }
            }
            // bracketed v6, optionally with port
            if let Some(stripped) = token.strip_prefix('[') {
                if let Some((host, _)) = stripped.split_once(']') {
                    if let Ok(ip) = host.parse::<Ipv6Addr>() {
                        return Some(IpAddr::V6(ip));
                    }
                }
            }
            None
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip() {
        assert!(parse_ip("8.8.8.8").is_ok());
        assert!(parse_ip(" 2001:db8::1 ").is_ok());
        assert!(parse_ip("999.1.1.1").is_err());
        assert!(parse_ip("not-an-ip").is_err());
    }

    #[test]
    fn test_ip_version() {
        assert_eq!(ip_version(&parse_ip("8.8.8.8").unwrap()), 4);
        assert_eq!(ip_version(&parse_ip("2001:db8::1").unwrap()), 6);
    }

    #[test]
    fn test_reserved_v4() {
        for ip in [
            "0.1.2.3",
            "10.0.0.5",
            "127.0.0.1",
            "169.254.10.10",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "224.0.0.1",
            "240.0.0.1",
            "255.255.255.255",
        ] {
            assert!(is_reserved(&parse_ip(ip).unwrap()), "{} should be reserved", ip);
        }

        for ip in ["8.8.8.8", "172.32.0.1", "1.1.1.1", "223.255.255.255"] {
            assert!(!is_reserved(&parse_ip(ip).unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn test_reserved_v6() {
        for ip in ["::", "::1", "fe80::1", "fc00::1", "fd12:3456::1"] {
            assert!(is_reserved(&parse_ip(ip).unwrap()), "{} should be reserved", ip);
        }
        assert!(!is_reserved(&parse_ip("2001:db8::1").unwrap()));
    }

    #[test]
    fn test_cidr_contains_v4() {
        let block = Cidr::parse("192.0.2.0/24").unwrap();

        assert!(block.contains(&parse_ip("192.0.2.1").unwrap()));
        assert!(block.contains(&parse_ip("192.0.2.255").unwrap()));
        assert!(!block.contains(&parse_ip("192.0.3.0").unwrap()));
        assert!(!block.contains(&parse_ip("2001:db8::1").unwrap()));
    }

    #[test]
    fn test_cidr_contains_v6() {
        let block = Cidr::parse("2001:db8::/32").unwrap();

        assert!(block.contains(&parse_ip("2001:db8:ffff::1").unwrap()));
        assert!(!block.contains(&parse_ip("2001:db9::1").unwrap()));
    }

    #[test]
    fn test_cidr_zero_prefix_matches_all() {
        let block = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(block.contains(&parse_ip("203.0.113.7").unwrap()));
    }

    #[test]
    fn test_cidr_bare_address_is_host_route() {
        let block = Cidr::parse("198.51.100.7").unwrap();
        assert_eq!(block.prefix(), 32);
        assert!(block.contains(&parse_ip("198.51.100.7").unwrap()));
        assert!(!block.contains(&parse_ip("198.51.100.8").unwrap()));
    }

    #[test]
    fn test_cidr_rejects_bad_prefix() {
        assert!(Cidr::parse("10.0.0.0/33").is_err());
        assert!(Cidr::parse("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_ips_in_header_value() {
        let ips = ips_in_header_value("203.0.113.5, 198.51.100.2:443");
        assert_eq!(ips.len(), 2);

        let ips = ips_in_header_value("for=\"203.0.113.9\"; proto=https");
        assert_eq!(ips, vec![parse_ip("203.0.113.9").unwrap()]);

        let ips = ips_in_header_value("[2001:db8::1]:8080");
        assert_eq!(ips, vec![parse_ip("2001:db8::1").unwrap()]);

        assert!(ips_in_header_value("unknown").is_empty());
    }
}
