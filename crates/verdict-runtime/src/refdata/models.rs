//! Reference table rows

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default risk weight for a Tor exit node
pub const TOR_DEFAULT_WEIGHT: i16 = 90;

/// Default risk weight for a disposable email domain
pub const DISPOSABLE_DEFAULT_WEIGHT: i16 = 80;

/// A known Tor exit node, keyed by IP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorExitNode {
    pub ip_address: String,
    pub ip_version: i16,
    pub node_id: Option<String>,
    pub nickname: Option<String>,
    pub is_active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub risk_weight: i16,
}

impl TorExitNode {
    /// Node from a bare exit-list line
    pub fn from_ip(ip_address: String, ip_version: i16) -> Self {
        Self {
            ip_address,
            ip_version,
            node_id: None,
            nickname: None,
            is_active: true,
            last_seen_at: None,
            risk_weight: TOR_DEFAULT_WEIGHT,
        }
    }
}

/// A disposable email provider domain, keyed by lowercased domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisposableEmailDomain {
    pub domain: String,
    pub source: String,
    pub risk_weight: i16,
    pub is_active: bool,
}

/// ASN classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsnType {
    Datacenter,
    Residential,
    Mobile,
    Education,
    Government,
    Unknown,
}

impl AsnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsnType::Datacenter => "datacenter",
            AsnType::Residential => "residential",
            AsnType::Mobile => "mobile",
            AsnType::Education => "education",
            AsnType::Government => "government",
            AsnType::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "datacenter" => AsnType::Datacenter,
            "residential" => AsnType::Residential,
            "mobile" => AsnType::Mobile,
            "education" => AsnType::Education,
            "government" => AsnType::Government,
            _ => AsnType::Unknown,
        }
    }
}

impl fmt::Display for AsnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An autonomous system, keyed by ASN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnRecord {
    pub asn: i64,
    pub organization: String,
    pub country_code: Option<String>,
    pub asn_type: AsnType,
    pub is_hosting: bool,
    pub is_vpn: bool,
    pub is_proxy: bool,
    /// CIDR strings covering the ASN's announced space; empty when unknown
    pub ip_ranges: Vec<String>,
    pub risk_weight: i16,
    pub is_active: bool,
}

/// User agent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Bot,
    Scraper,
    Browser,
    Malicious,
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Bot => "bot",
            AgentType::Scraper => "scraper",
            AgentType::Browser => "browser",
            AgentType::Malicious => "malicious",
            AgentType::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "bot" => AgentType::Bot,
            "scraper" => AgentType::Scraper,
            "browser" => AgentType::Browser,
            "malicious" => AgentType::Malicious,
            _ => AgentType::Unknown,
        }
    }
}

/// A catalogued user agent, keyed by SHA-256 of the UA string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownUserAgent {
    pub user_agent_hash: String,
    pub agent_type: AgentType,
    pub name: Option<String>,
    pub version: Option<String>,
    pub risk_weight: i16,
    pub is_outdated: bool,
    pub eol_date: Option<NaiveDate>,
    pub is_active: bool,
}

/// Which blacklist a hashed value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistKind {
    Email,
    Ip,
    CreditCard,
    Phone,
}

impl BlacklistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlacklistKind::Email => "email",
            BlacklistKind::Ip => "ip",
            BlacklistKind::CreditCard => "credit_card",
            BlacklistKind::Phone => "phone",
        }
    }

    /// The table holding this blacklist
    pub fn table_name(&self) -> &'static str {
        match self {
            BlacklistKind::Email => "blacklisted_emails",
            BlacklistKind::Ip => "blacklisted_ips",
            BlacklistKind::CreditCard => "blacklisted_credit_cards",
            BlacklistKind::Phone => "blacklisted_phones",
        }
    }
}

/// A blacklisted value, keyed by keyed-hash of the normalized value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub value_hash: String,
    pub kind: BlacklistKind,
    pub reason: Option<String>,
    pub risk_weight: i16,
    /// Abuse reports (chargebacks for cards) accumulated against the value
    pub report_count: i32,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl BlacklistEntry {
    /// Base weight raised by accumulated reports, capped at 100
    pub fn effective_weight(&self) -> i16 {
        let raised = self.risk_weight as i32 + 2 * self.report_count;
        raised.min(100) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asn_type_roundtrip() {
        for t in [
            AsnType::Datacenter,
            AsnType::Residential,
            AsnType::Mobile,
            AsnType::Education,
            AsnType::Government,
            AsnType::Unknown,
        ] {
            assert_eq!(AsnType::parse(t.as_str()), t);
        }
        assert_eq!(AsnType::parse("garbage"), AsnType::Unknown);
    }

    #[test]
    fn test_agent_type_roundtrip() {
        assert_eq!(AgentType::parse("malicious"), AgentType::Malicious);
        assert_eq!(AgentType::parse("nonsense"), AgentType::Unknown);
    }

    #[test]
    fn test_blacklist_effective_weight() {
        let entry = BlacklistEntry {
            value_hash: "abc".to_string(),
            kind: BlacklistKind::CreditCard,
            reason: Some("chargebacks".to_string()),
            risk_weight: 80,
            report_count: 5,
            last_seen_at: None,
        };
        assert_eq!(entry.effective_weight(), 90);

        let maxed = BlacklistEntry {
            report_count: 50,
            ..entry
        };
        assert_eq!(maxed.effective_weight(), 100);
    }

    #[test]
    fn test_tor_node_defaults() {
        let node = TorExitNode::from_ip("1.2.3.4".to_string(), 4);
        assert_eq!(node.risk_weight, 90);
        assert!(node.is_active);
    }
}
