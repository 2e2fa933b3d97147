//! IP check
//!
//! Parse and reserved-range screening, blocklists, Tor and ASN
//! classification, geolocation consistency, velocity and proxy-header
//! analysis.

use super::{soften, Check, CheckContext, Tally};
use crate::collab::geo::zone_offset_minutes;
use crate::error::Result;
use crate::net;
use crate::refdata::{AsnType, BlacklistKind};
use async_trait::async_trait;
use std::net::IpAddr;
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput, Window};

/// Headers that proxies and CDNs inject
const PROXY_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "x-originating-ip",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
    "via",
    "true-client-ip",
    "cf-connecting-ip",
];

pub struct IpCheck;

fn velocity_points(count: u64) -> u32 {
    if count > 100 {
        30
    } else if count > 50 {
        20
    } else if count > 10 {
        10
    } else {
        0
    }
}

#[async_trait]
impl Check for IpCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Ip
    }

    fn applicable(&self, input: &EvaluationInput) -> bool {
        input
            .ip
            .as_deref()
            .map(|ip| !ip.trim().is_empty())
            .unwrap_or(false)
    }

    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome> {
        let raw = input.ip.as_deref().unwrap_or_default();
        let mut tally = Tally::new();

        let ip: IpAddr = match net::parse_ip(raw) {
            Ok(ip) => ip,
            Err(_) => {
                tally.add(100);
                tally.hard_fail();
                tally.detail("valid", false);
                return Ok(tally.into_outcome());
            }
        };
        tally.detail("valid", true);
        let canonical = ip.to_string();

        let ip_hash = ctx.hasher.hash(&canonical);
        if let Some(entry) = ctx
            .refdata
            .blacklist_entry(BlacklistKind::Ip, &ip_hash)
            .await?
        {
            tally.add(100);
            tally.hard_fail();
            tally.detail("blacklisted", true);
            if let Some(reason) = entry.reason {
                tally.detail("blacklist_reason", reason);
            }
        }

        if net::is_reserved(&ip) {
            tally.add(100);
            tally.hard_fail();
            tally.detail("reserved", true);
            return Ok(tally.into_outcome());
        }

        if let Some(node) = ctx.refdata.tor_node(&canonical).await? {
            if node.is_active {
                tally.add(node.risk_weight.max(0) as u32);
                tally.detail("tor", true);
            }
        }

        // Stored ranges first, collaborator API as fallback
        let mut asn_record = ctx.refdata.asn_for_ip(&ip).await?;
        if asn_record.is_none() {
            if let Some(hint) =
                soften(ctx.asn_api.asn_of(&ip).await, "asn lookup")?.flatten()
            {
                asn_record = ctx.refdata.asn(hint.asn).await?;
                if asn_record.is_none() {
                    tally.detail(
                        "asn",
                        serde_json::json!({
                            "asn": hint.asn,
                            "organization": hint.organization,
                            "type": "unknown",
                        }),
                    );
                }
            }
        }
        if let Some(record) = asn_record {
            tally.detail(
                "asn",
                serde_json::json!({
                    "asn": record.asn,
                    "organization": record.organization,
                    "type": record.asn_type.as_str(),
                }),
            );
            tally.add(record.risk_weight.max(0) as u32);
            if record.asn_type == AsnType::Datacenter {
                tally.add(30);
                tally.detail("datacenter", true);
            }
            if record.is_vpn || record.is_proxy {
                tally.add(40);
                tally.detail("vpn_or_proxy", true);
            }
        }

        if let Some(geo) = soften(ctx.geo.locate(&ip).await, "geolocation")?.flatten() {
            if let (Some(declared), Some(located)) =
                (input.declared_country(), geo.country_code.as_deref())
            {
                if declared != located {
                    tally.add(30);
                    tally.detail("country_mismatch", true);
                    tally.detail("located_country", located);
                }
            }
            if let (Some(zone), Some(ip_offset)) =
                (input.timezone.as_deref(), geo.utc_offset_minutes)
            {
                if let Some(declared_offset) = zone_offset_minutes(zone) {
                    if (declared_offset - ip_offset).abs() > 180 {
                        tally.add(20);
                        tally.detail("timezone_mismatch", true);
                    }
                }
            }
        }

        if let Some(count) = soften(
            ctx.velocity.bump("ip", &ip_hash, Window::Hour).await,
            "ip velocity",
        )? {
            let points = velocity_points(count);
            tally.add(points);
            tally.detail(
                "velocity",
                serde_json::json!({
                    "count": count,
                    "window": Window::Hour.as_str(),
                    "risk_score": points,
                }),
            );
        }

        let mut present: Vec<String> = Vec::new();
        let mut mismatch = false;
        for (name, values) in &input.headers {
            let lowered = name.to_lowercase();
            if !PROXY_HEADERS.contains(&lowered.as_str()) {
                continue;
            }
            present.push(lowered);
            for value in values {
                if net::ips_in_header_value(value).iter().any(|h| *h != ip) {
                    mismatch = true;
                }
            }
        }
        if !present.is_empty() {
            present.sort();
            tally.add(10);
            tally.detail("proxy_headers", serde_json::json!(present));
            if mismatch {
                tally.add(20);
                tally.detail("proxy_header_mismatch", true);
            }
        }

        Ok(tally.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testutil::ContextBuilder;
    use crate::refdata::models::{AsnRecord, BlacklistEntry, TorExitNode};
    use crate::refdata::ReferenceBackend;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn input(ip: &str) -> EvaluationInput {
        EvaluationInput {
            ip: Some(ip.to_string()),
            ..Default::default()
        }
    }

    fn datacenter_asn(asn: i64, ranges: Vec<String>) -> AsnRecord {
        AsnRecord {
            asn,
            organization: "Example Hosting".to_string(),
            country_code: Some("US".to_string()),
            asn_type: AsnType::Datacenter,
            is_hosting: true,
            is_vpn: false,
            is_proxy: false,
            ip_ranges: ranges,
            risk_weight: 15,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_clean_ip_scores_zero() {
        let ctx = ContextBuilder::new().build();

        let outcome = IpCheck.perform(&input("8.8.8.8"), &ctx).await.unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.details["velocity"]["count"], 1);
    }

    #[tokio::test]
    async fn test_invalid_ip_hard_fails() {
        let ctx = ContextBuilder::new().build();

        let outcome = IpCheck.perform(&input("999.1.2.3"), &ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["valid"], false);
    }

    #[tokio::test]
    async fn test_reserved_ip_short_circuits() {
        let ctx = ContextBuilder::new().build();

        for ip in ["10.0.0.5", "127.0.0.1", "192.168.1.10", "fe80::1"] {
            let outcome = IpCheck.perform(&input(ip), &ctx).await.unwrap();
            assert!(!outcome.passed, "{} should fail", ip);
            assert_eq!(outcome.score, 100);
            assert_eq!(outcome.details["reserved"], true);
            // Short-circuited before velocity ran
            assert!(outcome.details.get("velocity").is_none());
        }
    }

    #[tokio::test]
    async fn test_blacklisted_ip() {
        let builder = ContextBuilder::new();
        let backend = Arc::clone(&builder.backend);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("203.0.113.7");
        backend
            .upsert_blacklist_entries(&[BlacklistEntry {
                value_hash: hash,
                kind: BlacklistKind::Ip,
                reason: None,
                risk_weight: 100,
                report_count: 0,
                last_seen_at: None,
            }])
            .await
            .unwrap();

        let outcome = IpCheck.perform(&input("203.0.113.7"), &ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["blacklisted"], true);
    }

    #[tokio::test]
    async fn test_tor_exit_node() {
        let builder = ContextBuilder::new();
        let backend = Arc::clone(&builder.backend);
        let ctx = builder.build();

        backend
            .upsert_tor_nodes(&[TorExitNode::from_ip("185.220.101.34".to_string(), 4)])
            .await
            .unwrap();

        let outcome = IpCheck.perform(&input("185.220.101.34"), &ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 90);
        assert_eq!(outcome.details["tor"], true);
    }

    #[tokio::test]
    async fn test_asn_classification_from_ranges() {
        let builder = ContextBuilder::new();
        let backend = Arc::clone(&builder.backend);
        let ctx = builder.build();

        backend
            .upsert_asns(&[datacenter_asn(64500, vec!["203.0.113.0/24".to_string()])])
            .await
            .unwrap();

        let outcome = IpCheck.perform(&input("203.0.113.55"), &ctx).await.unwrap();
        // weight 15 + datacenter 30
        assert_eq!(outcome.score, 45);
        assert_eq!(outcome.details["datacenter"], true);
        assert_eq!(outcome.details["asn"]["asn"], 64500);
    }

    #[tokio::test]
    async fn test_asn_via_collaborator_fallback() {
        let mut builder = ContextBuilder::new();
        builder.asn_api = builder.asn_api.with_asn("198.51.100.9", 64501, "VPN CO");
        let backend = Arc::clone(&builder.backend);
        let ctx = builder.build();

        let mut record = datacenter_asn(64501, vec![]);
        record.is_vpn = true;
        backend.upsert_asns(&[record]).await.unwrap();

        let outcome = IpCheck.perform(&input("198.51.100.9"), &ctx).await.unwrap();
        // weight 15 + datacenter 30 + vpn 40
        assert_eq!(outcome.score, 85);
        assert_eq!(outcome.details["vpn_or_proxy"], true);
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_geo_mismatches() {
        let mut builder = ContextBuilder::new();
        builder.geo = builder.geo.with_location("203.0.113.5", "RU", 180);
        let ctx = builder.build();

        let input = EvaluationInput {
            ip: Some("203.0.113.5".to_string()),
            country: Some("US".to_string()),
            timezone: Some("America/New_York".to_string()),
            ..Default::default()
        };

        let outcome = IpCheck.perform(&input, &ctx).await.unwrap();
        // country mismatch 30 + timezone gap (480 min) 20
        assert_eq!(outcome.score, 50);
        assert_eq!(outcome.details["country_mismatch"], true);
        assert_eq!(outcome.details["timezone_mismatch"], true);
    }

    #[tokio::test]
    async fn test_velocity_tiers() {
        let builder = ContextBuilder::new();
        let velocity = Arc::clone(&builder.velocity);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("8.8.8.8");
        for _ in 0..11 {
            crate::velocity::VelocityStore::bump(&*velocity, "ip", &hash, Window::Hour)
                .await
                .unwrap();
        }

        let outcome = IpCheck.perform(&input("8.8.8.8"), &ctx).await.unwrap();
        // 12th request in the hour: > 10
        assert_eq!(outcome.score, 10);
        assert_eq!(outcome.details["velocity"]["risk_score"], 10);
    }

    #[tokio::test]
    async fn test_proxy_headers() {
        let ctx = ContextBuilder::new().build();

        let mut headers = HashMap::new();
        headers.insert(
            "X-Forwarded-For".to_string(),
            vec!["8.8.8.8".to_string()],
        );
        let input = EvaluationInput {
            ip: Some("8.8.8.8".to_string()),
            headers,
            ..Default::default()
        };

        let outcome = IpCheck.perform(&input, &ctx).await.unwrap();
        // Header present, no mismatch
        assert_eq!(outcome.score, 10);

        let mut headers = HashMap::new();
        headers.insert(
            "CF-Connecting-IP".to_string(),
            vec!["203.0.113.9".to_string()],
        );
        let input = EvaluationInput {
            ip: Some("8.8.8.8".to_string()),
            headers,
            ..Default::default()
        };

        let outcome = IpCheck.perform(&input, &ctx).await.unwrap();
        // Header present (+10) and carries a different address (+20)
        assert_eq!(outcome.score, 30);
        assert_eq!(outcome.details["proxy_header_mismatch"], true);
    }
}
