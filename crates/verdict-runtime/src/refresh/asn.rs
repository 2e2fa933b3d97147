//! ASN master list refresh
//!
//! One plain-text feed with `asn country organization` lines. Classification
//! comes from the organization name, which is crude but stable; the
//! collaborator API refines individual addresses at evaluation time.

use super::feed::watch_memory;
use super::JobContext;
use crate::error::{Result, RuntimeError};
use crate::refdata::models::{AsnRecord, AsnType};
use crate::refdata::ReferenceTable;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};

static LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+([A-Z]{2})\s+(.+)$").expect("static regex"));

const HOSTING_KEYWORDS: &[&str] = &[
    "hosting", "server", "cloud", "datacenter", "data center", "vps", "dedicated", "colo",
    "digitalocean", "amazon", "google cloud", "ovh", "hetzner", "linode", "vultr",
];

const VPN_KEYWORDS: &[&str] = &["vpn", "proxy", "anonymiz"];

const MOBILE_KEYWORDS: &[&str] = &["mobile", "wireless", "cellular", "lte"];

const EDUCATION_KEYWORDS: &[&str] = &["university", "college", "school", "academic", "institute"];

const GOVERNMENT_KEYWORDS: &[&str] = &["government", "ministry", "federal", "municipal"];

pub(super) async fn run(ctx: &JobContext<'_>) -> Result<u64> {
    let batch_size = ctx.config.batch_sizes.asn;
    let path = ctx.fetcher.fetch_to_file(&ctx.config.feeds.asn).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| RuntimeError::Feed(e.to_string()))?;
    let mut lines = BufReader::new(file).lines();

    let mut batch: Vec<AsnRecord> = Vec::with_capacity(batch_size);
    let mut deactivated = false;
    let mut total = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| RuntimeError::Feed(e.to_string()))?
    {
        let Some(record) = parse_line(&line) else {
            if !line.trim().is_empty() {
                tracing::debug!(line, "Skipping malformed asn line");
            }
            continue;
        };
        batch.push(record);

        if batch.len() >= batch_size {
            flush(ctx, &mut batch, &mut deactivated, &mut total).await?;
        }
    }
    flush(ctx, &mut batch, &mut deactivated, &mut total).await?;

    let cutoff = Utc::now() - chrono::Duration::days(ctx.config.inactive_retention_days as i64);
    ctx.backend
        .prune_inactive(ReferenceTable::Asns, cutoff)
        .await?;

    Ok(total)
}

async fn flush(
    ctx: &JobContext<'_>,
    batch: &mut Vec<AsnRecord>,
    deactivated: &mut bool,
    total: &mut u64,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    if !*deactivated {
        ctx.backend.deactivate_all(ReferenceTable::Asns).await?;
        *deactivated = true;
    }
    *total += ctx.backend.upsert_asns(batch).await?;
    batch.clear();
    watch_memory(ctx.config.memory_limit_bytes, ctx.config.memory_warn_ratio);
    tokio::task::yield_now().await;
    Ok(())
}

fn parse_line(line: &str) -> Option<AsnRecord> {
    let caps = LINE_RE.captures(line.trim())?;
    let asn: i64 = caps[1].parse().ok()?;
    let country_code = caps[2].to_string();
    let organization = caps[3].trim().to_string();

    let (asn_type, is_vpn) = classify(&organization);
    let is_hosting = asn_type == AsnType::Datacenter;

    Some(AsnRecord {
        asn,
        organization,
        country_code: Some(country_code),
        asn_type,
        is_hosting,
        is_vpn,
        is_proxy: is_vpn,
        ip_ranges: Vec::new(),
        risk_weight: type_weight(asn_type),
        is_active: true,
    })
}

fn classify(organization: &str) -> (AsnType, bool) {
    let lowered = organization.to_lowercase();
    let is_vpn = VPN_KEYWORDS.iter().any(|kw| lowered.contains(kw));

    let asn_type = if HOSTING_KEYWORDS.iter().any(|kw| lowered.contains(kw)) || is_vpn {
        AsnType::Datacenter
    } else if MOBILE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        AsnType::Mobile
    } else if EDUCATION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        AsnType::Education
    } else if GOVERNMENT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        AsnType::Government
    } else {
        AsnType::Unknown
    };

    (asn_type, is_vpn)
}

/// Base risk carried into the IP check's ASN sub-rule
fn type_weight(asn_type: AsnType) -> i16 {
    match asn_type {
        AsnType::Datacenter => 15,
        AsnType::Residential => 5,
        AsnType::Mobile => 5,
        AsnType::Education => 0,
        AsnType::Government => 0,
        AsnType::Unknown => 10,
    }
}
