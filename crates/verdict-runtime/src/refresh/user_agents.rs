//! Known user agent refresh
//!
//! JSON bot lists with `{pattern|userAgent, name|browser, version?}` entries,
//! plus an internally curated set of attack-tool signatures that no external
//! feed carries.

use super::feed::watch_memory;
use super::JobContext;
use crate::error::{Result, RuntimeError};
use crate::refdata::models::{AgentType, KnownUserAgent};
use crate::refdata::ReferenceTable;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Signatures maintained in-repo; always upserted after the feeds
const CURATED_PATTERNS: &[(&str, AgentType, i16)] = &[
    ("sqlmap", AgentType::Malicious, 95),
    ("nikto", AgentType::Malicious, 95),
    ("masscan", AgentType::Malicious, 95),
    ("hydra", AgentType::Malicious, 95),
    ("wpscan", AgentType::Malicious, 90),
    ("python-requests", AgentType::Bot, 55),
    ("curl", AgentType::Bot, 50),
    ("wget", AgentType::Bot, 50),
];

#[derive(Debug, Deserialize)]
struct UaEntry {
    pattern: Option<String>,
    #[serde(rename = "userAgent")]
    user_agent: Option<String>,
    name: Option<String>,
    browser: Option<String>,
    version: Option<String>,
}

pub(super) async fn run(ctx: &JobContext<'_>) -> Result<u64> {
    let batch_size = ctx.config.batch_sizes.user_agents;
    let mut batch: Vec<KnownUserAgent> = Vec::with_capacity(batch_size);
    let mut deactivated = false;
    let mut total = 0u64;
    let mut sources_ok = 0usize;

    for url in &ctx.config.feeds.user_agents {
        match ingest_source(ctx, url, &mut batch, &mut deactivated, &mut total, batch_size).await {
            Ok(count) => {
                sources_ok += 1;
                tracing::info!(source = %url, count, "User agent list ingested");
            }
            Err(e) => tracing::error!(source = %url, "User agent list failed: {}", e),
        }
    }

    if sources_ok == 0 && !ctx.config.feeds.user_agents.is_empty() {
        return Err(RuntimeError::Feed(
            "every user agent source failed".to_string(),
        ));
    }

    for (pattern, agent_type, weight) in CURATED_PATTERNS {
        batch.push(build_row(pattern, Some(pattern), None, *agent_type, *weight));
        if batch.len() >= batch_size {
            flush(ctx, &mut batch, &mut deactivated, &mut total).await?;
        }
    }

    flush(ctx, &mut batch, &mut deactivated, &mut total).await?;
    let cutoff = Utc::now() - chrono::Duration::days(ctx.config.inactive_retention_days as i64);
    ctx.backend
        .prune_inactive(ReferenceTable::KnownUserAgents, cutoff)
        .await?;

    Ok(total)
}

async fn ingest_source(
    ctx: &JobContext<'_>,
    url: &str,
    batch: &mut Vec<KnownUserAgent>,
    deactivated: &mut bool,
    total: &mut u64,
    batch_size: usize,
) -> Result<u64> {
    let path = ctx.fetcher.fetch_to_file(url).await?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| RuntimeError::Feed(e.to_string()))?;
    let entries: Vec<UaEntry> = serde_json::from_str(&raw)
        .map_err(|e| RuntimeError::Feed(format!("{}: {}", url, e)))?;

    let mut count = 0u64;
    for entry in entries {
        let Some(pattern) = entry.pattern.as_deref().or(entry.user_agent.as_deref()) else {
            tracing::debug!(source = %url, "Skipping user agent entry without pattern");
            continue;
        };
        let name = entry.name.as_deref().or(entry.browser.as_deref());
        let agent_type = classify(pattern, name);

        batch.push(build_row(
            pattern,
            name,
            entry.version.as_deref(),
            agent_type,
            type_weight(agent_type),
        ));
        count += 1;
        if batch.len() >= batch_size {
            flush(ctx, batch, deactivated, total).await?;
        }
    }
    Ok(count)
}

async fn flush(
    ctx: &JobContext<'_>,
    batch: &mut Vec<KnownUserAgent>,
    deactivated: &mut bool,
    total: &mut u64,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    if !*deactivated {
        ctx.backend
            .deactivate_all(ReferenceTable::KnownUserAgents)
            .await?;
        *deactivated = true;
    }
    *total += ctx.backend.upsert_known_user_agents(batch).await?;
    batch.clear();
    watch_memory(ctx.config.memory_limit_bytes, ctx.config.memory_warn_ratio);
    tokio::task::yield_now().await;
    Ok(())
}

fn build_row(
    pattern: &str,
    name: Option<&str>,
    version: Option<&str>,
    agent_type: AgentType,
    risk_weight: i16,
) -> KnownUserAgent {
    KnownUserAgent {
        user_agent_hash: hex::encode(Sha256::digest(pattern.as_bytes())),
        agent_type,
        name: name.map(|n| n.to_string()),
        version: version.map(|v| v.to_string()),
        risk_weight,
        is_outdated: false,
        eol_date: None,
        is_active: true,
    }
}

fn classify(pattern: &str, name: Option<&str>) -> AgentType {
    let haystack = format!("{} {}", pattern, name.unwrap_or_default()).to_lowercase();

    if CURATED_PATTERNS
        .iter()
        .filter(|(_, t, _)| *t == AgentType::Malicious)
        .any(|(p, _, _)| haystack.contains(p))
    {
        return AgentType::Malicious;
    }
    if haystack.contains("scrap") {
        return AgentType::Scraper;
    }
    if haystack.contains("chrome") || haystack.contains("firefox") || haystack.contains("safari") {
        return AgentType::Browser;
    }
    AgentType::Bot
}

fn type_weight(agent_type: AgentType) -> i16 {
    match agent_type {
        AgentType::Malicious => 95,
        AgentType::Scraper => 70,
        AgentType::Bot => 60,
        AgentType::Browser => 10,
        AgentType::Unknown => 40,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("Googlebot/2.1", Some("Googlebot")), AgentType::Bot);
        assert_eq!(classify("sqlmap/1.7", None), AgentType::Malicious);
        assert_eq!(classify("DataScraper 1.0", None), AgentType::Scraper);
        assert_eq!(
            classify("Mozilla/5.0 Chrome/120", Some("Chrome")),
            AgentType::Browser
        );
    }

    #[test]
    fn test_build_row_hashes_pattern() {
        let row = build_row("curl", Some("curl"), None, AgentType::Bot, 50);
        assert_eq!(
            row.user_agent_hash,
            hex::encode(Sha256::digest(b"curl"))
        );
        assert!(row.is_active);
    }
}
