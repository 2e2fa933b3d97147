//! Disposable email domain refresh
//!
//! Sources come in two shapes: newline-delimited text (comments with `#` or
//! `//`, wildcard `*.` entries) and JSON arrays of domain strings. The shape
//! is sniffed from the first byte.

use super::feed::watch_memory;
use super::JobContext;
use crate::error::{Result, RuntimeError};
use crate::net::is_valid_hostname;
use crate::refdata::models::{DisposableEmailDomain, DISPOSABLE_DEFAULT_WEIGHT};
use crate::refdata::ReferenceTable;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Provider-name fragments that mark overtly throwaway services
const RISKY_KEYWORDS: &[&str] = &["temp", "trash", "fake", "disposable", "throw", "spam", "junk"];

/// Weight bump for overtly throwaway provider names
const KEYWORD_BUMP: i16 = 10;

pub(super) async fn run(ctx: &JobContext<'_>) -> Result<u64> {
    let batch_size = ctx.config.batch_sizes.disposable_emails;
    let mut batch: Vec<DisposableEmailDomain> = Vec::with_capacity(batch_size);
    let mut deactivated = false;
    let mut total = 0u64;
    let mut sources_ok = 0usize;

    for url in &ctx.config.feeds.disposable_emails {
        match ingest_source(ctx, url, &mut batch, &mut deactivated, &mut total, batch_size).await {
            Ok(count) => {
                sources_ok += 1;
                tracing::info!(source = %url, count, "Disposable domain list ingested");
            }
            Err(e) => tracing::error!(source = %url, "Disposable domain list failed: {}", e),
        }
    }

    if sources_ok == 0 {
        return Err(RuntimeError::Feed(
            "every disposable domain source failed".to_string(),
        ));
    }

    flush(ctx, &mut batch, &mut deactivated, &mut total).await?;
    let cutoff = Utc::now() - chrono::Duration::days(ctx.config.inactive_retention_days as i64);
    ctx.backend
        .prune_inactive(ReferenceTable::DisposableEmailDomains, cutoff)
        .await?;

    Ok(total)
}

async fn ingest_source(
    ctx: &JobContext<'_>,
    url: &str,
    batch: &mut Vec<DisposableEmailDomain>,
    deactivated: &mut bool,
    total: &mut u64,
    batch_size: usize,
) -> Result<u64> {
    let path = ctx.fetcher.fetch_to_file(url).await?;

    let mut count = 0u64;
    if is_json_file(&path).await? {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;
        let domains: Vec<String> = serde_json::from_str(&raw)
            .map_err(|e| RuntimeError::Feed(format!("{}: {}", url, e)))?;
        for domain in domains {
            if let Some(row) = normalize_entry(&domain, url) {
                batch.push(row);
                count += 1;
                if batch.len() >= batch_size {
                    flush(ctx, batch, deactivated, total).await?;
                }
            }
        }
    } else {
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?
        {
            if let Some(row) = normalize_entry(&line, url) {
                batch.push(row);
                count += 1;
                if batch.len() >= batch_size {
                    flush(ctx, batch, deactivated, total).await?;
                }
            }
        }
    }
    Ok(count)
}

async fn flush(
    ctx: &JobContext<'_>,
    batch: &mut Vec<DisposableEmailDomain>,
    deactivated: &mut bool,
    total: &mut u64,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    if !*deactivated {
        ctx.backend
            .deactivate_all(ReferenceTable::DisposableEmailDomains)
            .await?;
        *deactivated = true;
    }
    *total += ctx.backend.upsert_disposable_domains(batch).await?;
    batch.clear();
    watch_memory(ctx.config.memory_limit_bytes, ctx.config.memory_warn_ratio);
    tokio::task::yield_now().await;
    Ok(())
}

async fn is_json_file(path: &std::path::Path) -> Result<bool> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| RuntimeError::Feed(e.to_string()))?;
    let mut head = [0u8; 64];
    let read = file
        .read(&mut head)
        .await
        .map_err(|e| RuntimeError::Feed(e.to_string()))?;

    Ok(head[..read]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'[')
        .unwrap_or(false))
}

fn normalize_entry(raw: &str, source: &str) -> Option<DisposableEmailDomain> {
    let mut entry = raw.trim();
    if entry.is_empty() || entry.starts_with('#') || entry.starts_with("//") {
        return None;
    }
    entry = entry.strip_prefix("*.").unwrap_or(entry);

    let domain = entry.to_lowercase();
    if !is_valid_hostname(&domain) {
        tracing::debug!(entry = %raw, "Skipping malformed disposable domain entry");
        return None;
    }

    let mut risk_weight = DISPOSABLE_DEFAULT_WEIGHT;
    if RISKY_KEYWORDS.iter().any(|kw| domain.contains(kw)) {
        risk_weight = (risk_weight + KEYWORD_BUMP).min(100);
    }

    Some(DisposableEmailDomain {
        domain,
        source: source.to_string(),
        risk_weight,
        is_active: true,
    })
}
