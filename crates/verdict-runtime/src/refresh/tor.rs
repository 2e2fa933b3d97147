//! Tor exit node refresh
//!
//! Two feed shapes: plain newline-delimited exit lists, and an optional
//! paginated JSON endpoint carrying per-relay metadata.

use super::feed::watch_memory;
use super::JobContext;
use crate::error::{Result, RuntimeError};
use crate::net;
use crate::refdata::models::TorExitNode;
use crate::refdata::ReferenceTable;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Hard stop for the paginated endpoint
const MAX_DETAIL_PAGES: u32 = 1000;

#[derive(Debug, Deserialize)]
struct RelayEntry {
    nickname: Option<String>,
    fingerprint: Option<String>,
    #[serde(default)]
    exit_addresses: Vec<String>,
    last_seen: Option<String>,
}

pub(super) async fn run(ctx: &JobContext<'_>) -> Result<u64> {
    let batch_size = ctx.config.batch_sizes.tor;
    let mut job = TorJob {
        ctx,
        batch: Vec::with_capacity(batch_size),
        batch_size,
        deactivated: false,
        total: 0,
    };

    let mut sources_ok = 0usize;
    for url in &ctx.config.feeds.tor_lists {
        match job.ingest_plain_list(url).await {
            Ok(count) => {
                sources_ok += 1;
                tracing::info!(source = %url, count, "Tor list ingested");
            }
            Err(e) => tracing::error!(source = %url, "Tor list failed: {}", e),
        }
    }
    if let Some(url) = &ctx.config.feeds.tor_detail {
        match job.ingest_detail_pages(url).await {
            Ok(count) => {
                sources_ok += 1;
                tracing::info!(source = %url, count, "Tor detail feed ingested");
            }
            Err(e) => tracing::error!(source = %url, "Tor detail feed failed: {}", e),
        }
    }

    if sources_ok == 0 {
        return Err(RuntimeError::Feed("every tor source failed".to_string()));
    }

    job.flush().await?;
    let cutoff = Utc::now() - chrono::Duration::days(ctx.config.inactive_retention_days as i64);
    ctx.backend
        .prune_inactive(ReferenceTable::TorExitNodes, cutoff)
        .await?;

    Ok(job.total)
}

struct TorJob<'a, 'b> {
    ctx: &'a JobContext<'b>,
    batch: Vec<TorExitNode>,
    batch_size: usize,
    deactivated: bool,
    total: u64,
}

impl TorJob<'_, '_> {
    async fn push(&mut self, node: TorExitNode) -> Result<()> {
        self.batch.push(node);
        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        // The active set flips to inactive right before the run's first
        // batch, so a completed run is snapshot-consistent
        if !self.deactivated {
            self.ctx
                .backend
                .deactivate_all(ReferenceTable::TorExitNodes)
                .await?;
            self.deactivated = true;
        }
        self.total += self.ctx.backend.upsert_tor_nodes(&self.batch).await?;
        self.batch.clear();
        watch_memory(
            self.ctx.config.memory_limit_bytes,
            self.ctx.config.memory_warn_ratio,
        );
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn ingest_plain_list(&mut self, url: &str) -> Result<u64> {
        let path = self.ctx.fetcher.fetch_to_file(url).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();

        let mut count = 0u64;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?
        {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match net::parse_ip(line) {
                Ok(ip) => {
                    self.push(TorExitNode::from_ip(ip.to_string(), net::ip_version(&ip)))
                        .await?;
                    count += 1;
                }
                Err(_) => tracing::debug!(source = %url, line, "Skipping malformed tor line"),
            }
        }
        Ok(count)
    }

    async fn ingest_detail_pages(&mut self, url: &str) -> Result<u64> {
        let mut count = 0u64;
        for page in 1..=MAX_DETAIL_PAGES {
            let separator = if url.contains('?') { '&' } else { '?' };
            let page_url = format!("{}{}page={}", url, separator, page);
            let path = self.ctx.fetcher.fetch_to_file(&page_url).await?;
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| RuntimeError::Feed(e.to_string()))?;

            let entries: Vec<RelayEntry> = serde_json::from_str(&raw)
                .map_err(|e| RuntimeError::Feed(format!("{}: {}", page_url, e)))?;
            if entries.is_empty() {
                break;
            }

            for entry in entries {
                let last_seen = entry.last_seen.as_deref().and_then(parse_last_seen);
                for address in &entry.exit_addresses {
                    let Some(ip) = parse_exit_address(address) else {
                        tracing::debug!(address, "Skipping malformed exit address");
                        continue;
                    };
                    let mut node = TorExitNode::from_ip(ip.to_string(), net::ip_version(&ip));
                    node.node_id = entry.fingerprint.clone();
                    node.nickname = entry.nickname.clone();
                    node.last_seen_at = last_seen;
                    self.push(node).await?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

/// Exit addresses arrive as `ip` or `ip:port`
fn parse_exit_address(address: &str) -> Option<std::net::IpAddr> {
    let address = address.trim();
    if let Ok(ip) = address.parse() {
        return Some(ip);
    }
    let (host, _port) = address.rsplit_once(':')?;
    host.trim_matches(|c| c == '[' || c == ']').parse().ok()
}

fn parse_last_seen(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exit_address() {
        assert_eq!(
            parse_exit_address("185.220.101.1"),
            Some("185.220.101.1".parse().unwrap())
        );
        assert_eq!(
            parse_exit_address("185.220.101.1:443"),
            Some("185.220.101.1".parse().unwrap())
        );
        assert_eq!(
            parse_exit_address("[2001:db8::1]:9001"),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(parse_exit_address("not-an-ip"), None);
    }

    #[test]
    fn test_parse_last_seen() {
        assert!(parse_last_seen("2024-03-01 18:00:00").is_some());
        assert!(parse_last_seen("2024-03-01T18:00:00Z").is_some());
        assert!(parse_last_seen("yesterday").is_none());
    }
}
