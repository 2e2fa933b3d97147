//! Feed transport
//!
//! Feeds are streamed to a temporary file and then read back line by line,
//! so a multi-million-row list never has to fit in memory. The fetcher is a
//! trait so refresh jobs can run against canned bytes in tests.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Feed download collaborator
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Stream a URL's body to a temporary file and return its path
    async fn fetch_to_file(&self, url: &str) -> Result<TempPath>;
}

/// reqwest-backed fetcher with streaming download
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Covers connect and time-to-first-byte; large bodies keep
            // streaming past it
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_to_file(&self, url: &str) -> Result<TempPath> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RuntimeError::Feed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(RuntimeError::Feed(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let temp = tempfile::NamedTempFile::new()
            .map_err(|e| RuntimeError::Feed(e.to_string()))?
            .into_temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RuntimeError::Feed(format!("{}: {}", url, e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| RuntimeError::Feed(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;

        Ok(temp)
    }
}

/// Canned fetcher for tests
#[derive(Default)]
pub struct MockFeedFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl MockFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }
}

#[async_trait]
impl FeedFetcher for MockFeedFetcher {
    async fn fetch_to_file(&self, url: &str) -> Result<TempPath> {
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| RuntimeError::Feed(format!("no fixture for {}", url)))?;

        let temp = tempfile::NamedTempFile::new()
            .map_err(|e| RuntimeError::Feed(e.to_string()))?
            .into_temp_path();
        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| RuntimeError::Feed(e.to_string()))?;
        Ok(temp)
    }
}

/// Resident set size of this process, when the platform exposes it
pub(super) fn rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Log a warning when resident memory crosses the advisory ceiling.
/// Called between batches; purely observational.
pub(super) fn watch_memory(limit_bytes: u64, warn_ratio: f64) {
    if let Some(rss) = rss_bytes() {
        let ceiling = (limit_bytes as f64 * warn_ratio) as u64;
        if rss > ceiling {
            tracing::warn!(
                rss_bytes = rss,
                ceiling_bytes = ceiling,
                "Refresh memory above advisory ceiling"
            );
        }
    }
}
