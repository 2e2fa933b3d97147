//! Bounded page fetching
//!
//! Used by the parked-domain probe. Bodies are truncated at a hard cap so a
//! hostile page cannot balloon the request.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

/// Bounded HTTP GET collaborator
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch up to `max_bytes` of a page body; `None` when the host does not
    /// answer with a successful response
    async fn fetch_body(&self, url: &str, max_bytes: usize) -> Result<Option<String>>;
}

/// reqwest-backed fetcher
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_body(&self, url: &str, max_bytes: usize) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let mut body = Vec::with_capacity(max_bytes.min(16 * 1024));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RuntimeError::Collaborator(e.to_string()))?;
            let remaining = max_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
            if body.len() >= max_bytes {
                break;
            }
        }

        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }
}

/// Scripted fetcher for tests
#[derive(Default)]
pub struct MockPageFetcher {
    bodies: HashMap<String, String>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch_body(&self, url: &str, max_bytes: usize) -> Result<Option<String>> {
        Ok(self
            .bodies
            .get(url)
            .map(|body| body.chars().take(max_bytes).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_truncates() {
        let fetcher = MockPageFetcher::new().with_body("http://example.com", "0123456789");

        let body = fetcher
            .fetch_body("http://example.com", 4)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, "0123");

        assert!(fetcher
            .fetch_body("http://missing.com", 4)
            .await
            .unwrap()
            .is_none());
    }
}
