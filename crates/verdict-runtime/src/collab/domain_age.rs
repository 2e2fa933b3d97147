//! Domain registration age collaborator
//!
//! RDAP is the structured successor to WHOIS; the registration event date is
//! all the domain check needs. A `None` age contributes nothing to the score.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Domain age collaborator
#[async_trait]
pub trait DomainAgeProvider: Send + Sync {
    /// Days since registration, when the registry discloses it
    async fn age_days(&self, domain: &str) -> Result<Option<i64>>;
}

/// RDAP client. Expects `GET {base}/{domain}` returning an RDAP domain
/// object with an `events` array carrying a `registration` event.
pub struct RdapDomainAgeProvider {
    client: reqwest::Client,
    base_url: String,
}

impl RdapDomainAgeProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl DomainAgeProvider for RdapDomainAgeProvider {
    async fn age_days(&self, domain: &str) -> Result<Option<i64>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), domain);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

        let registered = body
            .get("events")
            .and_then(|v| v.as_array())
            .and_then(|events| {
                events.iter().find(|e| {
                    e.get("eventAction").and_then(|a| a.as_str()) == Some("registration")
                })
            })
            .and_then(|e| e.get("eventDate"))
            .and_then(|d| d.as_str())
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok());

        Ok(registered.map(|date| (Utc::now() - date.with_timezone(&Utc)).num_days()))
    }
}

/// Scripted provider for tests
#[derive(Default)]
pub struct MockDomainAgeProvider {
    ages: HashMap<String, i64>,
}

impl MockDomainAgeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_age(mut self, domain: &str, age_days: i64) -> Self {
        self.ages.insert(domain.to_string(), age_days);
        self
    }
}

#[async_trait]
impl DomainAgeProvider for MockDomainAgeProvider {
    async fn age_days(&self, domain: &str) -> Result<Option<i64>> {
        Ok(self.ages.get(domain).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockDomainAgeProvider::new().with_age("example.com", 9000);

        assert_eq!(
            provider.age_days("example.com").await.unwrap(),
            Some(9000)
        );
        assert_eq!(provider.age_days("new.io").await.unwrap(), None);
    }
}
