//! IP-to-ASN collaborator
//!
//! Fallback for addresses not covered by the stored ASN ranges. The hint only
//! carries the number and organization; classification still comes from the
//! reference table when the ASN is known there.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// ASN hint from the collaborator API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnHint {
    pub asn: i64,
    pub organization: Option<String>,
}

/// IP-to-ASN collaborator
#[async_trait]
pub trait AsnProvider: Send + Sync {
    async fn asn_of(&self, ip: &IpAddr) -> Result<Option<AsnHint>>;
}

/// HTTP client. Expects `GET {base}/{ip}` returning JSON with `asn` and
/// optionally `organization`/`org`.
pub struct HttpAsnProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAsnProvider {
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
impl AsnProvider for HttpAsnProvider {
    async fn asn_of(&self, ip: &IpAddr) -> Result<Option<AsnHint>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
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

        let Some(asn) = body.get("asn").and_then(|v| v.as_i64()) else {
            return Ok(None);
        };
        let organization = body
            .get("organization")
            .or_else(|| body.get("org"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Some(AsnHint { asn, organization }))
    }
}

/// Provider used when no ASN endpoint is configured
#[derive(Default)]
pub struct DisabledAsnProvider;

impl DisabledAsnProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AsnProvider for DisabledAsnProvider {
    async fn asn_of(&self, _ip: &IpAddr) -> Result<Option<AsnHint>> {
        Ok(None)
    }
}

/// Scripted provider for tests
#[derive(Default)]
pub struct MockAsnProvider {
    results: HashMap<IpAddr, AsnHint>,
}

impl MockAsnProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asn(mut self, ip: &str, asn: i64, organization: &str) -> Self {
        self.results.insert(
            ip.parse().expect("valid ip in test fixture"),
            AsnHint {
                asn,
                organization: Some(organization.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl AsnProvider for MockAsnProvider {
    async fn asn_of(&self, ip: &IpAddr) -> Result<Option<AsnHint>> {
        Ok(self.results.get(ip).cloned())
    }
}
