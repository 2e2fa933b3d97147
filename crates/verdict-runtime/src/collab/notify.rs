//! High-risk event notification
//!
//! Fire-and-forget from the evaluator's perspective: the evaluator spawns the
//! delivery and returns without waiting. Failures are logged, never surfaced.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use verdict_core::Decision;

/// Event emitted when an evaluation scores at or above the block band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighRiskEvent {
    pub evaluation_id: Uuid,
    pub risk_score: u8,
    pub decision: Decision,
    pub failed_checks: Vec<String>,
}

/// Downstream notification collaborator
#[async_trait]
pub trait RiskNotifier: Send + Sync {
    async fn notify(&self, event: &HighRiskEvent) -> Result<()>;
}

/// Webhook delivery via HTTP POST
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RiskNotifier for WebhookNotifier {
    async fn notify(&self, event: &HighRiskEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| RuntimeError::Collaborator(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RuntimeError::Collaborator(format!(
                "webhook answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// No-op notifier for deployments without a webhook
#[derive(Default)]
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RiskNotifier for NoopNotifier {
    async fn notify(&self, _event: &HighRiskEvent) -> Result<()> {
        Ok(())
    }
}
