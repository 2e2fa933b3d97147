//! Signal checks
//!
//! Each check inspects one identity signal and returns a sub-score with a
//! structured detail record. Scores are additive across sub-rules and capped
//! at 100; a check fails when its score reaches 80 or a hard-fail sub-rule
//! fires. Checks share a context of services and collaborators and never
//! talk to each other.

mod credit_card;
mod domain;
mod email;
mod ip;
mod phone;
mod user_agent;

pub use credit_card::CreditCardCheck;
pub use domain::DomainCheck;
pub use email::EmailCheck;
pub use ip::IpCheck;
pub use phone::PhoneCheck;
pub use user_agent::UserAgentCheck;

use crate::audit::AuditStore;
use crate::collab::{AsnProvider, DnsResolver, DomainAgeProvider, GeoProvider, PageFetcher};
use crate::config::EngineConfig;
use crate::crypto::FieldHasher;
use crate::error::{Result, RuntimeError};
use crate::refdata::ReferenceData;
use crate::velocity::VelocityStore;
use async_trait::async_trait;
use std::sync::Arc;
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput};

/// Shared services handed to every check
pub struct CheckContext {
    pub config: Arc<EngineConfig>,
    pub hasher: Arc<FieldHasher>,
    pub refdata: Arc<ReferenceData>,
    pub velocity: Arc<dyn VelocityStore>,
    pub audit: Arc<dyn AuditStore>,
    pub dns: Arc<dyn DnsResolver>,
    pub geo: Arc<dyn GeoProvider>,
    pub asn_api: Arc<dyn AsnProvider>,
    pub domain_age: Arc<dyn DomainAgeProvider>,
    pub pages: Arc<dyn PageFetcher>,
}

/// A signal check
#[async_trait]
pub trait Check: Send + Sync {
    /// Check identity; results are keyed by this, never by completion order
    fn kind(&self) -> CheckKind;

    /// Whether the input carries the signal this check inspects
    fn applicable(&self, input: &EvaluationInput) -> bool;

    /// Run the check. Store errors propagate; everything else is handled
    /// inside the check or captured by the evaluator.
    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome>;
}

/// Build the registry of enabled checks
pub fn registry(config: &EngineConfig) -> Vec<Arc<dyn Check>> {
    let all: Vec<Arc<dyn Check>> = vec![
        Arc::new(EmailCheck),
        Arc::new(DomainCheck),
        Arc::new(IpCheck),
        Arc::new(CreditCardCheck),
        Arc::new(PhoneCheck),
        Arc::new(UserAgentCheck),
    ];

    all.into_iter()
        .filter(|check| config.checks.enabled(check.kind()))
        .collect()
}

/// Running sub-rule tally for one check
pub(crate) struct Tally {
    score: u32,
    hard_fail: bool,
    details: serde_json::Map<String, serde_json::Value>,
}

impl Tally {
    pub(crate) fn new() -> Self {
        Self {
            score: 0,
            hard_fail: false,
            details: serde_json::Map::new(),
        }
    }

    /// Add sub-rule points
    pub(crate) fn add(&mut self, points: u32) {
        self.score += points;
    }

    /// Mark a hard-fail sub-rule; the check cannot pass regardless of score
    pub(crate) fn hard_fail(&mut self) {
        self.hard_fail = true;
    }

    /// Raw (uncapped) score accumulated so far
    pub(crate) fn raw_score(&self) -> u32 {
        self.score
    }

    /// Record a detail field
    pub(crate) fn detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    pub(crate) fn into_outcome(self) -> CheckOutcome {
        let score = self.score.min(100) as u8;
        CheckOutcome {
            passed: !self.hard_fail && score < 80,
            score,
            details: serde_json::Value::Object(self.details),
        }
    }
}

/// Soften collaborator-grade failures to "no signal".
///
/// Collaborator timeouts and counter-store hiccups contribute 0 to the
/// sub-rule that needed them and log at debug. Reference/audit store errors
/// propagate: a score computed without the store would be materially wrong.
pub(crate) fn soften<T>(result: Result<T>, what: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RuntimeError::Collaborator(e)) | Err(RuntimeError::Velocity(e)) => {
            tracing::debug!("{} degraded: {}", what, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
