//! Evaluator
//!
//! Orchestrates one evaluation: input validation, hashing and encryption of
//! sensitive fields, the pending audit record, concurrent check fan-out under
//! a single request-scoped deadline, scoring, the decision, audit finalization
//! in the same transaction, and the fire-and-forget high-risk notification.

use crate::audit::{AuditCompletion, AuditRecord, AuditTxn};
use crate::checks::{registry, Check, CheckContext};
use crate::collab::{HighRiskEvent, RiskNotifier};
use crate::config::EngineConfig;
use crate::crypto::SensitiveVault;
use crate::error::{Result, RuntimeError};
use crate::scorer::RiskScorer;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;
use verdict_core::{
    CallerIdentity, CheckKind, CheckOutcome, EvaluationInput, EvaluationReport,
};

/// Headers worth keeping on the audit record
const AUDIT_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "x-originating-ip",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
    "via",
    "true-client-ip",
    "cf-connecting-ip",
    "referer",
    "accept-language",
];

/// The risk evaluation engine entry point
pub struct Evaluator {
    config: Arc<EngineConfig>,
    ctx: Arc<CheckContext>,
    vault: Arc<SensitiveVault>,
    checks: Vec<Arc<dyn Check>>,
    scorer: RiskScorer,
    notifier: Arc<dyn RiskNotifier>,
}

impl Evaluator {
    pub fn new(
        ctx: Arc<CheckContext>,
        vault: Arc<SensitiveVault>,
        notifier: Arc<dyn RiskNotifier>,
    ) -> Self {
        let config = Arc::clone(&ctx.config);
        let checks = registry(&config);
        let scorer = RiskScorer::new(config.decision_thresholds.clone());
        Self {
            config,
            ctx,
            vault,
            checks,
            scorer,
            notifier,
        }
    }

    /// Evaluate one identity bundle
    pub async fn evaluate(
        &self,
        input: EvaluationInput,
        caller: CallerIdentity,
    ) -> Result<EvaluationReport> {
        input.validate().map_err(RuntimeError::InvalidInput)?;

        let started = Instant::now();
        let id = Uuid::new_v4();
        let input = Arc::new(input);

        let record = self.build_pending_record(id, &input, &caller)?;

        let mut txn = self.ctx.audit.begin().await?;
        if let Err(e) = txn.insert_pending(&record).await {
            let _ = txn.rollback().await;
            return Err(e);
        }

        let results = match self.run_checks(&input).await {
            Ok(results) => results,
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(e);
            }
        };

        let risk_score = self.scorer.score(&results);
        let decision = self.scorer.decide(risk_score);

        let checks: BTreeMap<String, CheckOutcome> = results
            .into_iter()
            .map(|(kind, outcome)| (kind.as_str().to_string(), outcome))
            .collect();

        let report = EvaluationReport {
            id,
            risk_score,
            decision,
            checks,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        let completion = AuditCompletion {
            risk_score: risk_score as i16,
            check_results: serde_json::to_value(&report.checks)
                .map_err(|e| RuntimeError::Store(e.to_string()))?,
            failed_checks: report.failed_checks(),
            passed_checks: report.passed_checks(),
            decision,
            processing_time_ms: report.processing_time_ms as i64,
        };

        if let Err(e) = self.finalize(txn, id, &completion).await {
            return Err(e);
        }

        if risk_score >= self.config.decision_thresholds.auto_block {
            self.emit_high_risk(&report);
        }

        tracing::info!(
            evaluation_id = %id,
            risk_score,
            decision = %decision,
            checks = report.checks.len(),
            "Evaluation completed"
        );

        Ok(report)
    }

    fn build_pending_record(
        &self,
        id: Uuid,
        input: &EvaluationInput,
        caller: &CallerIdentity,
    ) -> Result<AuditRecord> {
        let hasher = &self.ctx.hasher;

        // Normalized forms so the same logical value always correlates
        let email = input.email.as_deref().map(|e| e.trim().to_lowercase());
        let ip = input
            .ip
            .as_deref()
            .map(|raw| match crate::net::parse_ip(raw) {
                Ok(parsed) => parsed.to_string(),
                Err(_) => raw.trim().to_string(),
            });
        let card = input
            .credit_card
            .as_deref()
            .map(|c| c.chars().filter(|ch| ch.is_ascii_digit()).collect::<String>());
        let phone = input
            .phone
            .as_deref()
            .map(|raw| match crate::phone::parse(raw, input.country.as_deref()) {
                Ok(parsed) => parsed.e164,
                Err(_) => raw.trim().to_string(),
            });

        let sealed = |value: &Option<String>| -> Result<(Option<String>, Option<String>)> {
            match value {
                Some(v) => Ok((Some(hasher.hash(v)), Some(self.vault.encrypt(v)?))),
                None => Ok((None, None)),
            }
        };

        let (email_hash, email_cipher) = sealed(&email)?;
        let (ip_hash, ip_cipher) = sealed(&ip)?;
        let (card_hash, card_cipher) = sealed(&card)?;
        let (phone_hash, phone_cipher) = sealed(&phone)?;

        let headers: serde_json::Map<String, serde_json::Value> = input
            .headers
            .iter()
            .filter(|(name, _)| AUDIT_HEADERS.contains(&name.to_lowercase().as_str()))
            .map(|(name, values)| {
                (
                    name.to_lowercase(),
                    serde_json::Value::from(values.clone()),
                )
            })
            .collect();

        Ok(AuditRecord {
            id,
            user_id: caller.user_id.clone(),
            api_key_id: caller.api_key_id.clone(),
            email_hash,
            email_cipher,
            ip_hash,
            ip_cipher,
            card_hash,
            card_cipher,
            phone_hash,
            phone_cipher,
            user_agent: input.user_agent.clone(),
            domain: input.effective_domain(),
            headers: serde_json::Value::Object(headers),
            created_at: Utc::now(),
        })
    }

    /// Fan the applicable checks out as parallel tasks and collect them under
    /// the per-evaluation deadline. A check that errors is captured into a
    /// score-50 outcome; a check still running at the deadline is aborted and
    /// contributes a timeout outcome. Store failures abort the evaluation.
    async fn run_checks(
        &self,
        input: &Arc<EvaluationInput>,
    ) -> Result<BTreeMap<CheckKind, CheckOutcome>> {
        let deadline = Instant::now() + Duration::from_millis(self.config.evaluation_deadline_ms);

        let mut handles = Vec::new();
        for check in &self.checks {
            if !check.applicable(input) {
                continue;
            }
            let check = Arc::clone(check);
            let ctx = Arc::clone(&self.ctx);
            let input = Arc::clone(input);
            let kind = check.kind();
            let handle = tokio::spawn(async move { check.perform(&input, &ctx).await });
            handles.push((kind, handle));
        }

        let mut results = BTreeMap::new();
        let mut fatal: Option<RuntimeError> = None;

        for (kind, handle) in handles {
            if fatal.is_some() {
                handle.abort();
                continue;
            }
            let abort = handle.abort_handle();
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Err(_) => {
                    // Cancellation propagates into the check's outstanding
                    // collaborator calls
                    abort.abort();
                    tracing::warn!(check = %kind, "Check hit the evaluation deadline");
                    CheckOutcome::timed_out()
                }
                Ok(Err(join_err)) => {
                    tracing::error!(check = %kind, "Check task failed: {}", join_err);
                    CheckOutcome::internal_error(join_err.to_string())
                }
                Ok(Ok(Ok(outcome))) => outcome,
                Ok(Ok(Err(e @ RuntimeError::Store(_)))) => {
                    fatal = Some(e);
                    continue;
                }
                Ok(Ok(Err(e))) => {
                    tracing::error!(check = %kind, "Check errored: {}", e);
                    CheckOutcome::internal_error(e.to_string())
                }
            };
            results.insert(kind, outcome);
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    async fn finalize(
        &self,
        mut txn: Box<dyn AuditTxn>,
        id: Uuid,
        completion: &AuditCompletion,
    ) -> Result<()> {
        if let Err(e) = txn.finalize(id, completion).await {
            let _ = txn.rollback().await;
            return Err(e);
        }
        txn.commit().await
    }

    fn emit_high_risk(&self, report: &EvaluationReport) {
        let event = HighRiskEvent {
            evaluation_id: report.id,
            risk_score: report.risk_score,
            decision: report.decision,
            failed_checks: report.failed_checks(),
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(
                    evaluation_id = %event.evaluation_id,
                    "High-risk notification failed: {}",
                    e
                );
            }
        });
    }
}
