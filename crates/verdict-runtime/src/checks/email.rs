//! Email check
//!
//! Syntax, blocklists, local-part composition heuristics, DNS resolvability
//! and historical reputation.

use super::{soften, Check, CheckContext, Tally};
use crate::error::Result;
use crate::refdata::BlacklistKind;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput};

/// Practical RFC-5322 shape: printable local part, LDH domain labels
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("static regex")
});

static CONSECUTIVE_SEPARATORS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[._-]{2,}").expect("static regex"));

static LOWER_ALNUM_16_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]{16,}$").expect("static regex"));

static HEX_16_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-f0-9]{16,}$").expect("static regex"));

/// Local parts that identify a role rather than a person
const ROLE_LOCAL_PARTS: &[&str] = &[
    "admin",
    "support",
    "info",
    "contact",
    "sales",
    "help",
    "webmaster",
    "postmaster",
    "noreply",
    "no-reply",
    "donotreply",
    "abuse",
    "spam",
    "security",
    "billing",
    "legal",
    "privacy",
];

/// Months of history consulted for reputation
const REPUTATION_WINDOW_DAYS: i64 = 183;

pub struct EmailCheck;

fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, _domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    EMAIL_RE.is_match(email)
}

/// High-entropy or machine-generated local parts.
///
/// After stripping separators: either a mixed-case-with-digit string whose
/// unique-character ratio exceeds 0.8, or a long flat [a-z0-9] / hex run.
fn is_random_pattern(local: &str) -> bool {
    let cleaned: String = local.chars().filter(|c| !matches!(c, '.' | '_' | '-')).collect();

    if cleaned.len() >= 8 {
        let unique = cleaned
            .chars()
            .collect::<std::collections::HashSet<_>>()
            .len();
        let ratio = unique as f64 / cleaned.len() as f64;
        let has_lower = cleaned.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = cleaned.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = cleaned.chars().any(|c| c.is_ascii_digit());
        if ratio > 0.8 && has_lower && has_upper && has_digit {
            return true;
        }
    }

    LOWER_ALNUM_16_RE.is_match(&cleaned) || HEX_16_RE.is_match(&cleaned)
}

#[async_trait]
impl Check for EmailCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Email
    }

    fn applicable(&self, input: &EvaluationInput) -> bool {
        input
            .email
            .as_deref()
            .map(|e| !e.trim().is_empty())
            .unwrap_or(false)
    }

    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome> {
        let email = input.email.as_deref().unwrap_or_default().trim().to_lowercase();
        let mut tally = Tally::new();

        if !is_valid_email(&email) {
            tally.add(100);
            tally.hard_fail();
            tally.detail("valid", false);
            return Ok(tally.into_outcome());
        }
        tally.detail("valid", true);

        let (local, domain) = email.rsplit_once('@').expect("validated above");

        // Blocklist membership by keyed hash; plaintext never leaves the check
        let email_hash = ctx.hasher.hash(&email);
        if let Some(entry) = ctx
            .refdata
            .blacklist_entry(BlacklistKind::Email, &email_hash)
            .await?
        {
            tally.add(100);
            tally.hard_fail();
            tally.detail("blacklisted", true);
            if let Some(reason) = entry.reason {
                tally.detail("blacklist_reason", reason);
            }
        }

        if let Some(row) = ctx.refdata.disposable_domain(domain).await? {
            if row.is_active {
                tally.add(row.risk_weight.max(0) as u32);
                tally.hard_fail();
                tally.detail("disposable", true);
                tally.detail("disposable_source", row.source);
            }
        }

        if ROLE_LOCAL_PARTS
            .iter()
            .any(|role| local == *role || local.starts_with(role))
        {
            tally.add(30);
            tally.detail("role_address", true);
        }

        let separators = local.chars().filter(|c| matches!(c, '.' | '_' | '-')).count();
        if separators > 5 {
            tally.add(15);
        } else if separators > 3 {
            tally.add(10);
        }
        if CONSECUTIVE_SEPARATORS_RE.is_match(local) {
            tally.add(20);
            tally.detail("consecutive_separators", true);
        }
        tally.detail("separator_count", separators);

        if local.contains('+') {
            tally.add(20);
            tally.detail("plus_tag", true);
        }

        if local.len() < 3 {
            tally.add(20);
            tally.detail("short_local_part", true);
        } else if local.len() > 30 {
            tally.add(15);
            tally.detail("long_local_part", true);
        }
        if !local.is_empty() && local.chars().all(|c| c.is_ascii_digit()) {
            tally.add(30);
            tally.detail("numeric_local_part", true);
        }
        if is_random_pattern(local) {
            tally.add(25);
            tally.detail("random_pattern", true);
        }

        // DNS is pointless once the score is saturated
        if tally.raw_score() < 100 {
            let mx = soften(ctx.dns.has_mx(domain).await, "email mx lookup")?;
            let resolvable = match mx {
                Some(true) => Some(true),
                Some(false) => {
                    soften(ctx.dns.has_address(domain).await, "email address lookup")?
                }
                None => None,
            };
            if let Some(resolvable) = resolvable {
                tally.detail("resolvable", resolvable);
                if !resolvable {
                    tally.add(50);
                    tally.hard_fail();
                }
            }
        }

        let since = Utc::now() - Duration::days(REPUTATION_WINDOW_DAYS);
        let reputation = ctx
            .audit
            .reputation(crate::audit::ReputationKey::EmailHash(email_hash), since)
            .await?;
        if reputation.evaluations > 0 {
            tally.detail(
                "reputation",
                serde_json::json!({
                    "evaluations": reputation.evaluations,
                    "avg_score": reputation.avg_score,
                    "block_count": reputation.block_count,
                }),
            );
            if reputation.avg_score > 70.0 {
                tally.add(20);
            }
            if reputation.block_count > 2 {
                tally.add(30);
            }
        }

        Ok(tally.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testutil::ContextBuilder;
    use crate::refdata::models::{BlacklistEntry, DisposableEmailDomain};
    use crate::refdata::ReferenceBackend;

    fn input(email: &str) -> EvaluationInput {
        EvaluationInput {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_email_scores_zero() {
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("example.com");
        let ctx = builder.build();

        let outcome = EmailCheck
            .perform(&input("alice@example.com"), &ctx)
            .await
            .unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.details["valid"], true);
    }

    #[tokio::test]
    async fn test_invalid_email_hard_fails() {
        let ctx = ContextBuilder::new().build();

        for email in ["not-an-email", "a@b", "@example.com", "user@@example.com"] {
            let outcome = EmailCheck.perform(&input(email), &ctx).await.unwrap();
            assert!(!outcome.passed, "{} should fail", email);
            assert_eq!(outcome.score, 100);
            assert_eq!(outcome.details["valid"], false);
        }
    }

    #[tokio::test]
    async fn test_blacklisted_email() {
        let builder = ContextBuilder::new();
        let backend = std::sync::Arc::clone(&builder.backend);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("fraud@example.com");
        backend
            .upsert_blacklist_entries(&[BlacklistEntry {
                value_hash: hash,
                kind: crate::refdata::BlacklistKind::Email,
                reason: Some("chargeback ring".to_string()),
                risk_weight: 100,
                report_count: 0,
                last_seen_at: None,
            }])
            .await
            .unwrap();

        let outcome = EmailCheck
            .perform(&input("Fraud@Example.com"), &ctx)
            .await
            .unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["blacklisted"], true);
    }

    #[tokio::test]
    async fn test_disposable_domain() {
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("mailinator.com");
        let backend = std::sync::Arc::clone(&builder.backend);
        let ctx = builder.build();

        backend
            .upsert_disposable_domains(&[DisposableEmailDomain {
                domain: "mailinator.com".to_string(),
                source: "blocklist".to_string(),
                risk_weight: 80,
                is_active: true,
            }])
            .await
            .unwrap();

        let outcome = EmailCheck
            .perform(&input("bob@mailinator.com"), &ctx)
            .await
            .unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.score, 80);
        assert_eq!(outcome.details["disposable"], true);
    }

    #[tokio::test]
    async fn test_role_address() {
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("example.com");
        let ctx = builder.build();

        let outcome = EmailCheck
            .perform(&input("support@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 30);
        assert_eq!(outcome.details["role_address"], true);

        // Prefix also counts
        let outcome = EmailCheck
            .perform(&input("admin42@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 30);
    }

    #[tokio::test]
    async fn test_separator_scoring() {
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("example.com");
        let ctx = builder.build();

        // 4 separators
        let outcome = EmailCheck
            .perform(&input("a.b.c.d.e@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 10);

        // 6 separators
        let outcome = EmailCheck
            .perform(&input("a.b.c.d.e.f.g@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 15);

        // Consecutive separators
        let outcome = EmailCheck
            .perform(&input("john__doe@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 20);
        assert_eq!(outcome.details["consecutive_separators"], true);
    }

    #[tokio::test]
    async fn test_plus_tag() {
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("example.com");
        let ctx = builder.build();

        let outcome = EmailCheck
            .perform(&input("alice+tag@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 20);
        assert_eq!(outcome.details["plus_tag"], true);
    }

    #[tokio::test]
    async fn test_composition_rules() {
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("example.com");
        let ctx = builder.build();

        let outcome = EmailCheck.perform(&input("ab@example.com"), &ctx).await.unwrap();
        assert_eq!(outcome.score, 20);

        let outcome = EmailCheck
            .perform(&input("1234567@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 30);
        assert_eq!(outcome.details["numeric_local_part"], true);

        // 32-char hex string: long local part (+15) and random pattern (+25)
        let outcome = EmailCheck
            .perform(&input("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6@example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 40);
        assert_eq!(outcome.details["random_pattern"], true);
    }

    #[tokio::test]
    async fn test_unresolvable_domain() {
        // Mock has no records for the domain: both lookups answer false
        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_records("example.com", false, false, false);
        let ctx = builder.build();

        let outcome = EmailCheck
            .perform(&input("alice@example.com"), &ctx)
            .await
            .unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.score, 50);
        assert_eq!(outcome.details["resolvable"], false);
    }

    #[tokio::test]
    async fn test_dns_outage_degrades_silently() {
        let mut builder = ContextBuilder::new();
        builder.dns.unreachable = true;
        let ctx = builder.build();

        let outcome = EmailCheck
            .perform(&input("alice@example.com"), &ctx)
            .await
            .unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.score, 0);
    }

    #[tokio::test]
    async fn test_reputation_bumps() {
        use crate::audit::{AuditCompletion, AuditRecord, AuditStore};
        use verdict_core::Decision;

        let mut builder = ContextBuilder::new();
        builder.dns = builder.dns.with_healthy_domain("example.com");
        let audit = std::sync::Arc::clone(&builder.audit);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("repeat@example.com");
        for _ in 0..3 {
            let record = AuditRecord {
                id: uuid::Uuid::new_v4(),
                user_id: None,
                api_key_id: None,
                email_hash: Some(hash.clone()),
                email_cipher: None,
                ip_hash: None,
                ip_cipher: None,
                card_hash: None,
                card_cipher: None,
                phone_hash: None,
                phone_cipher: None,
                user_agent: None,
                domain: None,
                headers: serde_json::json!({}),
                created_at: chrono::Utc::now(),
            };
            let id = record.id;
            let mut txn = audit.begin().await.unwrap();
            txn.insert_pending(&record).await.unwrap();
            txn.finalize(
                id,
                &AuditCompletion {
                    risk_score: 90,
                    check_results: serde_json::json!({}),
                    failed_checks: vec![],
                    passed_checks: vec![],
                    decision: Decision::Block,
                    processing_time_ms: 1,
                },
            )
            .await
            .unwrap();
            txn.commit().await.unwrap();
        }

        let outcome = EmailCheck
            .perform(&input("repeat@example.com"), &ctx)
            .await
            .unwrap();

        // avg 90 > 70 (+20) and 3 blocks > 2 (+30)
        assert_eq!(outcome.score, 50);
    }

    #[test]
    fn test_random_pattern_detection() {
        assert!(is_random_pattern("xK9mP2qR"));
        assert!(is_random_pattern("a1b2c3d4e5f6a7b8"));
        assert!(is_random_pattern("qwertyasdfgh1234"));
        assert!(!is_random_pattern("alice"));
        assert!(!is_random_pattern("john.doe"));
    }
}
