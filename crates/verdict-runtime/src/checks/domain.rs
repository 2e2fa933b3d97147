//! Domain check
//!
//! Hostname validity, mail routability, registration age, parked-page
//! detection, DNS posture and historical reputation. Applicable whenever a
//! domain is present or derivable from the email.

use super::{soften, Check, CheckContext, Tally};
use crate::audit::ReputationKey;
use crate::error::Result;
use crate::net::is_valid_hostname;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput};

/// Body fragments that identify a parked or for-sale lander
const PARKED_INDICATORS: &[&str] = &[
    "domain is for sale",
    "this domain is parked",
    "buy this domain",
    "domain parking",
    "parked free",
    "sedoparking",
    "parkingcrew",
    "hugedomains",
    "afternic",
    "domain may be for sale",
];

/// Upper bound on the parked-page probe body
const PARKED_PROBE_MAX_BYTES: usize = 64 * 1024;

const REPUTATION_WINDOW_DAYS: i64 = 183;

pub struct DomainCheck;

#[async_trait]
impl Check for DomainCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Domain
    }

    fn applicable(&self, input: &EvaluationInput) -> bool {
        input.effective_domain().is_some()
    }

    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome> {
        let domain = input.effective_domain().unwrap_or_default();
        let mut tally = Tally::new();

        if !is_valid_hostname(&domain) {
            tally.add(100);
            tally.hard_fail();
            tally.detail("valid", false);
            return Ok(tally.into_outcome());
        }
        tally.detail("valid", true);

        if let Some(has_mx) = soften(ctx.dns.has_mx(&domain).await, "domain mx lookup")? {
            tally.detail("mx", has_mx);
            if !has_mx {
                tally.add(50);
                tally.hard_fail();
            }
        }

        if let Some(age_days) =
            soften(ctx.domain_age.age_days(&domain).await, "domain age lookup")?.flatten()
        {
            tally.detail("age_days", age_days);
            if age_days < 30 {
                tally.add(40);
                tally.detail("new_domain", true);
            } else if age_days < 180 {
                tally.add(20);
            }
        }

        let probe_url = format!("http://{}/", domain);
        if let Some(Some(body)) = soften(
            ctx.pages.fetch_body(&probe_url, PARKED_PROBE_MAX_BYTES).await,
            "parked-domain probe",
        )? {
            let body = body.to_lowercase();
            if PARKED_INDICATORS.iter().any(|needle| body.contains(needle)) {
                tally.add(60);
                tally.hard_fail();
                tally.detail("parked", true);
            }
        }

        if let Some(has_address) =
            soften(ctx.dns.has_address(&domain).await, "domain address lookup")?
        {
            tally.detail("has_address", has_address);
            if !has_address {
                tally.add(20);
            }
        }
        if let Some(has_spf) = soften(ctx.dns.has_spf(&domain).await, "domain spf lookup")? {
            tally.detail("has_spf", has_spf);
            if !has_spf {
                tally.add(10);
            }
        }

        let since = Utc::now() - Duration::days(REPUTATION_WINDOW_DAYS);
        let reputation = ctx
            .audit
            .reputation(ReputationKey::Domain(domain.clone()), since)
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
                tally.add(30);
            }
            if reputation.block_count > 5 {
                tally.add(40);
            }
        }

        Ok(tally.into_outcome())
    }
}
