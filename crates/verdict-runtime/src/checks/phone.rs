//! Phone check
//!
//! E.164 parsing, blocklists, number-type scoring, declared-country
//! consistency, formatting anomalies, velocity and disposable-number
//! prefixes.

use super::{soften, Check, CheckContext, Tally};
use crate::error::Result;
use crate::phone::{self, NumberType};
use crate::refdata::BlacklistKind;
use async_trait::async_trait;
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput, Window};

/// Ascending digit runs that mark keyboard-walk numbers
const SEQUENTIAL_RUNS: &[&str] = &[
    "0123", "1234", "2345", "3456", "4567", "5678", "6789", "7890",
];

pub struct PhoneCheck;

fn type_points(number_type: NumberType) -> u32 {
    match number_type {
        NumberType::Mobile => 0,
        NumberType::FixedLine => 10,
        NumberType::Unknown => 20,
        NumberType::SharedCost => 30,
        NumberType::Voip => 40,
        NumberType::TollFree => 50,
        NumberType::PremiumRate => 60,
    }
}

fn has_format_anomaly(raw: &str, digits: &str) -> bool {
    let strange_chars = raw
        .chars()
        .filter(|c| !c.is_ascii_digit() && !matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
        .count();
    if strange_chars > 2 {
        return true;
    }

    let mut run = 0usize;
    let mut last = None;
    for c in digits.chars() {
        if Some(c) == last {
            run += 1;
            if run >= 7 {
                return true;
            }
        } else {
            run = 1;
            last = Some(c);
        }
    }

    SEQUENTIAL_RUNS.iter().any(|seq| digits.contains(seq))
}

fn hour_velocity_points(count: u64) -> u32 {
    if count > 5 {
        25
    } else if count > 2 {
        15
    } else {
        0
    }
}

#[async_trait]
impl Check for PhoneCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Phone
    }

    fn applicable(&self, input: &EvaluationInput) -> bool {
        input
            .phone
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }

    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome> {
        let raw = input.phone.as_deref().unwrap_or_default();
        let mut tally = Tally::new();

        let parsed = match phone::parse(raw, input.country.as_deref()) {
            Ok(parsed) => parsed,
            Err(_) => {
                tally.add(100);
                tally.hard_fail();
                tally.detail("valid", false);
                return Ok(tally.into_outcome());
            }
        };
        tally.detail("valid", true);
        tally.detail("country_code", parsed.country_code);

        let phone_hash = ctx.hasher.hash(&parsed.e164);
        if let Some(entry) = ctx
            .refdata
            .blacklist_entry(BlacklistKind::Phone, &phone_hash)
            .await?
        {
            tally.add(100);
            tally.hard_fail();
            tally.detail("blacklisted", true);
            if let Some(reason) = entry.reason {
                tally.detail("blacklist_reason", reason);
            }
        }

        let number_type = parsed.number_type();
        tally.add(type_points(number_type));
        tally.detail("number_type", number_type.as_str());

        if let Some(declared) = input.declared_country() {
            if !parsed.matches_region(&declared) {
                tally.add(30);
                tally.detail("country_mismatch", true);
            }
        }

        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if has_format_anomaly(raw, &digits) {
            tally.add(15);
            tally.detail("format_anomaly", true);
        }

        let hour = soften(
            ctx.velocity.bump("phone", &phone_hash, Window::Hour).await,
            "phone hour velocity",
        )?;
        let day = soften(
            ctx.velocity.bump("phone", &phone_hash, Window::Day).await,
            "phone day velocity",
        )?;
        if hour.is_some() || day.is_some() {
            let mut points = 0u32;
            if let Some(count) = hour {
                points += hour_velocity_points(count);
            }
            if let Some(count) = day {
                if count > 10 {
                    points += 20;
                }
            }
            tally.add(points);
            tally.detail(
                "velocity",
                serde_json::json!({
                    "hour": hour,
                    "day": day,
                    "risk_score": points,
                }),
            );
        }

        if ctx
            .config
            .disposable_phone_prefixes
            .iter()
            .any(|prefix| parsed.e164.starts_with(prefix.as_str()))
        {
            tally.add(50);
            tally.detail("disposable_prefix", true);
        }

        Ok(tally.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testutil::ContextBuilder;
    use crate::refdata::models::BlacklistEntry;
    use crate::refdata::ReferenceBackend;
    use std::sync::Arc;

    fn input(phone: &str, country: Option<&str>) -> EvaluationInput {
        EvaluationInput {
            phone: Some(phone.to_string()),
            country: country.map(|c| c.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mobile_scores_zero() {
        let ctx = ContextBuilder::new().build();

        let outcome = PhoneCheck
            .perform(&input("+1 650 555 0147", None), &ctx)
            .await
            .unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.details["number_type"], "mobile");
    }

    #[tokio::test]
    async fn test_invalid_phone_hard_fails() {
        let ctx = ContextBuilder::new().build();

        let outcome = PhoneCheck
            .perform(&input("12345", None), &ctx)
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["valid"], false);
    }

    #[tokio::test]
    async fn test_blacklisted_phone() {
        let builder = ContextBuilder::new();
        let backend = Arc::clone(&builder.backend);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("+16505550147");
        backend
            .upsert_blacklist_entries(&[BlacklistEntry {
                value_hash: hash,
                kind: BlacklistKind::Phone,
                reason: None,
                risk_weight: 100,
                report_count: 0,
                last_seen_at: None,
            }])
            .await
            .unwrap();

        let outcome = PhoneCheck
            .perform(&input("(650) 555-0147", Some("US")), &ctx)
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["blacklisted"], true);
    }

    #[tokio::test]
    async fn test_number_type_scoring() {
        let ctx = ContextBuilder::new().build();

        let outcome = PhoneCheck
            .perform(&input("+1 800 555 0100", None), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 50);
        assert_eq!(outcome.details["number_type"], "toll_free");

        let outcome = PhoneCheck
            .perform(&input("+1 900 555 0100", None), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 60);
        assert_eq!(outcome.details["number_type"], "premium_rate");

        let outcome = PhoneCheck
            .perform(&input("+1 500 555 0100", None), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 40);
        assert_eq!(outcome.details["number_type"], "voip");

        let outcome = PhoneCheck
            .perform(&input("+44 20 7123 4567", None), &ctx)
            .await
            .unwrap();
        // fixed line (+10) with a sequential digit run (+15)
        assert_eq!(outcome.score, 25);
        assert_eq!(outcome.details["number_type"], "fixed_line");
    }

    #[tokio::test]
    async fn test_country_mismatch() {
        let ctx = ContextBuilder::new().build();

        let outcome = PhoneCheck
            .perform(&input("+447911170452", Some("US")), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 30);
        assert_eq!(outcome.details["country_mismatch"], true);
    }

    #[tokio::test]
    async fn test_format_anomalies() {
        let ctx = ContextBuilder::new().build();

        // Repeating run of 7 identical digits
        let outcome = PhoneCheck
            .perform(&input("+1 655 555 5555", None), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.details["format_anomaly"], true);

        // Strange characters beyond formatting
        let outcome = PhoneCheck
            .perform(&input("+1#650#555#0123", None), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.details["format_anomaly"], true);
    }

    #[tokio::test]
    async fn test_disposable_prefix() {
        let mut builder = ContextBuilder::new();
        builder.config.disposable_phone_prefixes = vec!["+1659".to_string()];
        let ctx = builder.build();

        let outcome = PhoneCheck
            .perform(&input("+1 659 555 0147", None), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 50);
        assert_eq!(outcome.details["disposable_prefix"], true);
    }

    #[tokio::test]
    async fn test_velocity_tiers() {
        let builder = ContextBuilder::new();
        let velocity = Arc::clone(&builder.velocity);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("+16505550147");
        for _ in 0..3 {
            crate::velocity::VelocityStore::bump(&*velocity, "phone", &hash, Window::Hour)
                .await
                .unwrap();
        }

        let outcome = PhoneCheck
            .perform(&input("+16505550147", None), &ctx)
            .await
            .unwrap();
        // 4th bump in the hour: > 2
        assert_eq!(outcome.score, 15);
        assert_eq!(outcome.details["velocity"]["risk_score"], 15);
    }
}
