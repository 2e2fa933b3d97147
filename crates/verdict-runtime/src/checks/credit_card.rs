//! Credit card check
//!
//! Luhn and length screening, brand detection, blocklists, test-card
//! detection, BIN classification and velocity. The PAN itself only ever
//! leaves as a keyed hash.

use super::{soften, Check, CheckContext, Tally};
use crate::error::Result;
use crate::refdata::BlacklistKind;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput, Window};

/// Brand IIN patterns, checked in order
static BRAND_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("visa", Regex::new(r"^4\d{12}(\d{3})?(\d{3})?$").expect("static regex")),
        (
            "mastercard",
            Regex::new(r"^(5[1-5]\d{14}|2(2[2-9]\d|[3-6]\d{2}|7[01]\d|720)\d{12})$")
                .expect("static regex"),
        ),
        ("amex", Regex::new(r"^3[47]\d{13}$").expect("static regex")),
        ("discover", Regex::new(r"^6(011|5\d{2})\d{12}$").expect("static regex")),
        ("jcb", Regex::new(r"^35(2[89]|[3-8]\d)\d{12}$").expect("static regex")),
        ("diners", Regex::new(r"^3(0[0-5]|[68]\d)\d{11}$").expect("static regex")),
        ("maestro", Regex::new(r"^(5[06-9]|6\d)\d{10,17}$").expect("static regex")),
    ]
});

/// Well-known gateway test PANs
const TEST_CARDS: &[&str] = &[
    "4111111111111111",
    "4242424242424242",
    "4012888888881881",
    "5555555555554444",
    "5105105105105100",
    "378282246310005",
    "371449635398431",
    "6011111111111117",
    "30569309025904",
    "38520000023237",
];

pub struct CreditCardCheck;

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

fn card_brand(digits: &str) -> Option<&'static str> {
    BRAND_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(digits))
        .map(|(brand, _)| *brand)
}

fn hour_velocity_points(count: u64) -> u32 {
    if count > 10 {
        30
    } else if count > 3 {
        20
    } else {
        0
    }
}

#[async_trait]
impl Check for CreditCardCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::CreditCard
    }

    fn applicable(&self, input: &EvaluationInput) -> bool {
        input
            .credit_card
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome> {
        let raw = input.credit_card.as_deref().unwrap_or_default();
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let mut tally = Tally::new();

        if digits.len() < 13 || digits.len() > 19 {
            tally.add(100);
            tally.hard_fail();
            tally.detail("valid", false);
            return Ok(tally.into_outcome());
        }

        if !luhn_valid(&digits) {
            tally.add(100);
            tally.hard_fail();
            tally.detail("valid", false);
            tally.detail("luhn", false);
            return Ok(tally.into_outcome());
        }
        tally.detail("valid", true);

        match card_brand(&digits) {
            Some(brand) => tally.detail("brand", brand),
            None => {
                tally.add(30);
                tally.detail("brand", "unknown");
            }
        }

        let card_hash = ctx.hasher.hash(&digits);
        if let Some(entry) = ctx
            .refdata
            .blacklist_entry(BlacklistKind::CreditCard, &card_hash)
            .await?
        {
            tally.add(100);
            tally.hard_fail();
            tally.detail("blacklisted", true);
            if entry.report_count > 0 {
                tally.detail("chargeback_count", entry.report_count);
            }
        }

        if TEST_CARDS.contains(&digits.as_str()) {
            tally.add(80);
            tally.hard_fail();
            tally.detail("test_card", true);
        }

        let bin = &digits[..6];
        tally.detail("bin", bin);
        if ctx.config.card_bins.prepaid.iter().any(|p| bin.starts_with(p.as_str())) {
            tally.add(30);
            tally.detail("prepaid", true);
        }
        if ctx
            .config
            .card_bins
            .virtual_cards
            .iter()
            .any(|p| bin.starts_with(p.as_str()))
        {
            tally.add(20);
            tally.detail("virtual", true);
        }

        let hour = soften(
            ctx.velocity.bump("card", &card_hash, Window::Hour).await,
            "card hour velocity",
        )?;
        let day = soften(
            ctx.velocity.bump("card", &card_hash, Window::Day).await,
            "card day velocity",
        )?;
        if hour.is_some() || day.is_some() {
            let mut points = 0u32;
            if let Some(count) = hour {
                points += hour_velocity_points(count);
            }
            if let Some(count) = day {
                if count > 20 {
                    points += 25;
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

    fn input(card: &str) -> EvaluationInput {
        EvaluationInput {
            credit_card: Some(card.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5555555555554444"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("4111111111111121"));
        assert!(!luhn_valid("1234567890123456"));
    }

    #[test]
    fn test_brands() {
        assert_eq!(card_brand("4111111111111111"), Some("visa"));
        assert_eq!(card_brand("5555555555554444"), Some("mastercard"));
        assert_eq!(card_brand("378282246310005"), Some("amex"));
        assert_eq!(card_brand("6011111111111117"), Some("discover"));
        assert_eq!(card_brand("3530111333300000"), Some("jcb"));
        assert_eq!(card_brand("30569309025904"), Some("diners"));
        assert_eq!(card_brand("6759649826438453"), Some("maestro"));
        assert_eq!(card_brand("9999999999999999"), None);
    }

    #[tokio::test]
    async fn test_length_screen() {
        let ctx = ContextBuilder::new().build();

        let outcome = CreditCardCheck.perform(&input("4111 1111"), &ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
    }

    #[tokio::test]
    async fn test_luhn_failure_short_circuits() {
        let ctx = ContextBuilder::new().build();

        let outcome = CreditCardCheck
            .perform(&input("4111111111111121"), &ctx)
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["luhn"], false);
        // Short-circuited before velocity ran
        assert!(outcome.details.get("velocity").is_none());
    }

    #[tokio::test]
    async fn test_formatting_is_stripped() {
        let ctx = ContextBuilder::new().build();

        let outcome = CreditCardCheck
            .perform(&input("5200-8282-8282-8210"), &ctx)
            .await
            .unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.details["brand"], "mastercard");
    }

    #[tokio::test]
    async fn test_test_card() {
        let ctx = ContextBuilder::new().build();

        let outcome = CreditCardCheck
            .perform(&input("4242424242424242"), &ctx)
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 80);
        assert_eq!(outcome.details["test_card"], true);
    }

    #[tokio::test]
    async fn test_blacklisted_card() {
        let builder = ContextBuilder::new();
        let backend = Arc::clone(&builder.backend);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("5200828282828210");
        backend
            .upsert_blacklist_entries(&[BlacklistEntry {
                value_hash: hash,
                kind: BlacklistKind::CreditCard,
                reason: Some("chargebacks".to_string()),
                risk_weight: 100,
                report_count: 4,
                last_seen_at: None,
            }])
            .await
            .unwrap();

        let outcome = CreditCardCheck
            .perform(&input("5200 8282 8282 8210"), &ctx)
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.details["blacklisted"], true);
        assert_eq!(outcome.details["chargeback_count"], 4);
    }

    #[tokio::test]
    async fn test_unknown_brand() {
        let ctx = ContextBuilder::new().build();

        // Luhn-valid 16-digit number outside every brand range
        let outcome = CreditCardCheck
            .perform(&input("9999999999999995"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 30);
        assert_eq!(outcome.details["brand"], "unknown");
    }

    #[tokio::test]
    async fn test_bin_classification() {
        let mut builder = ContextBuilder::new();
        builder.config.card_bins.prepaid = vec!["520082".to_string()];
        let ctx = builder.build();

        let outcome = CreditCardCheck
            .perform(&input("5200828282828210"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.score, 30);
        assert_eq!(outcome.details["prepaid"], true);
    }

    #[tokio::test]
    async fn test_velocity_tiers() {
        let builder = ContextBuilder::new();
        let velocity = Arc::clone(&builder.velocity);
        let ctx = builder.build();

        let hash = ctx.hasher.hash("5200828282828210");
        for _ in 0..4 {
            crate::velocity::VelocityStore::bump(&*velocity, "card", &hash, Window::Hour)
                .await
                .unwrap();
            crate::velocity::VelocityStore::bump(&*velocity, "card", &hash, Window::Day)
                .await
                .unwrap();
        }

        let outcome = CreditCardCheck
            .perform(&input("5200828282828210"), &ctx)
            .await
            .unwrap();
        // 5th bump in the hour: > 3
        assert_eq!(outcome.score, 20);
        assert_eq!(outcome.details["velocity"]["risk_score"], 20);
    }
}
