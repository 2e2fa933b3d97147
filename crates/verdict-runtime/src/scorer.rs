//! Risk scorer and decision mapper
//!
//! Weighted mean over executed checks, cross-signal modifiers in a fixed
//! order (high-score count, pattern bumps, velocity concern), then the
//! critical-failure floor, clamp and round. Deterministic given the result
//! set; results are keyed by check name, never completion order.

use std::collections::BTreeMap;
use verdict_core::{CheckKind, CheckOutcome, Decision, DecisionThresholds};

/// Fixed aggregation weight per check
pub fn check_weight(kind: CheckKind) -> f64 {
    match kind {
        CheckKind::Email => 0.25,
        CheckKind::Domain => 0.15,
        CheckKind::Ip => 0.25,
        CheckKind::CreditCard => 0.20,
        CheckKind::Phone => 0.10,
        CheckKind::UserAgent => 0.05,
    }
}

/// Scorer over one evaluation's check results
pub struct RiskScorer {
    thresholds: DecisionThresholds,
}

impl RiskScorer {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    /// Aggregate check results into the final risk score
    pub fn score(&self, results: &BTreeMap<CheckKind, CheckOutcome>) -> u8 {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for (kind, outcome) in results {
            let weight = check_weight(*kind);
            weighted += outcome.score as f64 * weight;
            weight_sum += weight;
        }
        if weight_sum == 0.0 {
            return 0;
        }
        // Dividing by the executed weights keeps the mean unbiased when
        // fields were absent
        let mut value = weighted / weight_sum;

        let high_scores = results.values().filter(|o| o.score >= 80).count();
        if high_scores >= 3 {
            value *= 1.30;
        } else if high_scores >= 2 {
            value *= 1.15;
        }

        value *= self.pattern_multiplier(results);

        let velocity_concerns = results
            .values()
            .filter(|o| o.velocity_risk_score().map(|v| v > 20.0).unwrap_or(false))
            .count();
        if velocity_concerns >= 2 {
            value *= 1.20;
        }

        if self.critical_failure(results) {
            value = value.max(90.0);
        }

        value.round().clamp(0.0, 100.0) as u8
    }

    /// Stackable cross-signal pattern bumps
    fn pattern_multiplier(&self, results: &BTreeMap<CheckKind, CheckOutcome>) -> f64 {
        let flag = |kind: CheckKind, key: &str| {
            results.get(&kind).map(|o| o.detail_flag(key)).unwrap_or(false)
        };
        let mut multiplier = 1.0;

        // Disposable mailbox arriving over an anonymized route
        if flag(CheckKind::Email, "disposable")
            && (flag(CheckKind::Ip, "tor") || flag(CheckKind::Ip, "vpn_or_proxy"))
        {
            multiplier *= 1.40;
        }

        // Freshly registered domain paired with a high-risk address
        let high_risk_ip = results
            .get(&CheckKind::Ip)
            .map(|o| o.score >= 80)
            .unwrap_or(false);
        if flag(CheckKind::Domain, "new_domain") && high_risk_ip {
            multiplier *= 1.25;
        }

        // Gateway test PAN driven by tooling
        let automated_ua =
            flag(CheckKind::UserAgent, "bot") || flag(CheckKind::UserAgent, "automation");
        if flag(CheckKind::CreditCard, "test_card") && automated_ua {
            multiplier *= 1.50;
        }

        let location_mismatches = [
            flag(CheckKind::Ip, "country_mismatch"),
            flag(CheckKind::Phone, "country_mismatch"),
            flag(CheckKind::Ip, "timezone_mismatch"),
        ]
        .iter()
        .filter(|m| **m)
        .count();
        if location_mismatches >= 2 {
            multiplier *= 1.30;
        }

        multiplier
    }

    /// Conditions that force the final score to at least 90
    fn critical_failure(&self, results: &BTreeMap<CheckKind, CheckOutcome>) -> bool {
        if results.values().any(|o| o.detail_flag("blacklisted")) {
            return true;
        }
        if results
            .get(&CheckKind::CreditCard)
            .map(|o| o.score == 100)
            .unwrap_or(false)
        {
            return true;
        }
        results
            .get(&CheckKind::UserAgent)
            .map(|o| o.detail_flag("known_malicious"))
            .unwrap_or(false)
    }

    /// Map the final score to a decision
    pub fn decide(&self, score: u8) -> Decision {
        self.thresholds.decide(score)
    }
}
