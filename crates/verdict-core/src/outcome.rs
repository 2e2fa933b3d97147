//! Check kinds, outcomes and the evaluation report

use crate::decision::Decision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// The six signal checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Email,
    Domain,
    Ip,
    CreditCard,
    Phone,
    UserAgent,
}

impl CheckKind {
    /// All check kinds in registry order
    pub const ALL: [CheckKind; 6] = [
        CheckKind::Email,
        CheckKind::Domain,
        CheckKind::Ip,
        CheckKind::CreditCard,
        CheckKind::Phone,
        CheckKind::UserAgent,
    ];

    /// Stable name used for result keys and persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Email => "email",
            CheckKind::Domain => "domain",
            CheckKind::Ip => "ip",
            CheckKind::CreditCard => "credit_card",
            CheckKind::Phone => "phone",
            CheckKind::UserAgent => "user_agent",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Whether the signal passed
    pub passed: bool,

    /// Sub-score in [0, 100]
    pub score: u8,

    /// Structured detail record
    pub details: serde_json::Value,
}

impl CheckOutcome {
    /// Outcome for a check that raised an internal error. Never aborts the
    /// evaluation; contributes a neutral-suspicious score.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 50,
            details: serde_json::json!({ "error": message.into() }),
        }
    }

    /// Outcome for a check cancelled by the per-evaluation deadline
    pub fn timed_out() -> Self {
        Self::internal_error("timeout")
    }

    /// Read a boolean flag out of the detail record
    pub fn detail_flag(&self, key: &str) -> bool {
        self.details
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Read a numeric detail out of the detail record
    pub fn detail_number(&self, key: &str) -> Option<f64> {
        self.details.get(key).and_then(|v| v.as_f64())
    }

    /// The velocity risk score recorded by the check, if any
    pub fn velocity_risk_score(&self) -> Option<f64> {
        self.details
            .get("velocity")
            .and_then(|v| v.get("risk_score"))
            .and_then(|v| v.as_f64())
    }
}

/// Velocity counter window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    /// Window length in seconds; doubles as the counter TTL
    pub fn seconds(&self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3600,
            Window::Day => 86400,
        }
    }

    /// Stable name used in counter keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }
}

/// Final evaluation report returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Evaluation id
    pub id: Uuid,

    /// Aggregated risk score in [0, 100]
    pub risk_score: u8,

    /// Mapped decision
    pub decision: Decision,

    /// Per-check outcomes keyed by check name
    pub checks: BTreeMap<String, CheckOutcome>,

    /// Wall-clock processing time
    pub processing_time_ms: u64,
}

impl EvaluationReport {
    /// Names of checks that did not pass
    pub fn failed_checks(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|(_, o)| !o.passed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of checks that passed
    pub fn passed_checks(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|(_, o)| o.passed)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_kind_names() {
        assert_eq!(CheckKind::CreditCard.as_str(), "credit_card");
        assert_eq!(CheckKind::UserAgent.to_string(), "user_agent");
        assert_eq!(CheckKind::ALL.len(), 6);
    }

    #[test]
    fn test_internal_error_outcome() {
        let outcome = CheckOutcome::internal_error("boom");

        assert!(!outcome.passed);
        assert_eq!(outcome.score, 50);
        assert_eq!(outcome.details["error"], "boom");
    }

    #[test]
    fn test_timed_out_outcome() {
        let outcome = CheckOutcome::timed_out();
        assert_eq!(outcome.details["error"], "timeout");
    }

    #[test]
    fn test_detail_accessors() {
        let outcome = CheckOutcome {
            passed: false,
            score: 90,
            details: json!({
                "blacklisted": true,
                "age_days": 12,
                "velocity": { "count": 55, "risk_score": 20 },
            }),
        };

        assert!(outcome.detail_flag("blacklisted"));
        assert!(!outcome.detail_flag("tor"));
        assert_eq!(outcome.detail_number("age_days"), Some(12.0));
        assert_eq!(outcome.velocity_risk_score(), Some(20.0));
    }

    #[test]
    fn test_window_seconds() {
        assert_eq!(Window::Minute.seconds(), 60);
        assert_eq!(Window::Hour.seconds(), 3600);
        assert_eq!(Window::Day.seconds(), 86400);
    }

    #[test]
    fn test_report_partitions_checks() {
        let mut checks = BTreeMap::new();
        checks.insert(
            "email".to_string(),
            CheckOutcome {
                passed: true,
                score: 0,
                details: json!({}),
            },
        );
        checks.insert(
            "ip".to_string(),
            CheckOutcome {
                passed: false,
                score: 100,
                details: json!({}),
            },
        );

        let report = EvaluationReport {
            id: Uuid::new_v4(),
            risk_score: 50,
            decision: Decision::Review,
            checks,
            processing_time_ms: 3,
        };

        assert_eq!(report.failed_checks(), vec!["ip".to_string()]);
        assert_eq!(report.passed_checks(), vec!["email".to_string()]);
    }
}
