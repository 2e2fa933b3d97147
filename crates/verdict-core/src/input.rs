//! Evaluation input types
//!
//! The identity bundle submitted for evaluation. Every recognized field is
//! optional; validation enforces that at least one identity field is present.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity bundle submitted to the evaluator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationInput {
    /// Email address
    #[serde(default)]
    pub email: Option<String>,

    /// IP address, IPv4 or IPv6
    #[serde(default)]
    pub ip: Option<String>,

    /// Credit card PAN (digit string, 13-19 digits)
    #[serde(default)]
    pub credit_card: Option<String>,

    /// Phone number, E.164-parsable
    #[serde(default)]
    pub phone: Option<String>,

    /// User agent string
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Domain; derived from `email` when absent
    #[serde(default)]
    pub domain: Option<String>,

    /// Declared country (ISO-3166 alpha-2)
    #[serde(default)]
    pub country: Option<String>,

    /// Declared timezone (IANA zone)
    #[serde(default)]
    pub timezone: Option<String>,

    /// Request headers, name to value list
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,

    /// Declared device type
    #[serde(default)]
    pub device_type: Option<String>,

    /// Opaque caller metadata; accepted and echoed back by the API layer,
    /// never interpreted by the checks
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Field-level validation error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    /// Field name
    pub field: String,

    /// Human-readable message
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl EvaluationInput {
    /// Validate the input shape.
    ///
    /// At least one of {email, ip, credit_card, phone} must be present and
    /// non-empty. Field contents are validated by the individual checks; this
    /// only rejects bundles the evaluator cannot do anything with.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        let has_identity = [
            self.email.as_deref(),
            self.ip.as_deref(),
            self.credit_card.as_deref(),
            self.phone.as_deref(),
        ]
        .iter()
        .any(|f| f.map(|v| !v.trim().is_empty()).unwrap_or(false));

        if !has_identity {
            errors.push(FieldError::new(
                "input",
                "at least one of email, ip, credit_card or phone is required",
            ));
        }

        if let Some(country) = self.country.as_deref() {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(FieldError::new(
                    "country",
                    "country must be an ISO-3166 alpha-2 code",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The domain under evaluation: the explicit `domain` field, or the part
    /// after `@` in `email`.
    pub fn effective_domain(&self) -> Option<String> {
        if let Some(domain) = self.domain.as_deref() {
            let domain = domain.trim().to_lowercase();
            if !domain.is_empty() {
                return Some(domain);
            }
        }
        self.email
            .as_deref()
            .and_then(|e| e.rsplit_once('@'))
            .map(|(_, d)| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
    }

    /// Declared country, uppercased
    pub fn declared_country(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
    }
}

/// Caller identity attached to audit records.
///
/// Authentication happens upstream; the evaluator only records what the
/// gateway forwarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Authenticated user id
    #[serde(default)]
    pub user_id: Option<String>,

    /// API key id used for the request
    #[serde(default)]
    pub api_key_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_identity_field() {
        let input = EvaluationInput {
            user_agent: Some("Mozilla/5.0".to_string()),
            ..Default::default()
        };

        let errors = input.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "input");
    }

    #[test]
    fn test_validate_accepts_single_identity_field() {
        let input = EvaluationInput {
            ip: Some("8.8.8.8".to_string()),
            ..Default::default()
        };

        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_identity_fields() {
        let input = EvaluationInput {
            email: Some("   ".to_string()),
            ..Default::default()
        };

        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_country() {
        let input = EvaluationInput {
            ip: Some("8.8.8.8".to_string()),
            country: Some("USA".to_string()),
            ..Default::default()
        };

        let errors = input.validate().unwrap_err();
        assert_eq!(errors[0].field, "country");
    }

    #[test]
    fn test_effective_domain_prefers_explicit_field() {
        let input = EvaluationInput {
            email: Some("alice@example.com".to_string()),
            domain: Some("Other.ORG".to_string()),
            ..Default::default()
        };

        assert_eq!(input.effective_domain(), Some("other.org".to_string()));
    }

    #[test]
    fn test_effective_domain_derived_from_email() {
        let input = EvaluationInput {
            email: Some("alice@Example.COM".to_string()),
            ..Default::default()
        };

        assert_eq!(input.effective_domain(), Some("example.com".to_string()));
    }

    #[test]
    fn test_effective_domain_absent() {
        let input = EvaluationInput {
            ip: Some("8.8.8.8".to_string()),
            ..Default::default()
        };

        assert_eq!(input.effective_domain(), None);
    }
}
