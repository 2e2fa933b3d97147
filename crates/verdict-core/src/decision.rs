//! Decision and threshold types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal decision for an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Review,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Review => "review",
            Decision::Block => "block",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Decision::Allow),
            "review" => Ok(Decision::Review),
            "block" => Ok(Decision::Block),
            other => Err(crate::error::CoreError::ParseError(format!(
                "unknown decision: {}",
                other
            ))),
        }
    }
}

/// Risk level bands used for reporting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskThresholds {
    #[serde(default = "default_low")]
    pub low: u8,

    #[serde(default = "default_medium")]
    pub medium: u8,

    #[serde(default = "default_high")]
    pub high: u8,

    #[serde(default = "default_critical")]
    pub critical: u8,
}

fn default_low() -> u8 {
    30
}

fn default_medium() -> u8 {
    50
}

fn default_high() -> u8 {
    80
}

fn default_critical() -> u8 {
    100
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: default_low(),
            medium: default_medium(),
            high: default_high(),
            critical: default_critical(),
        }
    }
}

/// Score bands that map to decisions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionThresholds {
    /// Scores strictly below `manual_review` are allowed
    #[serde(default = "default_auto_allow")]
    pub auto_allow: u8,

    /// Scores in [manual_review, auto_block) go to review
    #[serde(default = "default_manual_review")]
    pub manual_review: u8,

    /// Scores at or above this block
    #[serde(default = "default_auto_block")]
    pub auto_block: u8,
}

fn default_auto_allow() -> u8 {
    30
}

fn default_manual_review() -> u8 {
    50
}

fn default_auto_block() -> u8 {
    80
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            auto_allow: default_auto_allow(),
            manual_review: default_manual_review(),
            auto_block: default_auto_block(),
        }
    }
}

impl DecisionThresholds {
    /// Map a final risk score to a decision.
    ///
    /// The decision is a pure function of the score: block at or above
    /// `auto_block`, review at or above `manual_review`, allow otherwise.
    pub fn decide(&self, score: u8) -> Decision {
        if score >= self.auto_block {
            Decision::Block
        } else if score >= self.manual_review {
            Decision::Review
        } else {
            Decision::Allow
        }
    }
}
