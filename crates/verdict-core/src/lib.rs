//! VERDICT Core - Shared types for the VERDICT fraud risk engine
//!
//! This crate provides the fundamental types used across the VERDICT
//! workspace:
//! - Evaluation input and output types
//! - Check kinds and outcomes
//! - Decision and threshold types
//! - Error types

pub mod decision;
pub mod error;
pub mod input;
pub mod outcome;

// Re-export commonly used types
pub use decision::{Decision, DecisionThresholds, RiskThresholds};
pub use error::CoreError;
pub use input::{CallerIdentity, EvaluationInput, FieldError};
pub use outcome::{CheckKind, CheckOutcome, EvaluationReport, Window};
