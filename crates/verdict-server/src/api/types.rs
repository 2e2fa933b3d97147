//! REST API type definitions

use serde::Serialize;
use std::sync::Arc;
use verdict_core::EvaluationReport;
use verdict_runtime::{Evaluator, RefreshReport, RefreshService, SourceOutcome};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<Evaluator>,
    pub refresh: Arc<RefreshService>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Evaluation response envelope
#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub success: bool,
    pub data: EvaluationReport,
}

/// Refresh response envelope for a single source
#[derive(Debug, Serialize)]
pub struct RefreshSourceResponse {
    pub success: bool,
    pub data: SourceOutcome,
}

/// Refresh response envelope for `all`
#[derive(Debug, Serialize)]
pub struct RefreshAllResponse {
    pub success: bool,
    pub data: RefreshReport,
}
