//! API endpoint handlers

use super::types::*;
use crate::error::ServerError;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use verdict_core::{CallerIdentity, EvaluationInput};
use verdict_runtime::RefreshSource;

/// Health check endpoint
pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Evaluate endpoint
pub(super) async fn evaluate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<EvaluationInput>,
) -> Result<Json<EvaluateResponse>, ServerError> {
    // Authentication happens upstream; the gateway forwards the caller
    let caller = CallerIdentity {
        user_id: header_value(&headers, "x-user-id"),
        api_key_id: header_value(&headers, "x-api-key-id"),
    };

    let report = state.evaluator.evaluate(input, caller).await?;

    Ok(Json(EvaluateResponse {
        success: true,
        data: report,
    }))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RefreshParams {
    #[serde(default)]
    force: bool,
}

/// Refresh endpoint; `source` is a source name or `all`
pub(super) async fn refresh(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(params): Query<RefreshParams>,
) -> Result<Response, ServerError> {
    info!(source = %source, force = params.force, "Refresh requested over HTTP");

    if source == "all" {
        let report = state.refresh.refresh_all(params.force).await;
        return Ok(Json(RefreshAllResponse {
            success: report.sources.values().all(|o| o.success),
            data: report,
        })
        .into_response());
    }

    let source: RefreshSource = source
        .parse()
        .map_err(|_| ServerError::NotFound(format!("refresh source {}", source)))?;
    let outcome = state.refresh.refresh(source, params.force).await;

    Ok(Json(RefreshSourceResponse {
        success: outcome.success,
        data: outcome,
    })
    .into_response())
}
