//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub timestamp_ms: i64,
    pub backend: &'static str,
    pub version: &'static str,
}

/// GET /api/v1/health
///
/// 200 with the backend name when the store answers, 503 otherwise. The
/// store error itself is only logged.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    match state.backend.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                timestamp_ms: Utc::now().timestamp_millis(),
                backend: state.backend.name(),
                version: env!("GIT_HASH"),
            })),
        ),
        Err(e) => {
            error!(backend = state.backend.name(), error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    code: error_codes::SERVICE_UNAVAILABLE,
                    msg: "unavailable".to_string(),
                    data: None,
                }),
            )
        }
    }
}
