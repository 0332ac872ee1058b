//! Admin review, adjustment and audit endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use super::super::identity::CallerIdentity;
use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use super::parse_category;
use crate::admin::{AdjustmentOutcome, AdjustmentRequest, AuditRecord};
use crate::requests::{ReviewAction, ReviewOutcome};

const MAX_AUDIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub action: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// POST /api/v1/admin/requests/{category}/{id}/review
pub async fn review_request(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path((category, id)): Path<(String, uuid::Uuid)>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<ReviewOutcome> {
    caller.require_admin()?;
    let kind = parse_category(&category)?;
    let action: ReviewAction = body.action.parse().map_err(ApiError::bad_request)?;
    let outcome = state
        .requests
        .review(kind, id, action, caller.user_id, body.note)
        .await?;
    ok(outcome)
}

/// POST /api/v1/admin/adjustments
pub async fn adjust_balance(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Json(req): Json<AdjustmentRequest>,
) -> ApiResult<AdjustmentOutcome> {
    caller.require_admin()?;
    let outcome = state
        .corrections
        .adjust_balance(caller.user_id, req)
        .await?;
    ok(outcome)
}

/// GET /api/v1/admin/audit?limit
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Query(q): Query<AuditQuery>,
) -> ApiResult<Vec<AuditRecord>> {
    caller.require_admin()?;
    let limit = q.limit.unwrap_or(50).clamp(1, MAX_AUDIT);
    let records = state.backend.list_audit(limit).await?;
    ok(records)
}
