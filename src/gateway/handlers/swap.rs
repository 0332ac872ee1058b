use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;

use super::super::identity::CallerIdentity;
use super::super::state::AppState;
use super::super::types::{ApiResult, ok};
use crate::swap::{SwapOutcome, SwapRequest};

#[derive(Debug, Deserialize)]
pub struct SwapBody {
    pub from_asset: String,
    pub to_asset: String,
    pub from_amount: String,
    #[serde(default)]
    pub user_currency: Option<String>,
}

/// POST /api/v1/swap
///
/// 400 validation, 404 unknown user, 422 insufficient funds, 503 when no
/// rate could be obtained. Nothing is written on any error.
pub async fn create_swap(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Json(body): Json<SwapBody>,
) -> ApiResult<SwapOutcome> {
    let outcome = state
        .swaps
        .swap(SwapRequest {
            user_id: caller.user_id,
            from_asset: body.from_asset,
            to_asset: body.to_asset,
            from_amount: body.from_amount,
            user_currency: body.user_currency,
        })
        .await?;
    ok(outcome)
}
