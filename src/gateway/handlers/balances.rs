use std::sync::Arc;

use axum::extract::State;

use super::super::identity::CallerIdentity;
use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use crate::account::BalanceSnapshot;

/// GET /api/v1/balances
pub async fn get_balances(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
) -> ApiResult<BalanceSnapshot> {
    let user = state
        .backend
        .get_user(caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {}", caller.user_id)))?;
    ok(user.snapshot())
}
