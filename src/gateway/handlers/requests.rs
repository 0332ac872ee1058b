//! User-facing request submission and history

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::Value;

use super::super::identity::CallerIdentity;
use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use super::parse_category;
use crate::requests::{RequestRecord, SubmitRequest};

const MAX_HISTORY: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// POST /api/v1/requests/{category}
///
/// The body is the category's fields; the category itself comes from the
/// path.
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(category): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<RequestRecord> {
    let kind = parse_category(&category)?;
    let Value::Object(mut fields) = body else {
        return ApiError::bad_request("body must be a JSON object").into_err();
    };
    fields.insert("kind".into(), Value::String(kind.as_str().into()));
    let submit: SubmitRequest = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::bad_request(format!("invalid {} request: {}", kind, e)))?;

    let record = state.requests.submit(caller.user_id, submit).await?;
    ok(record)
}

/// GET /api/v1/requests/{category}?limit
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(category): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Vec<RequestRecord>> {
    let kind = parse_category(&category)?;
    let limit = q.limit.unwrap_or(20).clamp(1, MAX_HISTORY);
    let records = state
        .requests
        .list_for_user(caller.user_id, kind, limit)
        .await?;
    ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::handlers::test_support::state_with;
    use crate::requests::RequestKind;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_and_list_withdrawal() {
        let (state, _, user) = state_with(None).await;
        let caller = CallerIdentity::user(user.id);
        let record = submit_request(
            State(state.clone()),
            caller,
            Path("withdrawals".into()),
            Json(json!({ "amount": "100", "fee": "2.50", "destination": "IBAN DE00" })),
        )
        .await
        .unwrap()
        .0
        .data
        .unwrap();
        assert_eq!(record.kind(), RequestKind::Withdrawal);
        assert_eq!(record.status_str(), "pending");
        let RequestRecord::Withdrawal(w) = &record else {
            panic!("expected withdrawal");
        };
        assert_eq!(w.net_amount, Decimal::new(9750, 2));

        let listed = list_requests(
            State(state),
            caller,
            Path("withdrawal".into()),
            Query(HistoryQuery { limit: None }),
        )
        .await
        .unwrap()
        .0
        .data
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), record.id());
    }

    #[tokio::test]
    async fn test_bad_bodies_are_400() {
        let (state, _, user) = state_with(None).await;
        let caller = CallerIdentity::user(user.id);
        for (category, body) in [
            ("swaps", json!({ "amount": "1" })),
            ("deposits", json!(["amount"])),
            ("deposits", json!({ "amount": 5 })),
            ("withdrawals", json!({ "amount": "10", "fee": "10" })),
        ] {
            let err = submit_request(State(state.clone()), caller, Path(category.into()), Json(body))
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "{}", category);
        }
    }
}
