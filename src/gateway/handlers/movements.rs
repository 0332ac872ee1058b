//! Admin movement feed and corrections

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::identity::CallerIdentity;
use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use super::parse_category;
use crate::admin::MovementPatch;
use crate::core_types::{MovementSource, UserId};
use crate::ledger::SwapPairIssue;
use crate::normalizer::MovementView;
use crate::reconcile::{DEFAULT_PAGE_SIZE, MovementPage};

#[derive(Debug, Deserialize)]
pub struct MovementQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedMovement {
    pub id: Uuid,
    pub source: MovementSource,
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct IntegrityQuery {
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct IntegrityReport {
    pub consistent: bool,
    pub issues: Vec<SwapPairIssue>,
}

fn parse_source(raw: &str) -> Result<MovementSource, ApiError> {
    raw.parse::<MovementSource>().map_err(ApiError::bad_request)
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("invalid id: {}", raw)))
}

/// GET /api/v1/admin/movements/{category}?page&limit&status
pub async fn list_movements(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(category): Path<String>,
    Query(q): Query<MovementQuery>,
) -> ApiResult<MovementPage> {
    caller.require_admin()?;
    let category = parse_category(&category)?;
    let page = state
        .movements
        .list_movements(
            category,
            q.status.as_deref(),
            q.page.unwrap_or(1),
            q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    ok(page)
}

/// PATCH /api/v1/admin/movements/{source}/{id}
pub async fn edit_movement(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path((source, id)): Path<(String, String)>,
    Json(patch): Json<MovementPatch>,
) -> ApiResult<MovementView> {
    caller.require_admin()?;
    let view = state
        .corrections
        .edit_movement(parse_source(&source)?, parse_id(&id)?, patch, caller.user_id)
        .await?;
    ok(view)
}

/// DELETE /api/v1/admin/movements/{source}/{id}
pub async fn delete_movement(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path((source, id)): Path<(String, String)>,
) -> ApiResult<DeletedMovement> {
    caller.require_admin()?;
    let source = parse_source(&source)?;
    let id = parse_id(&id)?;
    state
        .corrections
        .delete_movement(source, id, caller.user_id)
        .await?;
    ok(DeletedMovement {
        id,
        source,
        deleted: true,
    })
}

/// GET /api/v1/admin/integrity/swaps?user_id
pub async fn check_swap_integrity(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Query(q): Query<IntegrityQuery>,
) -> ApiResult<IntegrityReport> {
    caller.require_admin()?;
    let issues = state.movements.check_swap_pairs(q.user_id).await?;
    ok(IntegrityReport {
        consistent: issues.is_empty(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::handlers::test_support::state_with;
    use crate::gateway::handlers::{create_swap, submit_request};
    use crate::gateway::handlers::swap::SwapBody;
    use crate::account::User;
    use crate::ledger::EntryStatus;
    use crate::store::UserStore;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn query(status: Option<&str>) -> Query<MovementQuery> {
        Query(MovementQuery {
            page: None,
            limit: None,
            status: status.map(String::from),
        })
    }

    #[tokio::test]
    async fn test_feed_requires_admin() {
        let (state, _, user) = state_with(None).await;
        let err = list_movements(
            State(state),
            CallerIdentity::user(user.id),
            Path("deposits".into()),
            query(None),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_feed_merges_swap_legs_and_requests() {
        let (state, store, user) = state_with(Some(Decimal::new(50000, 0))).await;
        let bob = store.create_user(User::new("bob@x.io", "Bob")).await.unwrap();
        create_swap(
            State(state.clone()),
            CallerIdentity::user(user.id),
            Json(SwapBody {
                from_asset: "fiat".into(),
                to_asset: "secondary".into(),
                from_amount: "100".into(),
                user_currency: None,
            }),
        )
        .await
        .unwrap();
        submit_request(
            State(state.clone()),
            CallerIdentity::user(user.id),
            Path("transfers".into()),
            Json(json!({ "recipient_id": bob.id, "amount": "5" })),
        )
        .await
        .unwrap();

        let admin = CallerIdentity::admin(Uuid::new_v4());
        let page = list_movements(State(state.clone()), admin, Path("transfers".into()), query(None))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.items[0].source, MovementSource::User);
        assert_eq!(page.items[0].recipient.as_ref().map(|r| r.id), Some(bob.id));
        assert_eq!(
            page.items.iter().filter(|m| m.source == MovementSource::Admin).count(),
            2
        );

        let pending = list_movements(
            State(state.clone()),
            admin,
            Path("transfers".into()),
            query(Some("pending")),
        )
        .await
        .unwrap()
        .0
        .data
        .unwrap();
        assert_eq!(pending.pagination.total, 1);

        let report = check_swap_integrity(State(state), admin, Query(IntegrityQuery { user_id: None }))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert!(report.consistent);
    }

    #[tokio::test]
    async fn test_edit_and_delete_round_trip() {
        let (state, _, user) = state_with(None).await;
        let record = submit_request(
            State(state.clone()),
            CallerIdentity::user(user.id),
            Path("deposits".into()),
            Json(json!({ "amount": "25" })),
        )
        .await
        .unwrap()
        .0
        .data
        .unwrap();
        let admin = CallerIdentity::admin(Uuid::new_v4());
        let id = record.id().to_string();

        let view = edit_movement(
            State(state.clone()),
            admin,
            Path(("user".into(), id.clone())),
            Json(MovementPatch {
                amount: Some("30".into()),
                status: Some("rejected".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap()
        .0
        .data
        .unwrap();
        assert_eq!(view.amount, Decimal::new(30, 0));
        assert_eq!(view.status, EntryStatus::Failed);
        assert_eq!(view.raw_status, "rejected");

        let bad = edit_movement(
            State(state.clone()),
            admin,
            Path(("ledger".into(), id.clone())),
            Json(MovementPatch::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let deleted = delete_movement(State(state.clone()), admin, Path(("user".into(), id.clone())))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert!(deleted.deleted);

        let again = delete_movement(State(state), admin, Path(("user".into(), id)))
            .await
            .unwrap_err();
        assert_eq!(again.status, StatusCode::NOT_FOUND);
    }
}
