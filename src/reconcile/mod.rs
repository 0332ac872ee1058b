//! Reconciled movement feed
//!
//! Reads one category from the ledger and from the matching request store,
//! normalizes request rows, and pages over the merged sequence ordered by
//! `created_at` descending (ties by id descending).
//!
//! Each source is asked for its newest `page * limit` rows: any row on the
//! requested page is necessarily among those, so the slice equals slicing
//! the fully merged feed.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::core_types::UserId;
use crate::ledger::{EntryStatus, SwapPairIssue, find_unpaired_swaps};
use crate::normalizer::{self, MovementView};
use crate::requests::RequestKind;
use crate::store::{Backend, LedgerQuery, RequestQuery, StoreError};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    #[error("Invalid query: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Validation(_) => "INVALID_QUERY",
            ReconcileError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ReconcileError::Validation(_) => 400,
            ReconcileError::Persistence(_) => 500,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidQuery(why) => ReconcileError::Validation(why),
            other => ReconcileError::Persistence(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementPage {
    pub items: Vec<MovementView>,
    pub pagination: Pagination,
}

/// Concatenate both sources, order newest first and cut one page
pub fn merge_movements(
    ledger: Vec<MovementView>,
    requests: Vec<MovementView>,
    page: usize,
    limit: usize,
) -> Vec<MovementView> {
    let mut merged = ledger;
    merged.extend(requests);
    merged.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    merged
        .into_iter()
        .skip(page.saturating_sub(1).saturating_mul(limit))
        .take(limit)
        .collect()
}

/// Ledger and request queries for one category and optional status filter
fn build_queries(
    category: RequestKind,
    status: Option<&str>,
) -> Result<(LedgerQuery, RequestQuery), ReconcileError> {
    let ledger = LedgerQuery::for_types(category.ledger_types());
    let request = RequestQuery::new(category);

    let Some(raw) = status.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok((ledger, request));
    };

    let canonical = raw.parse::<EntryStatus>().is_ok();
    let native = category
        .statuses()
        .iter()
        .any(|s| s.eq_ignore_ascii_case(raw));
    if !canonical && !native {
        return Err(ReconcileError::Validation(format!(
            "unknown status '{}' for {}",
            raw, category
        )));
    }

    Ok((
        ledger.with_statuses(normalizer::ledger_status_filter(raw)),
        request.with_statuses(normalizer::request_status_filter(category, raw)),
    ))
}

pub struct ReconciledView {
    backend: Arc<dyn Backend>,
}

impl ReconciledView {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// One page of the merged feed for `category`.
    ///
    /// `status` is a canonical status or one of the category's own request
    /// statuses. `limit` is clamped to [`MAX_PAGE_SIZE`]. A failure in
    /// either store fails the whole call.
    pub async fn list_movements(
        &self,
        category: RequestKind,
        status: Option<&str>,
        page: usize,
        limit: usize,
    ) -> Result<MovementPage, ReconcileError> {
        if page == 0 {
            return Err(ReconcileError::Validation("page starts at 1".into()));
        }
        if limit == 0 {
            return Err(ReconcileError::Validation("limit must be positive".into()));
        }
        let limit = limit.min(MAX_PAGE_SIZE);
        // stores take the window as a signed SQL LIMIT
        let window = page
            .checked_mul(limit)
            .filter(|w| i64::try_from(*w).is_ok())
            .ok_or_else(|| ReconcileError::Validation("page out of range".into()))?;

        let (ledger_q, request_q) = build_queries(category, status)?;

        // a side whose status filter maps to nothing is not queried
        let backend = &self.backend;
        let (ledger_total, request_total) = tokio::try_join!(
            async {
                match ledger_q.is_empty_match() {
                    true => Ok(0),
                    false => backend.count_entries(&ledger_q).await,
                }
            },
            async {
                match request_q.is_empty_match() {
                    true => Ok(0),
                    false => backend.count_requests(&request_q).await,
                }
            }
        )
        .inspect_err(|e| error!(%category, error = %e, "Movement count failed"))?;

        let (ledger_rows, request_rows) = tokio::try_join!(
            async {
                match ledger_total {
                    0 => Ok(Vec::new()),
                    _ => backend.find_entries(&ledger_q, window).await,
                }
            },
            async {
                match request_total {
                    0 => Ok(Vec::new()),
                    _ => backend.find_requests(&request_q, window).await,
                }
            }
        )
        .inspect_err(|e| error!(%category, error = %e, "Movement fetch failed"))?;

        let ledger_views = ledger_rows.into_iter().map(normalizer::from_ledger).collect();
        let request_views = request_rows.into_iter().map(normalizer::normalize).collect();
        let items = merge_movements(ledger_views, request_views, page, limit);

        let total = ledger_total + request_total;
        let total_pages = total.div_ceil(limit as u64);
        debug!(
            %category,
            page,
            limit,
            ledger_total,
            request_total,
            returned = items.len(),
            "Movement page built"
        );

        Ok(MovementPage {
            items,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
            },
        })
    }

    /// Swap references that are not exactly one OUT and one IN leg
    pub async fn check_swap_pairs(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<SwapPairIssue>, ReconcileError> {
        let entries = self.backend.find_swap_entries(user_id).await?;
        let issues = find_unpaired_swaps(&entries);
        if !issues.is_empty() {
            error!(count = issues.len(), "Unpaired swap legs found");
        }
        Ok(issues)
    }
}
