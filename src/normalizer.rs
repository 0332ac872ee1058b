//! Status normalizer
//!
//! Pure mapping from each request kind's status vocabulary onto the ledger's
//! three canonical statuses, and the display envelope both stores are
//! reshaped into before they are merged.
//!
//! | Kind       | Request status        | Canonical |
//! |------------|-----------------------|-----------|
//! | Deposit    | approved              | completed |
//! | Deposit    | rejected              | failed    |
//! | Deposit    | pending               | pending   |
//! | Withdrawal | approved              | completed |
//! | Withdrawal | rejected              | failed    |
//! | Withdrawal | pending               | pending   |
//! | Transfer   | completed             | completed |
//! | Transfer   | failed, cancelled     | failed    |
//! | Transfer   | pending, processing   | pending   |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::account::UserSummary;
use crate::core_types::{MovementSource, UserId};
use crate::ledger::{EntryMetadata, EntryStatus, EntryType};
use crate::requests::{RequestKind, RequestRecord, ReviewStatus, TransferStatus};
use crate::store::{LedgerRow, RequestRow};

#[inline]
pub fn canonical_review(status: ReviewStatus) -> EntryStatus {
    match status {
        ReviewStatus::Approved => EntryStatus::Completed,
        ReviewStatus::Rejected => EntryStatus::Failed,
        ReviewStatus::Pending => EntryStatus::Pending,
    }
}

#[inline]
pub fn canonical_transfer(status: TransferStatus) -> EntryStatus {
    match status {
        TransferStatus::Completed => EntryStatus::Completed,
        TransferStatus::Failed | TransferStatus::Cancelled => EntryStatus::Failed,
        TransferStatus::Pending | TransferStatus::Processing => EntryStatus::Pending,
    }
}

pub fn canonical_status(record: &RequestRecord) -> EntryStatus {
    match record {
        RequestRecord::Deposit(r) => canonical_review(r.status),
        RequestRecord::Withdrawal(r) => canonical_review(r.status),
        RequestRecord::Transfer(r) => canonical_transfer(r.status),
    }
}

/// Canonical image of a raw request status, `None` if the kind does not
/// know the string
pub fn canonical_of(kind: RequestKind, raw: &str) -> Option<EntryStatus> {
    match kind {
        RequestKind::Deposit | RequestKind::Withdrawal => {
            raw.parse::<ReviewStatus>().ok().map(canonical_review)
        }
        RequestKind::Transfer => raw.parse::<TransferStatus>().ok().map(canonical_transfer),
    }
}

/// Reverse mapping: every request status of `kind` that normalizes to
/// `canonical`.
///
/// Derived from the forward table so the two directions cannot drift.
pub fn request_statuses_for(kind: RequestKind, canonical: EntryStatus) -> Vec<&'static str> {
    kind.statuses()
        .iter()
        .copied()
        .filter(|s| canonical_of(kind, s) == Some(canonical))
        .collect()
}

/// Ledger-side status filter for a raw filter string.
///
/// Only canonical names filter the ledger; anything else matches no ledger
/// rows.
pub fn ledger_status_filter(raw: &str) -> Vec<EntryStatus> {
    raw.parse::<EntryStatus>().map(|s| vec![s]).unwrap_or_default()
}

/// Request-side status filter for a raw filter string.
///
/// A canonical name expands to its reverse mapping, a status native to the
/// kind filters on itself, anything else matches no request rows.
pub fn request_status_filter(kind: RequestKind, raw: &str) -> Vec<&'static str> {
    if let Ok(canonical) = raw.parse::<EntryStatus>() {
        return request_statuses_for(kind, canonical);
    }
    let lowered = raw.to_lowercase();
    kind.statuses()
        .iter()
        .copied()
        .filter(|s| *s == lowered)
        .collect()
}

/// Category a ledger entry type is listed under
pub fn category_of(entry_type: EntryType) -> RequestKind {
    match entry_type {
        EntryType::Deposit => RequestKind::Deposit,
        EntryType::Withdrawal => RequestKind::Withdrawal,
        EntryType::TransferIn | EntryType::TransferOut => RequestKind::Transfer,
    }
}

/// Common display envelope for ledger entries and request records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementView {
    pub id: Uuid,
    pub source: MovementSource,
    pub category: RequestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<EntryType>,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    pub amount: Decimal,
    pub currency: String,
    pub status: EntryStatus,
    /// Status in the originating store's own vocabulary
    pub raw_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_before: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
    pub created_at: DateTime<Utc>,
}

/// Reshape a request record into the display envelope, tagged `user`
pub fn normalize(row: RequestRow) -> MovementView {
    let status = canonical_status(&row.record);
    let raw_status = row.record.status_str().to_string();
    let category = row.record.kind();

    let mut view = MovementView {
        id: row.record.id(),
        source: MovementSource::User,
        category,
        entry_type: None,
        user_id: row.record.user_id(),
        user: row.user,
        amount: row.record.amount(),
        currency: String::new(),
        status,
        raw_status,
        fee: None,
        net_amount: None,
        total_amount: None,
        recipient_id: None,
        recipient: None,
        method: None,
        destination: None,
        reference: None,
        description: None,
        balance_before: None,
        balance_after: None,
        metadata: None,
        created_at: row.record.created_at(),
    };

    match row.record {
        RequestRecord::Deposit(r) => {
            view.currency = r.currency;
            view.method = r.method;
            view.reference = r.proof_reference;
            view.description = r.admin_note;
        }
        RequestRecord::Withdrawal(r) => {
            view.currency = r.currency;
            view.fee = Some(r.fee);
            view.net_amount = Some(r.net_amount);
            view.destination = r.destination;
            view.description = r.admin_note;
        }
        RequestRecord::Transfer(r) => {
            view.currency = r.currency;
            view.fee = Some(r.fee);
            view.total_amount = Some(r.total_amount);
            view.recipient_id = Some(r.recipient_id);
            view.recipient = row.recipient;
            view.description = r.note.or(r.admin_note);
        }
    }
    view
}

/// Wrap a ledger entry in the display envelope, tagged `admin`
pub fn from_ledger(row: LedgerRow) -> MovementView {
    let e = row.entry;
    let (fee, recipient_id, destination, method) = match &e.metadata {
        EntryMetadata::Withdrawal {
            fee, destination, ..
        } => (Some(*fee), None, destination.clone(), None),
        EntryMetadata::Transfer {
            fee, counterparty, ..
        } => (Some(*fee), Some(*counterparty), None, None),
        EntryMetadata::Deposit { method, .. } => (None, None, None, method.clone()),
        EntryMetadata::Swap(m) => (Some(m.fee), None, None, None),
        EntryMetadata::Adjustment { .. } | EntryMetadata::None => (None, None, None, None),
    };

    MovementView {
        id: e.id,
        source: MovementSource::Admin,
        category: category_of(e.entry_type),
        entry_type: Some(e.entry_type),
        user_id: e.user_id,
        user: row.user,
        amount: e.amount,
        currency: e.currency,
        status: e.status,
        raw_status: e.status.as_str().to_string(),
        fee,
        net_amount: None,
        total_amount: None,
        recipient_id,
        recipient: None,
        method,
        destination,
        reference: Some(e.reference),
        description: Some(e.description).filter(|d| !d.is_empty()),
        balance_before: Some(e.balance_before),
        balance_after: Some(e.balance_after),
        metadata: Some(e.metadata),
        created_at: e.created_at,
    }
}
