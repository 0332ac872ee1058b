//! Request submission and review
//!
//! Users submit requests as `pending`; only an admin review moves money.
//! Every review is one posting: the ledger legs, the request status
//! compare-and-set and the audit record land together or not at all.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::types::{
    DepositRequest, RequestKind, RequestRecord, ReviewStatus, TransferRequest, TransferStatus,
    WithdrawalRequest,
};
use crate::admin::audit::{AuditAction, AuditRecord};
use crate::core_types::{Asset, MovementSource, UserId};
use crate::ledger::{EntryMetadata, EntryType, LedgerEntry, Posting, PostingLeg, RequestTransition};
use crate::money::{FIAT_SCALE, MoneyError, parse_amount, parse_fee};
use crate::store::{Backend, RequestQuery, StoreError};

#[derive(Error, Debug, Clone)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Validation(_) => "INVALID_REQUEST",
            RequestError::NotFound(_) => "NOT_FOUND",
            RequestError::InsufficientFunds => "INSUFFICIENT_BALANCE",
            RequestError::InvalidTransition(_) => "INVALID_STATE_TRANSITION",
            RequestError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RequestError::Validation(_) => 400,
            RequestError::NotFound(_) => 404,
            RequestError::InvalidTransition(_) => 409,
            RequestError::InsufficientFunds => 422,
            RequestError::Persistence(_) => 500,
        }
    }
}

impl From<MoneyError> for RequestError {
    fn from(e: MoneyError) -> Self {
        RequestError::Validation(e.to_string())
    }
}

impl From<StoreError> for RequestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => RequestError::NotFound(what),
            StoreError::InsufficientBalance { .. } => RequestError::InsufficientFunds,
            StoreError::Conflict(what) => RequestError::InvalidTransition(what),
            StoreError::InvalidPosting(why) => RequestError::Validation(why),
            other => RequestError::Persistence(other.to_string()),
        }
    }
}

/// New request payload, amounts as decimal strings
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubmitRequest {
    Deposit {
        amount: String,
        currency: Option<String>,
        method: Option<String>,
        proof_reference: Option<String>,
    },
    Withdrawal {
        amount: String,
        fee: Option<String>,
        currency: Option<String>,
        destination: Option<String>,
    },
    Transfer {
        recipient_id: UserId,
        amount: String,
        fee: Option<String>,
        currency: Option<String>,
        note: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    /// Deposit or withdrawal: pending -> approved
    Approve,
    /// Deposit or withdrawal: pending -> rejected
    Reject,
    /// Transfer: pending -> processing
    Process,
    /// Transfer: pending|processing -> completed
    Complete,
    /// Transfer: pending|processing -> failed
    Fail,
    /// Transfer: pending|processing -> cancelled
    Cancel,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
            ReviewAction::Process => "process",
            ReviewAction::Complete => "complete",
            ReviewAction::Fail => "fail",
            ReviewAction::Cancel => "cancel",
        }
    }

    /// Allowed source statuses and target status for `kind`
    fn transition(&self, kind: RequestKind) -> Option<(Vec<&'static str>, &'static str)> {
        let open = || {
            vec![
                TransferStatus::Pending.as_str(),
                TransferStatus::Processing.as_str(),
            ]
        };
        match (kind, self) {
            (RequestKind::Deposit | RequestKind::Withdrawal, ReviewAction::Approve) => Some((
                vec![ReviewStatus::Pending.as_str()],
                ReviewStatus::Approved.as_str(),
            )),
            (RequestKind::Deposit | RequestKind::Withdrawal, ReviewAction::Reject) => Some((
                vec![ReviewStatus::Pending.as_str()],
                ReviewStatus::Rejected.as_str(),
            )),
            (RequestKind::Transfer, ReviewAction::Process) => Some((
                vec![TransferStatus::Pending.as_str()],
                TransferStatus::Processing.as_str(),
            )),
            (RequestKind::Transfer, ReviewAction::Complete) => {
                Some((open(), TransferStatus::Completed.as_str()))
            }
            (RequestKind::Transfer, ReviewAction::Fail) => {
                Some((open(), TransferStatus::Failed.as_str()))
            }
            (RequestKind::Transfer, ReviewAction::Cancel) => {
                Some((open(), TransferStatus::Cancelled.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            "process" => Ok(ReviewAction::Process),
            "complete" => Ok(ReviewAction::Complete),
            "fail" => Ok(ReviewAction::Fail),
            "cancel" => Ok(ReviewAction::Cancel),
            _ => Err(format!("Invalid review action: {}", s)),
        }
    }
}

/// Reviewed request and the ledger entries its review wrote
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewOutcome {
    pub request: RequestRecord,
    pub entries: Vec<LedgerEntry>,
}

fn ledger_reference(prefix: &str) -> String {
    format!("{}-{}", prefix, ulid::Ulid::new())
}

fn clean(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct RequestService {
    backend: Arc<dyn Backend>,
    default_currency: String,
}

impl RequestService {
    pub fn new(backend: Arc<dyn Backend>, default_currency: impl Into<String>) -> Self {
        Self {
            backend,
            default_currency: default_currency.into(),
        }
    }

    pub async fn submit(
        &self,
        user_id: UserId,
        req: SubmitRequest,
    ) -> Result<RequestRecord, RequestError> {
        let user = self
            .backend
            .get_user(user_id)
            .await?
            .ok_or_else(|| RequestError::NotFound(format!("user {}", user_id)))?;
        let currency_for = |requested: Option<String>| {
            clean(requested)
                .or_else(|| user.currency.clone())
                .unwrap_or_else(|| self.default_currency.clone())
                .to_uppercase()
        };
        let now = Utc::now();

        let record = match req {
            SubmitRequest::Deposit {
                amount,
                currency,
                method,
                proof_reference,
            } => RequestRecord::Deposit(DepositRequest {
                id: Uuid::new_v4(),
                user_id,
                amount: parse_amount(&amount, FIAT_SCALE)?,
                currency: currency_for(currency),
                method: clean(method),
                proof_reference: clean(proof_reference),
                status: ReviewStatus::Pending,
                admin_note: None,
                created_at: now,
                updated_at: now,
            }),
            SubmitRequest::Withdrawal {
                amount,
                fee,
                currency,
                destination,
            } => {
                let amount = parse_amount(&amount, FIAT_SCALE)?;
                let fee = parse_fee(fee.as_deref(), FIAT_SCALE)?;
                if fee >= amount {
                    return Err(RequestError::Validation("fee must be below amount".into()));
                }
                if user.balance(Asset::Fiat) < amount {
                    return Err(RequestError::InsufficientFunds);
                }
                let mut w = WithdrawalRequest {
                    id: Uuid::new_v4(),
                    user_id,
                    amount,
                    fee,
                    net_amount: Decimal::ZERO,
                    currency: currency_for(currency),
                    destination: clean(destination),
                    status: ReviewStatus::Pending,
                    admin_note: None,
                    created_at: now,
                    updated_at: now,
                };
                w.recompute()?;
                RequestRecord::Withdrawal(w)
            }
            SubmitRequest::Transfer {
                recipient_id,
                amount,
                fee,
                currency,
                note,
            } => {
                if recipient_id == user_id {
                    return Err(RequestError::Validation("cannot transfer to yourself".into()));
                }
                if self.backend.get_user(recipient_id).await?.is_none() {
                    return Err(RequestError::NotFound(format!("recipient {}", recipient_id)));
                }
                let mut t = TransferRequest {
                    id: Uuid::new_v4(),
                    user_id,
                    recipient_id,
                    amount: parse_amount(&amount, FIAT_SCALE)?,
                    fee: parse_fee(fee.as_deref(), FIAT_SCALE)?,
                    total_amount: Decimal::ZERO,
                    currency: currency_for(currency),
                    note: clean(note),
                    status: TransferStatus::Pending,
                    admin_note: None,
                    created_at: now,
                    updated_at: now,
                };
                t.recompute()?;
                if user.balance(Asset::Fiat) < t.total_amount {
                    return Err(RequestError::InsufficientFunds);
                }
                RequestRecord::Transfer(t)
            }
        };

        let record = self.backend.insert_request(record).await?;
        info!(
            user_id = %user_id,
            kind = %record.kind(),
            request_id = %record.id(),
            amount = %record.amount(),
            "Request submitted"
        );
        Ok(record)
    }

    /// Ledger legs a transition to `to` posts, if any
    fn legs_for(record: &RequestRecord, to: &str) -> Vec<PostingLeg> {
        match record {
            RequestRecord::Deposit(r) if to == ReviewStatus::Approved.as_str() => vec![PostingLeg {
                user_id: r.user_id,
                asset: Asset::Fiat,
                amount: r.amount,
                entry_type: EntryType::Deposit,
                currency: r.currency.clone(),
                reference: ledger_reference("DEP"),
                description: "Deposit approved".into(),
                metadata: EntryMetadata::Deposit {
                    method: r.method.clone(),
                    request_id: Some(r.id),
                },
            }],
            RequestRecord::Withdrawal(r) if to == ReviewStatus::Approved.as_str() => {
                vec![PostingLeg {
                    user_id: r.user_id,
                    asset: Asset::Fiat,
                    amount: r.amount,
                    entry_type: EntryType::Withdrawal,
                    currency: r.currency.clone(),
                    reference: ledger_reference("WDR"),
                    description: "Withdrawal approved".into(),
                    metadata: EntryMetadata::Withdrawal {
                        fee: r.fee,
                        destination: r.destination.clone(),
                        request_id: Some(r.id),
                    },
                }]
            }
            RequestRecord::Transfer(r) if to == TransferStatus::Completed.as_str() => {
                let base = ledger_reference("TRF");
                vec![
                    PostingLeg {
                        user_id: r.user_id,
                        asset: Asset::Fiat,
                        amount: r.total_amount,
                        entry_type: EntryType::TransferOut,
                        currency: r.currency.clone(),
                        reference: format!("{}-OUT", base),
                        description: format!("Transfer to {}", r.recipient_id),
                        metadata: EntryMetadata::Transfer {
                            counterparty: r.recipient_id,
                            fee: r.fee,
                            request_id: Some(r.id),
                        },
                    },
                    PostingLeg {
                        user_id: r.recipient_id,
                        asset: Asset::Fiat,
                        amount: r.amount,
                        entry_type: EntryType::TransferIn,
                        currency: r.currency.clone(),
                        reference: format!("{}-IN", base),
                        description: format!("Transfer from {}", r.user_id),
                        metadata: EntryMetadata::Transfer {
                            counterparty: r.user_id,
                            fee: Decimal::ZERO,
                            request_id: Some(r.id),
                        },
                    },
                ]
            }
            _ => Vec::new(),
        }
    }

    pub async fn review(
        &self,
        kind: RequestKind,
        id: Uuid,
        action: ReviewAction,
        actor: UserId,
        note: Option<String>,
    ) -> Result<ReviewOutcome, RequestError> {
        let (from, to) = action.transition(kind).ok_or_else(|| {
            RequestError::Validation(format!("cannot {} a {}", action, kind))
        })?;

        let record = self
            .backend
            .get_request(kind, id)
            .await?
            .ok_or_else(|| RequestError::NotFound(format!("{} {}", kind, id)))?;
        if !from.contains(&record.status_str()) {
            return Err(RequestError::InvalidTransition(format!(
                "{} {} is {}",
                kind,
                id,
                record.status_str()
            )));
        }

        let note = clean(note);
        let mut after = record.clone();
        after
            .set_status(to)
            .map_err(RequestError::Validation)?;
        if note.is_some() {
            after.set_admin_note(note.clone());
        }
        let audit = AuditRecord::new(actor, AuditAction::Review, MovementSource::User, kind, id)
            .with_snapshots(Some(&record), Some(&after));

        let mut posting = Posting::new()
            .transition(RequestTransition {
                kind,
                id,
                from,
                to,
                admin_note: note,
                read_at: record.updated_at(),
            })
            .audited(audit);
        for leg in Self::legs_for(&record, to) {
            posting = posting.leg(leg);
        }

        let receipt = self.backend.settle(posting).await?;
        let request = self
            .backend
            .get_request(kind, id)
            .await?
            .ok_or_else(|| RequestError::NotFound(format!("{} {}", kind, id)))?;

        info!(
            %kind,
            request_id = %id,
            %action,
            actor = %actor,
            status = request.status_str(),
            entries = receipt.entries.len(),
            "Request reviewed"
        );
        Ok(ReviewOutcome {
            request,
            entries: receipt.entries,
        })
    }

    /// A user's own requests of one kind, newest first
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        kind: RequestKind,
        limit: usize,
    ) -> Result<Vec<RequestRecord>, RequestError> {
        let rows = self
            .backend
            .find_requests(&RequestQuery::new(kind).for_user(user_id), limit)
            .await?;
        Ok(rows.into_iter().map(|r| r.record).collect())
    }
}
