//! Store layer
//!
//! The ledger, the three request collections, users and the audit log sit
//! behind async traits so the services run unchanged against PostgreSQL or
//! the in-memory store.
//!
//! Read paths return copies. Balances change only through
//! [`Settlement::settle`], which applies a [`Posting`] as one unit of work.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::account::{User, UserSummary};
use crate::admin::audit::AuditRecord;
use crate::core_types::{Asset, UserId};
use crate::ledger::{EntryStatus, EntryType, LedgerEntry, LegError, Posting, PostingReceipt};
use crate::requests::{RequestKind, RequestRecord};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient {asset} balance for user {user_id}")]
    InsufficientBalance { user_id: UserId, asset: Asset },

    /// Compare-and-set lost: the row changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value did not decode into its domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Invalid posting: {0}")]
    InvalidPosting(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::Corrupt(_) => "CORRUPT_ROW",
            StoreError::InvalidPosting(_) => "INVALID_POSTING",
            StoreError::InvalidQuery(_) => "INVALID_QUERY",
        }
    }
}

impl From<LegError> for StoreError {
    fn from(e: LegError) -> Self {
        match e {
            LegError::Shortfall(s) => StoreError::InsufficientBalance {
                user_id: s.user_id,
                asset: s.asset,
            },
            LegError::Overflow { user_id, asset } => StoreError::InvalidPosting(format!(
                "{} balance of user {} would overflow",
                asset, user_id
            )),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Ledger entry joined with its owner's display info
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub entry: LedgerEntry,
    pub user: Option<UserSummary>,
}

/// Request record joined with sender and (for transfers) recipient
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub record: RequestRecord,
    pub user: Option<UserSummary>,
    pub recipient: Option<UserSummary>,
}

/// Ledger filter. Empty `entry_types` means every type; `statuses: None`
/// means every status and `Some(vec![])` matches nothing.
#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    pub entry_types: Vec<EntryType>,
    pub statuses: Option<Vec<EntryStatus>>,
    pub user_id: Option<UserId>,
}

impl LedgerQuery {
    pub fn for_types(types: &[EntryType]) -> Self {
        Self {
            entry_types: types.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<EntryStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// True when the filter can only match nothing
    pub fn is_empty_match(&self) -> bool {
        self.statuses.as_ref().is_some_and(|s| s.is_empty())
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        (self.entry_types.is_empty() || self.entry_types.contains(&entry.entry_type))
            && self
                .statuses
                .as_ref()
                .is_none_or(|s| s.contains(&entry.status))
            && self.user_id.is_none_or(|u| u == entry.user_id)
    }
}

/// Request filter over one collection. Status strings are in the kind's own
/// vocabulary; `Some(vec![])` matches nothing.
#[derive(Debug, Clone)]
pub struct RequestQuery {
    pub kind: RequestKind,
    pub statuses: Option<Vec<&'static str>>,
    pub user_id: Option<UserId>,
}

impl RequestQuery {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            statuses: None,
            user_id: None,
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<&'static str>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn is_empty_match(&self) -> bool {
        self.statuses.as_ref().is_some_and(|s| s.is_empty())
    }

    pub fn matches(&self, record: &RequestRecord) -> bool {
        record.kind() == self.kind
            && self
                .statuses
                .as_ref()
                .is_none_or(|s| s.contains(&record.status_str()))
            && self.user_id.is_none_or(|u| u == record.user_id())
    }
}

/// Request row as a correction read it. The write only lands if the row
/// still carries this stamp and status; otherwise it fails with
/// [`StoreError::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestVersion {
    pub updated_at: DateTime<Utc>,
    pub status: &'static str,
}

impl RequestVersion {
    pub fn of(record: &RequestRecord) -> Self {
        Self {
            updated_at: record.updated_at(),
            status: record.status_str(),
        }
    }

    pub fn matches(&self, record: &RequestRecord) -> bool {
        record.updated_at() == self.updated_at && record.status_str() == self.status
    }
}

/// What an admin correction does to its target row
#[derive(Debug, Clone)]
pub enum CorrectionTarget {
    ReplaceLedger(LedgerEntry),
    DeleteLedger(Uuid),
    ReplaceRequest {
        record: RequestRecord,
        read: RequestVersion,
    },
    DeleteRequest {
        kind: RequestKind,
        id: Uuid,
        read: RequestVersion,
    },
}

/// A correction and its audit record, written together
#[derive(Debug, Clone)]
pub struct CorrectionWrite {
    pub target: CorrectionTarget,
    pub audit: AuditRecord,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: User) -> Result<User, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn count_entries(&self, query: &LedgerQuery) -> Result<u64, StoreError>;

    /// Up to `limit` matching entries, newest first, joined with user info
    async fn find_entries(
        &self,
        query: &LedgerQuery,
        limit: usize,
    ) -> Result<Vec<LedgerRow>, StoreError>;

    async fn get_entry(&self, id: Uuid) -> Result<Option<LedgerEntry>, StoreError>;

    /// Every entry carrying swap metadata, optionally for one user
    async fn find_swap_entries(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError>;

    /// Up to `limit` matching records, newest first, joined with user info
    async fn find_requests(
        &self,
        query: &RequestQuery,
        limit: usize,
    ) -> Result<Vec<RequestRow>, StoreError>;

    async fn get_request(
        &self,
        kind: RequestKind,
        id: Uuid,
    ) -> Result<Option<RequestRecord>, StoreError>;

    async fn insert_request(&self, record: RequestRecord) -> Result<RequestRecord, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Most recent audit records first
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError>;
}

#[async_trait]
pub trait Settlement: Send + Sync {
    /// Apply every leg and the optional request transition all-or-nothing.
    ///
    /// Debit legs re-check the balance under the store's lock and fail with
    /// [`StoreError::InsufficientBalance`] without writing anything.
    async fn settle(&self, posting: Posting) -> Result<PostingReceipt, StoreError>;

    /// Replace or delete one row and append its audit record atomically
    async fn commit_correction(&self, write: CorrectionWrite) -> Result<(), StoreError>;
}

/// Everything the services need from a store
#[async_trait]
pub trait Backend: UserStore + LedgerStore + RequestStore + AuditStore + Settlement {
    fn name(&self) -> &'static str;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<(), StoreError>;
}
