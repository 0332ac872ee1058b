//! Request record types
//!
//! Deposit, withdrawal and transfer requests each keep their own status
//! vocabulary. They are reconciled with the ledger at read time and never
//! copied into it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::UserId;
use crate::ledger::EntryType;
use crate::money::MoneyError;

/// Money-movement category; one request collection per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl RequestKind {
    pub const ALL: [RequestKind; 3] = [
        RequestKind::Deposit,
        RequestKind::Withdrawal,
        RequestKind::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Deposit => "deposit",
            RequestKind::Withdrawal => "withdrawal",
            RequestKind::Transfer => "transfer",
        }
    }

    /// Ledger entry types that belong to this category
    pub fn ledger_types(&self) -> &'static [EntryType] {
        match self {
            RequestKind::Deposit => &[EntryType::Deposit],
            RequestKind::Withdrawal => &[EntryType::Withdrawal],
            RequestKind::Transfer => &[EntryType::TransferIn, EntryType::TransferOut],
        }
    }

    /// Every status value valid for this kind, in lifecycle order
    pub fn statuses(&self) -> &'static [&'static str] {
        match self {
            RequestKind::Deposit | RequestKind::Withdrawal => &["pending", "approved", "rejected"],
            RequestKind::Transfer => &["pending", "processing", "completed", "failed", "cancelled"],
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    /// Accepts singular and plural forms (`deposit`, `deposits`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deposit" | "deposits" => Ok(RequestKind::Deposit),
            "withdrawal" | "withdrawals" => Ok(RequestKind::Withdrawal),
            "transfer" | "transfers" => Ok(RequestKind::Transfer),
            _ => Err(format!("Invalid movement category: {}", s)),
        }
    }
}

/// Status of deposit and withdrawal requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 3] = [
        ReviewStatus::Pending,
        ReviewStatus::Approved,
        ReviewStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            _ => Err(format!("Invalid review status: {}", s)),
        }
    }
}

/// Status of transfer requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::Pending,
        TransferStatus::Processing,
        TransferStatus::Completed,
        TransferStatus::Failed,
        TransferStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Processing => "processing",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    /// No further transitions from a terminal status
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransferStatus::Pending),
            "processing" => Ok(TransferStatus::Processing),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            "cancelled" | "canceled" => Ok(TransferStatus::Cancelled),
            _ => Err(format!("Invalid transfer status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    /// Payment method label (bank wire, card, ...)
    pub method: Option<String>,
    pub proof_reference: Option<String>,
    pub status: ReviewStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    pub fee: Decimal,
    /// `amount - fee`, what actually leaves the platform
    pub net_amount: Decimal,
    pub currency: String,
    pub destination: Option<String>,
    pub status: ReviewStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: Uuid,
    /// Sender
    pub user_id: UserId,
    pub recipient_id: UserId,
    pub amount: Decimal,
    pub fee: Decimal,
    /// `amount + fee`, what the sender is debited
    pub total_amount: Decimal,
    pub currency: String,
    pub note: Option<String>,
    pub status: TransferStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn recompute(&mut self) -> Result<(), MoneyError> {
        self.net_amount = self.amount.checked_sub(self.fee).ok_or(MoneyError::Overflow)?;
        Ok(())
    }
}

impl TransferRequest {
    pub fn recompute(&mut self) -> Result<(), MoneyError> {
        self.total_amount = self.amount.checked_add(self.fee).ok_or(MoneyError::Overflow)?;
        Ok(())
    }
}

/// Any request record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestRecord {
    Deposit(DepositRequest),
    Withdrawal(WithdrawalRequest),
    Transfer(TransferRequest),
}

impl RequestRecord {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestRecord::Deposit(_) => RequestKind::Deposit,
            RequestRecord::Withdrawal(_) => RequestKind::Withdrawal,
            RequestRecord::Transfer(_) => RequestKind::Transfer,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            RequestRecord::Deposit(r) => r.id,
            RequestRecord::Withdrawal(r) => r.id,
            RequestRecord::Transfer(r) => r.id,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            RequestRecord::Deposit(r) => r.user_id,
            RequestRecord::Withdrawal(r) => r.user_id,
            RequestRecord::Transfer(r) => r.user_id,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            RequestRecord::Deposit(r) => r.amount,
            RequestRecord::Withdrawal(r) => r.amount,
            RequestRecord::Transfer(r) => r.amount,
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            RequestRecord::Deposit(r) => r.status.as_str(),
            RequestRecord::Withdrawal(r) => r.status.as_str(),
            RequestRecord::Transfer(r) => r.status.as_str(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            RequestRecord::Deposit(r) => r.created_at,
            RequestRecord::Withdrawal(r) => r.created_at,
            RequestRecord::Transfer(r) => r.created_at,
        }
    }

    /// Version stamp for compare-and-set writes
    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            RequestRecord::Deposit(r) => r.updated_at,
            RequestRecord::Withdrawal(r) => r.updated_at,
            RequestRecord::Transfer(r) => r.updated_at,
        }
    }

    /// Advance `updated_at` by at least one microsecond, the storage resolution
    pub fn touch(&mut self) {
        let now = Utc::now().max(self.updated_at() + chrono::Duration::microseconds(1));
        match self {
            RequestRecord::Deposit(r) => r.updated_at = now,
            RequestRecord::Withdrawal(r) => r.updated_at = now,
            RequestRecord::Transfer(r) => r.updated_at = now,
        }
    }

    pub fn set_admin_note(&mut self, note: Option<String>) {
        match self {
            RequestRecord::Deposit(r) => r.admin_note = note,
            RequestRecord::Withdrawal(r) => r.admin_note = note,
            RequestRecord::Transfer(r) => r.admin_note = note,
        }
    }

    /// Set the status from its string form, checked against this kind's vocabulary
    pub fn set_status(&mut self, status: &str) -> Result<(), String> {
        match self {
            RequestRecord::Deposit(r) => r.status = status.parse()?,
            RequestRecord::Withdrawal(r) => r.status = status.parse()?,
            RequestRecord::Transfer(r) => r.status = status.parse()?,
        }
        Ok(())
    }
}
