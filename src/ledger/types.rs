//! Ledger entry types
//!
//! String forms match what is stored in the `ledger_entries` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::{Asset, UserId};

/// Movement type of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "deposit")]
    Deposit,
    #[serde(rename = "withdrawal")]
    Withdrawal,
    #[serde(rename = "transfer-in")]
    TransferIn,
    #[serde(rename = "transfer-out")]
    TransferOut,
}

impl EntryType {
    pub const ALL: [EntryType; 4] = [
        EntryType::Deposit,
        EntryType::Withdrawal,
        EntryType::TransferIn,
        EntryType::TransferOut,
    ];

    /// Credit entries raise the affected balance, debits lower it
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(self, EntryType::Deposit | EntryType::TransferIn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
            EntryType::TransferIn => "transfer-in",
            EntryType::TransferOut => "transfer-out",
        }
    }

    /// Apply this entry's polarity to a balance; `None` on overflow
    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Option<Decimal> {
        if self.is_credit() {
            balance.checked_add(amount)
        } else {
            balance.checked_sub(amount)
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryType::Deposit),
            "withdrawal" => Ok(EntryType::Withdrawal),
            "transfer-in" => Ok(EntryType::TransferIn),
            "transfer-out" => Ok(EntryType::TransferOut),
            _ => Err(format!("Invalid entry type: {}", s)),
        }
    }
}

/// Canonical three-state status shared by every movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 3] = [
        EntryStatus::Pending,
        EntryStatus::Completed,
        EntryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EntryStatus::Pending),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            _ => Err(format!("Invalid entry status: {}", s)),
        }
    }
}

/// Which half of a swap an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapLeg {
    Out,
    In,
}

impl SwapLeg {
    /// Reference suffix appended to the swap base reference
    pub fn suffix(&self) -> &'static str {
        match self {
            SwapLeg::Out => "-OUT",
            SwapLeg::In => "-IN",
        }
    }

    pub fn reference(&self, base: &str) -> String {
        format!("{}{}", base, self.suffix())
    }
}

/// Correlation data carried by both entries of one swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapMetadata {
    pub swap_reference: String,
    pub leg: SwapLeg,
    /// Oracle price: fiat per one unit of the secondary asset
    pub rate: Decimal,
    pub quote_currency: String,
    /// Value of this leg in fiat at `rate`
    pub fiat_equivalent: Decimal,
    pub fee: Decimal,
    pub counterpart_asset: Asset,
    pub counterpart_amount: Decimal,
}

/// Typed metadata per movement kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryMetadata {
    #[default]
    None,
    Swap(SwapMetadata),
    Deposit {
        method: Option<String>,
        request_id: Option<Uuid>,
    },
    Withdrawal {
        fee: Decimal,
        destination: Option<String>,
        request_id: Option<Uuid>,
    },
    Transfer {
        counterparty: UserId,
        fee: Decimal,
        request_id: Option<Uuid>,
    },
    Adjustment {
        actor: UserId,
        note: String,
    },
}

impl EntryMetadata {
    pub fn as_swap(&self) -> Option<&SwapMetadata> {
        match self {
            EntryMetadata::Swap(m) => Some(m),
            _ => None,
        }
    }
}

/// Canonical ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    /// Always positive; direction comes from `entry_type`
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    /// Fiat code or the secondary-asset symbol
    pub currency: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference: String,
    pub description: String,
    pub metadata: EntryMetadata,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `balance_after == balance_before ± amount` for the entry's polarity
    pub fn is_consistent(&self) -> bool {
        self.amount > Decimal::ZERO
            && self.entry_type.apply(self.balance_before, self.amount) == Some(self.balance_after)
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry[{}] {} {} {} user={} {} -> {} status={}",
            self.reference,
            self.entry_type,
            self.amount,
            self.currency,
            self.user_id,
            self.balance_before,
            self.balance_after,
            self.status
        )
    }
}
