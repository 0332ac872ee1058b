//! Atomic posting
//!
//! A [`Posting`] is the only way a balance changes. Every leg moves one
//! balance of one user and produces exactly one completed ledger entry; an
//! optional [`RequestTransition`] flips the originating request's status.
//! Stores apply a posting all-or-nothing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::types::{EntryMetadata, EntryStatus, EntryType, LedgerEntry};
use crate::account::{BalanceSnapshot, User};
use crate::admin::audit::AuditRecord;
use crate::core_types::{Asset, UserId};
use crate::requests::RequestKind;

/// One balance movement
#[derive(Debug, Clone)]
pub struct PostingLeg {
    pub user_id: UserId,
    pub asset: Asset,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub currency: String,
    pub reference: String,
    pub description: String,
    pub metadata: EntryMetadata,
}

/// Compare-and-set on a request's status, applied with the legs
#[derive(Debug, Clone)]
pub struct RequestTransition {
    pub kind: RequestKind,
    pub id: Uuid,
    /// Statuses the request may currently be in
    pub from: Vec<&'static str>,
    pub to: &'static str,
    pub admin_note: Option<String>,
    /// `updated_at` of the row the legs were built from; any later edit
    /// fails the posting
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Posting {
    pub legs: Vec<PostingLeg>,
    pub transition: Option<RequestTransition>,
    /// Written with the posting when an admin triggered it
    pub audit: Option<AuditRecord>,
    /// Replace the audit's snapshots with the target user's balances as the
    /// store saw them around this posting
    pub audit_balances: bool,
}

/// Result of an applied posting
#[derive(Debug, Clone, Default)]
pub struct PostingReceipt {
    /// One entry per leg, in leg order
    pub entries: Vec<LedgerEntry>,
    /// Balances of every touched user after the posting
    pub balances: Vec<BalanceSnapshot>,
}

/// A debit leg found less balance than it needs
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    pub user_id: UserId,
    pub asset: Asset,
    pub available: Decimal,
    pub required: Decimal,
}

/// Why a leg could not be applied
#[derive(Debug, Clone, PartialEq)]
pub enum LegError {
    Shortfall(Shortfall),
    /// The resulting balance is not representable
    Overflow { user_id: UserId, asset: Asset },
}

impl PostingLeg {
    /// Apply this leg to a locked user row and build its ledger entry.
    ///
    /// The caller must hold the row for the whole posting.
    pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) -> Result<LedgerEntry, LegError> {
        let before = user.balance(self.asset);
        if !self.entry_type.is_credit() && before < self.amount {
            return Err(LegError::Shortfall(Shortfall {
                user_id: self.user_id,
                asset: self.asset,
                available: before,
                required: self.amount,
            }));
        }
        let after = self
            .entry_type
            .apply(before, self.amount)
            .ok_or(LegError::Overflow {
                user_id: self.user_id,
                asset: self.asset,
            })?;
        match self.asset {
            Asset::Fiat => user.fiat_balance = after,
            Asset::Secondary => user.secondary_balance = after,
        }
        user.updated_at = now;

        Ok(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            amount: self.amount,
            entry_type: self.entry_type,
            status: EntryStatus::Completed,
            currency: self.currency.clone(),
            balance_before: before,
            balance_after: after,
            reference: self.reference.clone(),
            description: self.description.clone(),
            metadata: self.metadata.clone(),
            created_at: now,
        })
    }
}

impl Posting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leg(mut self, leg: PostingLeg) -> Self {
        self.legs.push(leg);
        self
    }

    pub fn transition(mut self, transition: RequestTransition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn audited(mut self, audit: AuditRecord) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Like [`Posting::audited`], with `before`/`after` taken from the
    /// locked rows of the user the audit targets
    pub fn audited_balances(mut self, audit: AuditRecord) -> Self {
        self.audit = Some(audit);
        self.audit_balances = true;
        self
    }

    /// The audit record to persist
    pub fn sealed_audit(
        &self,
        before: &[BalanceSnapshot],
        after: &[BalanceSnapshot],
    ) -> Option<AuditRecord> {
        let audit = self.audit.clone()?;
        if !self.audit_balances {
            return Some(audit);
        }
        let target = audit.target_id;
        let of = |set: &[BalanceSnapshot]| set.iter().find(|b| b.user_id == target).cloned();
        let (before, after) = (of(before), of(after));
        Some(audit.with_snapshots(before.as_ref(), after.as_ref()))
    }

    /// Distinct users touched, sorted so row locks are always taken in the
    /// same order
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.legs.iter().map(|l| l.user_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Structural checks that do not need the store
    pub fn validate(&self) -> Result<(), String> {
        if self.legs.is_empty() && self.transition.is_none() {
            return Err("empty posting".into());
        }
        for leg in &self.legs {
            if leg.amount <= Decimal::ZERO {
                return Err(format!("leg {} has non-positive amount", leg.reference));
            }
        }
        Ok(())
    }
}

impl PostingReceipt {
    pub fn balance_of(&self, user_id: UserId) -> Option<&BalanceSnapshot> {
        self.balances.iter().find(|b| b.user_id == user_id)
    }
}
