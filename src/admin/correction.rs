//! Admin edit/delete of movements
//!
//! `admin` movements are ledger entries, `user` movements are request
//! records. A correction rewrites the stored row only; balances move through
//! adjustments. Each change is committed together with its audit record.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::audit::{AuditAction, AuditRecord};
use crate::core_types::{Asset, MovementSource, UserId};
use crate::ledger::{EntryStatus, LedgerEntry};
use crate::money::{FIAT_SCALE, MoneyError, parse_amount, parse_fee, scale_for};
use crate::normalizer::{self, MovementView, category_of};
use crate::requests::{RequestKind, RequestRecord};
use crate::store::{
    Backend, CorrectionTarget, CorrectionWrite, LedgerRow, RequestRow, RequestVersion, StoreError,
};

#[derive(Error, Debug, Clone)]
pub enum CorrectionError {
    #[error("Invalid correction: {0}")]
    Validation(String),

    #[error("Movement not found: {0}")]
    NotFound(String),

    /// The row changed between read and write
    #[error("Movement changed concurrently: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl CorrectionError {
    pub fn code(&self) -> &'static str {
        match self {
            CorrectionError::Validation(_) => "INVALID_CORRECTION",
            CorrectionError::NotFound(_) => "NOT_FOUND",
            CorrectionError::Conflict(_) => "CONFLICT",
            CorrectionError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CorrectionError::Validation(_) => 400,
            CorrectionError::NotFound(_) => 404,
            CorrectionError::Conflict(_) => 409,
            CorrectionError::Persistence(_) => 500,
        }
    }
}

impl From<StoreError> for CorrectionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => CorrectionError::NotFound(what),
            StoreError::InsufficientBalance { .. } => {
                CorrectionError::Validation("insufficient balance".into())
            }
            StoreError::Conflict(what) => CorrectionError::Conflict(what),
            StoreError::InvalidPosting(why) => CorrectionError::Validation(why),
            other => CorrectionError::Persistence(other.to_string()),
        }
    }
}

impl From<MoneyError> for CorrectionError {
    fn from(e: MoneyError) -> Self {
        CorrectionError::Validation(e.to_string())
    }
}

/// Fields an admin may change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementPatch {
    pub amount: Option<String>,
    /// Withdrawals and transfers only
    pub fee: Option<String>,
    /// Canonical status for ledger entries, the kind's own status for requests
    pub status: Option<String>,
    /// Ledger entries only
    pub description: Option<String>,
    /// Requests only
    pub admin_note: Option<String>,
}

impl MovementPatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.fee.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.admin_note.is_none()
    }
}

/// Stored row a correction targets
enum Located {
    Ledger(LedgerEntry),
    Request(RequestRecord),
}

/// Asset a ledger entry moved. Only swap legs touch the secondary asset.
fn entry_asset(entry: &LedgerEntry) -> Asset {
    entry
        .metadata
        .as_swap()
        .map(|m| m.counterpart_asset.other())
        .unwrap_or(Asset::Fiat)
}

pub struct CorrectionService {
    pub(super) backend: Arc<dyn Backend>,
    /// Currency of adjustment entries for users without one
    pub(super) default_currency: String,
}

impl CorrectionService {
    pub fn new(backend: Arc<dyn Backend>, default_currency: impl Into<String>) -> Self {
        Self {
            backend,
            default_currency: default_currency.into(),
        }
    }

    async fn locate(&self, source: MovementSource, id: Uuid) -> Result<Located, CorrectionError> {
        match source {
            MovementSource::Admin => self
                .backend
                .get_entry(id)
                .await?
                .map(Located::Ledger)
                .ok_or_else(|| CorrectionError::NotFound(format!("ledger entry {}", id))),
            MovementSource::User => {
                for kind in RequestKind::ALL {
                    if let Some(record) = self.backend.get_request(kind, id).await? {
                        return Ok(Located::Request(record));
                    }
                }
                Err(CorrectionError::NotFound(format!("request {}", id)))
            }
        }
    }

    async fn view_of(&self, located: Located) -> Result<MovementView, CorrectionError> {
        match located {
            Located::Ledger(entry) => {
                let user = self.backend.get_user(entry.user_id).await?.map(|u| u.summary());
                Ok(normalizer::from_ledger(LedgerRow { entry, user }))
            }
            Located::Request(record) => {
                let user = self.backend.get_user(record.user_id()).await?.map(|u| u.summary());
                let recipient = match &record {
                    RequestRecord::Transfer(t) => {
                        self.backend.get_user(t.recipient_id).await?.map(|u| u.summary())
                    }
                    _ => None,
                };
                Ok(normalizer::normalize(RequestRow {
                    record,
                    user,
                    recipient,
                }))
            }
        }
    }

    fn patch_request(
        record: &RequestRecord,
        patch: &MovementPatch,
    ) -> Result<RequestRecord, CorrectionError> {
        if patch.description.is_some() {
            return Err(CorrectionError::Validation(
                "description applies to ledger entries".into(),
            ));
        }
        let mut updated = record.clone();
        let amount = patch
            .amount
            .as_deref()
            .map(|a| parse_amount(a, FIAT_SCALE))
            .transpose()?;
        let fee = match &patch.fee {
            Some(f) => Some(parse_fee(Some(f.as_str()), FIAT_SCALE)?),
            None => None,
        };

        match &mut updated {
            RequestRecord::Deposit(r) => {
                if fee.is_some() {
                    return Err(CorrectionError::Validation("deposits carry no fee".into()));
                }
                if let Some(a) = amount {
                    r.amount = a;
                }
            }
            RequestRecord::Withdrawal(r) => {
                if let Some(a) = amount {
                    r.amount = a;
                }
                if let Some(f) = fee {
                    r.fee = f;
                }
                if r.fee >= r.amount {
                    return Err(CorrectionError::Validation("fee must be below amount".into()));
                }
                r.recompute()?;
            }
            RequestRecord::Transfer(r) => {
                if let Some(a) = amount {
                    r.amount = a;
                }
                if let Some(f) = fee {
                    r.fee = f;
                }
                r.recompute()?;
            }
        }

        if let Some(status) = &patch.status {
            updated
                .set_status(status)
                .map_err(CorrectionError::Validation)?;
        }
        if let Some(note) = &patch.admin_note {
            updated.set_admin_note(Some(note.trim().to_string()).filter(|n| !n.is_empty()));
        }
        updated.touch();
        Ok(updated)
    }

    fn patch_ledger(
        entry: &LedgerEntry,
        patch: &MovementPatch,
    ) -> Result<LedgerEntry, CorrectionError> {
        if patch.fee.is_some() || patch.admin_note.is_some() {
            return Err(CorrectionError::Validation(
                "fee and admin_note apply to requests".into(),
            ));
        }
        let mut updated = entry.clone();
        if let Some(raw) = &patch.amount {
            updated.amount = parse_amount(raw, scale_for(entry_asset(entry)))?;
            updated.balance_after = updated
                .entry_type
                .apply(updated.balance_before, updated.amount)
                .ok_or(MoneyError::Overflow)?;
            if updated.balance_after < Decimal::ZERO {
                return Err(CorrectionError::Validation(
                    "amount would leave a negative balance_after".into(),
                ));
            }
        }
        if let Some(raw) = &patch.status {
            updated.status = raw
                .parse::<EntryStatus>()
                .map_err(CorrectionError::Validation)?;
        }
        if let Some(d) = &patch.description {
            updated.description = d.trim().to_string();
        }
        Ok(updated)
    }

    pub async fn edit_movement(
        &self,
        source: MovementSource,
        id: Uuid,
        patch: MovementPatch,
        actor: UserId,
    ) -> Result<MovementView, CorrectionError> {
        if patch.is_empty() {
            return Err(CorrectionError::Validation("empty patch".into()));
        }

        let (target, audit, located) = match self.locate(source, id).await? {
            Located::Ledger(before) => {
                let after = Self::patch_ledger(&before, &patch)?;
                let audit = AuditRecord::new(
                    actor,
                    AuditAction::Edit,
                    source,
                    category_of(before.entry_type),
                    id,
                )
                .with_snapshots(Some(&before), Some(&after));
                (
                    CorrectionTarget::ReplaceLedger(after.clone()),
                    audit,
                    Located::Ledger(after),
                )
            }
            Located::Request(before) => {
                let after = Self::patch_request(&before, &patch)?;
                let audit =
                    AuditRecord::new(actor, AuditAction::Edit, source, before.kind(), id)
                        .with_snapshots(Some(&before), Some(&after));
                (
                    CorrectionTarget::ReplaceRequest {
                        record: after.clone(),
                        read: RequestVersion::of(&before),
                    },
                    audit,
                    Located::Request(after),
                )
            }
        };

        let category = audit.category;
        self.backend
            .commit_correction(CorrectionWrite { target, audit })
            .await?;
        info!(%source, %category, movement_id = %id, actor = %actor, "Movement edited");

        self.view_of(located).await
    }

    pub async fn delete_movement(
        &self,
        source: MovementSource,
        id: Uuid,
        actor: UserId,
    ) -> Result<(), CorrectionError> {
        let (target, audit) = match self.locate(source, id).await? {
            Located::Ledger(before) => {
                let audit = AuditRecord::new(
                    actor,
                    AuditAction::Delete,
                    source,
                    category_of(before.entry_type),
                    id,
                )
                .with_snapshots(Some(&before), None::<&()>);
                (CorrectionTarget::DeleteLedger(id), audit)
            }
            Located::Request(before) => {
                let kind = before.kind();
                let audit = AuditRecord::new(actor, AuditAction::Delete, source, kind, id)
                    .with_snapshots(Some(&before), None::<&()>);
                let read = RequestVersion::of(&before);
                (CorrectionTarget::DeleteRequest { kind, id, read }, audit)
            }
        };

        let category = audit.category;
        self.backend
            .commit_correction(CorrectionWrite { target, audit })
            .await?;
        warn!(%source, %category, movement_id = %id, actor = %actor, "Movement deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::User;
    use crate::ledger::{EntryMetadata, EntryType, Posting, PostingLeg};
    use crate::requests::{RequestService, SubmitRequest};
    use crate::ledger::PostingReceipt;
    use crate::requests::{RequestError, ReviewAction};
    use crate::store::{
        AuditStore, LedgerQuery, LedgerStore, MemoryStore, RequestQuery, RequestStore, Settlement,
        UserStore,
    };
    use async_trait::async_trait;

    async fn setup() -> (CorrectionService, Arc<MemoryStore>, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(User::new("c@x.io", "C").with_balances(Decimal::new(100, 0), Decimal::ZERO))
            .await
            .unwrap();
        (CorrectionService::new(store.clone(), "USD"), store, user)
    }

    async fn withdrawal(store: &Arc<MemoryStore>, user: &User) -> RequestRecord {
        RequestService::new(store.clone(), "USD")
            .submit(
                user.id,
                SubmitRequest::Withdrawal {
                    amount: "50".into(),
                    fee: Some("1".into()),
                    currency: None,
                    destination: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_edit_request_recomputes_net() {
        let (svc, store, user) = setup().await;
        let rec = withdrawal(&store, &user).await;
        let actor = Uuid::new_v4();

        let view = svc
            .edit_movement(
                MovementSource::User,
                rec.id(),
                MovementPatch {
                    amount: Some("60".into()),
                    fee: Some("2.5".into()),
                    ..Default::default()
                },
                actor,
            )
            .await
            .unwrap();
        assert_eq!(view.amount, Decimal::new(60, 0));
        assert_eq!(view.net_amount, Some(Decimal::new(575, 1)));
        assert_eq!(view.user.as_ref().map(|u| u.id), Some(user.id));

        let audit = store.list_audit(5).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].actor, actor);
        assert_eq!(audit[0].action, AuditAction::Edit);
        assert_eq!(audit[0].before["net_amount"], "49");
        assert_eq!(audit[0].after["net_amount"], "57.5");
    }

    #[tokio::test]
    async fn test_invalid_request_patch_writes_nothing() {
        let (svc, store, user) = setup().await;
        let rec = withdrawal(&store, &user).await;
        for patch in [
            MovementPatch { fee: Some("50".into()), ..Default::default() },
            MovementPatch { status: Some("processing".into()), ..Default::default() },
            MovementPatch { description: Some("x".into()), ..Default::default() },
            MovementPatch::default(),
        ] {
            let err = svc
                .edit_movement(MovementSource::User, rec.id(), patch, Uuid::nil())
                .await
                .unwrap_err();
            assert_eq!(err.http_status(), 400);
        }
        assert!(store.list_audit(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_ledger_amount_recomputes_balance_after() {
        let (svc, store, user) = setup().await;
        let receipt = store
            .settle(Posting::new().leg(PostingLeg {
                user_id: user.id,
                asset: Asset::Fiat,
                amount: Decimal::new(30, 0),
                entry_type: EntryType::Withdrawal,
                currency: "USD".into(),
                reference: "W-1".into(),
                description: String::new(),
                metadata: EntryMetadata::None,
            }))
            .await
            .unwrap();
        let id = receipt.entries[0].id;

        let view = svc
            .edit_movement(
                MovementSource::Admin,
                id,
                MovementPatch {
                    amount: Some("20".into()),
                    status: Some("failed".into()),
                    ..Default::default()
                },
                Uuid::nil(),
            )
            .await
            .unwrap();
        assert_eq!(view.balance_after, Some(Decimal::new(80, 0)));
        assert_eq!(view.status, EntryStatus::Failed);

        let stored = store.get_entry(id).await.unwrap().unwrap();
        assert!(stored.is_consistent());
        assert_eq!(stored.status, EntryStatus::Failed);
    }

    #[tokio::test]
    async fn test_delete_routes_by_source() {
        let (svc, store, user) = setup().await;
        let rec = withdrawal(&store, &user).await;

        let wrong = svc
            .delete_movement(MovementSource::Admin, rec.id(), Uuid::nil())
            .await
            .unwrap_err();
        assert_eq!(wrong.http_status(), 404);

        svc.delete_movement(MovementSource::User, rec.id(), Uuid::nil())
            .await
            .unwrap();
        assert!(
            store
                .get_request(RequestKind::Withdrawal, rec.id())
                .await
                .unwrap()
                .is_none()
        );
        let audit = store.list_audit(5).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Delete);
        assert!(audit[0].after.is_null());
        assert_eq!(audit[0].category, RequestKind::Withdrawal);
    }

    /// Approves one request just before every correction reaches the store,
    /// standing in for a second admin working the same row
    struct ApprovesFirst {
        inner: Arc<MemoryStore>,
        kind: RequestKind,
        id: Uuid,
    }

    #[async_trait]
    impl UserStore for ApprovesFirst {
        async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.get_user(id).await
        }

        async fn create_user(&self, user: User) -> Result<User, StoreError> {
            self.inner.create_user(user).await
        }
    }

    #[async_trait]
    impl LedgerStore for ApprovesFirst {
        async fn count_entries(&self, query: &LedgerQuery) -> Result<u64, StoreError> {
            self.inner.count_entries(query).await
        }

        async fn find_entries(
            &self,
            query: &LedgerQuery,
            limit: usize,
        ) -> Result<Vec<LedgerRow>, StoreError> {
            self.inner.find_entries(query, limit).await
        }

        async fn get_entry(&self, id: Uuid) -> Result<Option<LedgerEntry>, StoreError> {
            self.inner.get_entry(id).await
        }

        async fn find_swap_entries(
            &self,
            user_id: Option<UserId>,
        ) -> Result<Vec<LedgerEntry>, StoreError> {
            self.inner.find_swap_entries(user_id).await
        }
    }

    #[async_trait]
    impl RequestStore for ApprovesFirst {
        async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError> {
            self.inner.count_requests(query).await
        }

        async fn find_requests(
            &self,
            query: &RequestQuery,
            limit: usize,
        ) -> Result<Vec<RequestRow>, StoreError> {
            self.inner.find_requests(query, limit).await
        }

        async fn get_request(
            &self,
            kind: RequestKind,
            id: Uuid,
        ) -> Result<Option<RequestRecord>, StoreError> {
            self.inner.get_request(kind, id).await
        }

        async fn insert_request(&self, record: RequestRecord) -> Result<RequestRecord, StoreError> {
            self.inner.insert_request(record).await
        }
    }

    #[async_trait]
    impl AuditStore for ApprovesFirst {
        async fn list_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
            self.inner.list_audit(limit).await
        }
    }

    #[async_trait]
    impl Settlement for ApprovesFirst {
        async fn settle(&self, posting: Posting) -> Result<PostingReceipt, StoreError> {
            self.inner.settle(posting).await
        }

        async fn commit_correction(&self, write: CorrectionWrite) -> Result<(), StoreError> {
            RequestService::new(self.inner.clone(), "USD")
                .review(self.kind, self.id, ReviewAction::Approve, Uuid::nil(), None)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            self.inner.commit_correction(write).await
        }
    }

    #[async_trait]
    impl Backend for ApprovesFirst {
        fn name(&self) -> &'static str {
            "approves-first"
        }

        async fn health_check(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_edit_racing_an_approval_cannot_reopen_it() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user(User::new("r@x.io", "R")).await.unwrap();
        let requests = RequestService::new(store.clone(), "USD");
        let deposit = requests
            .submit(
                user.id,
                SubmitRequest::Deposit {
                    amount: "100".into(),
                    currency: None,
                    method: None,
                    proof_reference: None,
                },
            )
            .await
            .unwrap();

        let racing = Arc::new(ApprovesFirst {
            inner: store.clone(),
            kind: RequestKind::Deposit,
            id: deposit.id(),
        });
        let err = CorrectionService::new(racing, "USD")
            .edit_movement(
                MovementSource::User,
                deposit.id(),
                MovementPatch {
                    admin_note: Some("proof checked".into()),
                    ..Default::default()
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CorrectionError::Conflict(_)), "{:?}", err);
        assert_eq!(err.http_status(), 409);

        let stored = store.get_request(RequestKind::Deposit, deposit.id()).await.unwrap().unwrap();
        assert_eq!(stored.status_str(), "approved");
        let again = requests
            .review(RequestKind::Deposit, deposit.id(), ReviewAction::Approve, Uuid::nil(), None)
            .await
            .unwrap_err();
        assert!(matches!(again, RequestError::InvalidTransition(_)));

        let fresh = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(fresh.fiat_balance, Decimal::new(100, 0));
        assert!(store.list_audit(5).await.unwrap().iter().all(|a| a.action != AuditAction::Edit));
    }
}
