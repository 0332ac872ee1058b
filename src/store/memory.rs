//! In-memory store
//!
//! One `RwLock` guards every collection, so a write guard is the unit of
//! work: postings are staged on copies and only published once every leg
//! and the request transition have succeeded.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AuditStore, Backend, CorrectionTarget, CorrectionWrite, LedgerQuery, LedgerRow, LedgerStore,
    RequestQuery, RequestRow, RequestStore, Settlement, StoreError, UserStore,
};
use crate::account::{BalanceSnapshot, User, UserSummary};
use crate::admin::audit::AuditRecord;
use crate::core_types::UserId;
use crate::ledger::{LedgerEntry, Posting, PostingReceipt};
use crate::requests::{RequestKind, RequestRecord};

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    ledger: Vec<LedgerEntry>,
    requests: HashMap<Uuid, RequestRecord>,
    audit: Vec<AuditRecord>,
}

impl MemoryState {
    fn summary(&self, id: UserId) -> Option<UserSummary> {
        self.users.get(&id).map(User::summary)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    #[cfg(test)]
    fail_reads: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every ledger read fail until reset
    #[cfg(test)]
    pub(crate) fn fail_ledger_reads(&self, fail: bool) {
        self.fail_reads
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_fault(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Database("injected ledger read failure".into()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    #[inline]
    fn check_fault(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.id == user.id || u.email == user.email)
        {
            return Err(StoreError::Conflict(format!("user {} exists", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn count_entries(&self, query: &LedgerQuery) -> Result<u64, StoreError> {
        self.check_fault()?;
        let state = self.state.read().await;
        Ok(state.ledger.iter().filter(|e| query.matches(e)).count() as u64)
    }

    async fn find_entries(
        &self,
        query: &LedgerQuery,
        limit: usize,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        self.check_fault()?;
        let state = self.state.read().await;
        let mut entries: Vec<&LedgerEntry> =
            state.ledger.iter().filter(|e| query.matches(e)).collect();
        entries.sort_by_key(|e| Reverse((e.created_at, e.id)));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| LedgerRow {
                entry: e.clone(),
                user: state.summary(e.user_id),
            })
            .collect())
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<LedgerEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state.ledger.iter().find(|e| e.id == id).cloned())
    }

    async fn find_swap_entries(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.metadata.as_swap().is_some())
            .filter(|e| user_id.is_none_or(|u| u == e.user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.requests.values().filter(|r| query.matches(r)).count() as u64)
    }

    async fn find_requests(
        &self,
        query: &RequestQuery,
        limit: usize,
    ) -> Result<Vec<RequestRow>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<&RequestRecord> = state
            .requests
            .values()
            .filter(|r| query.matches(r))
            .collect();
        records.sort_by_key(|r| Reverse((r.created_at(), r.id())));
        Ok(records
            .into_iter()
            .take(limit)
            .map(|r| {
                let recipient = match r {
                    RequestRecord::Transfer(t) => state.summary(t.recipient_id),
                    _ => None,
                };
                RequestRow {
                    record: r.clone(),
                    user: state.summary(r.user_id()),
                    recipient,
                }
            })
            .collect())
    }

    async fn get_request(
        &self,
        kind: RequestKind,
        id: Uuid,
    ) -> Result<Option<RequestRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .get(&id)
            .filter(|r| r.kind() == kind)
            .cloned())
    }

    async fn insert_request(&self, record: RequestRecord) -> Result<RequestRecord, StoreError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&record.id()) {
            return Err(StoreError::Conflict(format!("request {} exists", record.id())));
        }
        state.requests.insert(record.id(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.audit.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl Settlement for MemoryStore {
    async fn settle(&self, posting: Posting) -> Result<PostingReceipt, StoreError> {
        posting.validate().map_err(StoreError::InvalidPosting)?;

        let mut state = self.state.write().await;
        let now = Utc::now();

        let mut touched: BTreeMap<UserId, User> = BTreeMap::new();
        for id in posting.user_ids() {
            let user = state
                .users
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
            touched.insert(id, user);
        }

        let before: Vec<BalanceSnapshot> = touched.values().map(User::snapshot).collect();

        let mut entries: Vec<LedgerEntry> = Vec::with_capacity(posting.legs.len());
        for leg in &posting.legs {
            let duplicate = state.ledger.iter().any(|e| e.reference == leg.reference)
                || entries.iter().any(|e| e.reference == leg.reference);
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "reference {} already used",
                    leg.reference
                )));
            }
            let user = touched
                .get_mut(&leg.user_id)
                .ok_or_else(|| StoreError::NotFound(format!("user {}", leg.user_id)))?;
            let entry = leg
                .apply_to(user, now)
                .map_err(StoreError::from)?;
            entries.push(entry);
        }

        let updated_request = match &posting.transition {
            Some(t) => {
                let mut record = state
                    .requests
                    .get(&t.id)
                    .filter(|r| r.kind() == t.kind)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("{} {}", t.kind, t.id)))?;
                if !t.from.contains(&record.status_str()) {
                    return Err(StoreError::Conflict(format!(
                        "{} {} is {}",
                        t.kind,
                        t.id,
                        record.status_str()
                    )));
                }
                if record.updated_at() != t.read_at {
                    return Err(StoreError::Conflict(format!(
                        "{} {} changed since it was read",
                        t.kind, t.id
                    )));
                }
                record.set_status(t.to).map_err(StoreError::InvalidPosting)?;
                if t.admin_note.is_some() {
                    record.set_admin_note(t.admin_note.clone());
                }
                record.touch();
                Some(record)
            }
            None => None,
        };

        // publish
        let balances: Vec<BalanceSnapshot> = touched.values().map(User::snapshot).collect();
        let audit = posting.sealed_audit(&before, &balances);
        state.users.extend(touched);
        state.ledger.extend(entries.iter().cloned());
        if let Some(record) = updated_request {
            state.requests.insert(record.id(), record);
        }
        if let Some(audit) = audit {
            state.audit.push(audit);
        }

        Ok(PostingReceipt { entries, balances })
    }

    async fn commit_correction(&self, write: CorrectionWrite) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match write.target {
            CorrectionTarget::ReplaceLedger(entry) => {
                let slot = state
                    .ledger
                    .iter_mut()
                    .find(|e| e.id == entry.id)
                    .ok_or_else(|| StoreError::NotFound(format!("ledger entry {}", entry.id)))?;
                *slot = entry;
            }
            CorrectionTarget::DeleteLedger(id) => {
                let before = state.ledger.len();
                state.ledger.retain(|e| e.id != id);
                if state.ledger.len() == before {
                    return Err(StoreError::NotFound(format!("ledger entry {}", id)));
                }
            }
            CorrectionTarget::ReplaceRequest { record, read } => {
                let what = format!("{} {}", record.kind(), record.id());
                match state.requests.get_mut(&record.id()) {
                    Some(slot) if slot.kind() == record.kind() => {
                        if !read.matches(slot) {
                            return Err(StoreError::Conflict(what));
                        }
                        *slot = record;
                    }
                    _ => return Err(StoreError::NotFound(what)),
                }
            }
            CorrectionTarget::DeleteRequest { kind, id, read } => {
                let what = format!("{} {}", kind, id);
                match state.requests.get(&id) {
                    Some(r) if r.kind() == kind => {
                        if !read.matches(r) {
                            return Err(StoreError::Conflict(what));
                        }
                    }
                    _ => return Err(StoreError::NotFound(what)),
                }
                state.requests.remove(&id);
            }
        }
        state.audit.push(write.audit);
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Asset, MovementSource};
    use crate::admin::audit::AuditAction;
    use crate::ledger::{EntryMetadata, EntryType, PostingLeg, RequestTransition};
    use crate::requests::{DepositRequest, ReviewStatus};
    use crate::store::RequestVersion;
    use rust_decimal::Decimal;

    fn leg(user_id: UserId, asset: Asset, entry_type: EntryType, amount: i64, r: &str) -> PostingLeg {
        PostingLeg {
            user_id,
            asset,
            amount: Decimal::new(amount, 0),
            entry_type,
            currency: "USD".into(),
            reference: r.into(),
            description: String::new(),
            metadata: EntryMetadata::None,
        }
    }

    async fn store_with_user(fiat: i64) -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let user = store
            .create_user(User::new("u@x.io", "U").with_balances(Decimal::new(fiat, 0), Decimal::ZERO))
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn test_settle_applies_all_legs() {
        let (store, user) = store_with_user(100).await;
        let posting = Posting::new()
            .leg(leg(user.id, Asset::Fiat, EntryType::TransferOut, 40, "A-OUT"))
            .leg(leg(user.id, Asset::Secondary, EntryType::TransferIn, 1, "A-IN"));

        let receipt = store.settle(posting).await.unwrap();
        assert_eq!(receipt.entries.len(), 2);
        let snap = receipt.balance_of(user.id).unwrap();
        assert_eq!(snap.fiat, Decimal::new(60, 0));
        assert_eq!(snap.secondary, Decimal::ONE);

        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.fiat_balance, Decimal::new(60, 0));
        assert_eq!(store.count_entries(&LedgerQuery::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_settle_is_all_or_nothing() {
        let (store, user) = store_with_user(100).await;
        // second leg overdraws the secondary balance
        let posting = Posting::new()
            .leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 10, "B-1"))
            .leg(leg(user.id, Asset::Secondary, EntryType::Withdrawal, 1, "B-2"));

        let err = store.settle(posting).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientBalance { asset: Asset::Secondary, .. }
        ));
        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.fiat_balance, Decimal::new(100, 0));
        assert_eq!(store.count_entries(&LedgerQuery::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let (store, user) = store_with_user(100).await;
        store
            .settle(Posting::new().leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 1, "DUP")))
            .await
            .unwrap();
        let err = store
            .settle(Posting::new().leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 1, "DUP")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transition_compare_and_set() {
        let (store, user) = store_with_user(0).await;
        let now = Utc::now();
        let deposit = DepositRequest {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount: Decimal::new(25, 0),
            currency: "USD".into(),
            method: None,
            proof_reference: None,
            status: ReviewStatus::Pending,
            admin_note: None,
            created_at: now,
            updated_at: now,
        };
        store
            .insert_request(RequestRecord::Deposit(deposit.clone()))
            .await
            .unwrap();

        let approve = || {
            Posting::new()
                .leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 25, &format!("DEP-{}", Uuid::new_v4())))
                .transition(RequestTransition {
                    kind: RequestKind::Deposit,
                    id: deposit.id,
                    from: vec!["pending"],
                    to: "approved",
                    admin_note: Some("ok".into()),
                    read_at: deposit.updated_at,
                })
        };

        store.settle(approve()).await.unwrap();
        let err = store.settle(approve()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.fiat_balance, Decimal::new(25, 0));
        let record = store
            .get_request(RequestKind::Deposit, deposit.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status_str(), "approved");
    }

    #[tokio::test]
    async fn test_correction_writes_audit() {
        let (store, user) = store_with_user(10).await;
        let receipt = store
            .settle(Posting::new().leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 5, "C-1")))
            .await
            .unwrap();
        let id = receipt.entries[0].id;

        let audit = AuditRecord::new(
            user.id,
            AuditAction::Delete,
            MovementSource::Admin,
            RequestKind::Deposit,
            id,
        );
        store
            .commit_correction(CorrectionWrite {
                target: CorrectionTarget::DeleteLedger(id),
                audit: audit.clone(),
            })
            .await
            .unwrap();

        assert!(store.get_entry(id).await.unwrap().is_none());
        assert_eq!(store.list_audit(10).await.unwrap(), vec![audit.clone()]);

        let again = store
            .commit_correction(CorrectionWrite {
                target: CorrectionTarget::DeleteLedger(id),
                audit,
            })
            .await;
        assert!(matches!(again, Err(StoreError::NotFound(_))));
        assert_eq!(store.list_audit(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_request_writes_conflict() {
        let (store, user) = store_with_user(0).await;
        let now = Utc::now();
        let stored = store
            .insert_request(RequestRecord::Deposit(DepositRequest {
                id: Uuid::new_v4(),
                user_id: user.id,
                amount: Decimal::new(40, 0),
                currency: "USD".into(),
                method: None,
                proof_reference: None,
                status: ReviewStatus::Pending,
                admin_note: None,
                created_at: now,
                updated_at: now,
            }))
            .await
            .unwrap();
        let read = RequestVersion::of(&stored);

        // someone else edits the row first
        let mut edited = stored.clone();
        edited.set_admin_note(Some("first".into()));
        edited.touch();
        store
            .commit_correction(CorrectionWrite {
                target: CorrectionTarget::ReplaceRequest {
                    record: edited.clone(),
                    read,
                },
                audit: AuditRecord::new(
                    user.id,
                    AuditAction::Edit,
                    MovementSource::User,
                    RequestKind::Deposit,
                    stored.id(),
                ),
            })
            .await
            .unwrap();

        // a write computed from the old read loses
        let mut late = stored.clone();
        late.set_admin_note(Some("second".into()));
        late.touch();
        let err = store
            .commit_correction(CorrectionWrite {
                target: CorrectionTarget::ReplaceRequest { record: late, read },
                audit: AuditRecord::new(
                    user.id,
                    AuditAction::Edit,
                    MovementSource::User,
                    RequestKind::Deposit,
                    stored.id(),
                ),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // so does a review whose legs were built from the old read
        let err = store
            .settle(
                Posting::new()
                    .leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 40, "DEP-STALE"))
                    .transition(RequestTransition {
                        kind: RequestKind::Deposit,
                        id: stored.id(),
                        from: vec!["pending"],
                        to: "approved",
                        admin_note: None,
                        read_at: stored.updated_at(),
                    }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().fiat_balance, Decimal::ZERO);
        assert_eq!(store.list_audit(10).await.unwrap().len(), 1);
        let current = store
            .get_request(RequestKind::Deposit, stored.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current, edited);
    }

    #[tokio::test]
    async fn test_find_entries_newest_first_with_user() {
        let (store, user) = store_with_user(0).await;
        for i in 0..3 {
            store
                .settle(Posting::new().leg(leg(user.id, Asset::Fiat, EntryType::Deposit, 1, &format!("N-{}", i))))
                .await
                .unwrap();
        }
        let rows = store.find_entries(&LedgerQuery::default(), 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].entry.created_at >= rows[1].entry.created_at);
        assert_eq!(rows[0].user.as_ref().map(|u| u.id), Some(user.id));
    }
}
