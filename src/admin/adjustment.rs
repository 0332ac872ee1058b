//! Manual balance adjustments
//!
//! The only admin path that moves a balance. A credit posts a fiat deposit
//! entry and a debit posts a fiat withdrawal entry, each tagged with the
//! acting admin.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{AuditAction, AuditRecord};
use super::correction::{CorrectionError, CorrectionService};
use crate::account::BalanceSnapshot;
use crate::core_types::{Asset, MovementSource, UserId};
use crate::ledger::{EntryMetadata, EntryType, LedgerEntry, Posting, PostingLeg};
use crate::money::{FIAT_SCALE, parse_amount};
use crate::requests::RequestKind;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentRequest {
    pub user_id: UserId,
    pub direction: AdjustmentDirection,
    pub amount: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    pub entry: LedgerEntry,
    pub balance: Option<BalanceSnapshot>,
}

impl CorrectionService {
    pub async fn adjust_balance(
        &self,
        actor: UserId,
        req: AdjustmentRequest,
    ) -> Result<AdjustmentOutcome, CorrectionError> {
        let note = req.note.trim().to_string();
        if note.is_empty() {
            return Err(CorrectionError::Validation("note is required".into()));
        }
        let amount = parse_amount(&req.amount, FIAT_SCALE)?;

        let user = self
            .backend
            .get_user(req.user_id)
            .await?
            .ok_or_else(|| CorrectionError::NotFound(format!("user {}", req.user_id)))?;
        let currency = user
            .currency
            .clone()
            .unwrap_or_else(|| self.default_currency.clone());

        let (entry_type, category) = match req.direction {
            AdjustmentDirection::Credit => (EntryType::Deposit, RequestKind::Deposit),
            AdjustmentDirection::Debit => (EntryType::Withdrawal, RequestKind::Withdrawal),
        };
        let reference = format!("ADJ-{}", ulid::Ulid::new());

        let audit = AuditRecord::new(
            actor,
            AuditAction::Adjust,
            MovementSource::Admin,
            category,
            req.user_id,
        );

        let posting = Posting::new()
            .leg(PostingLeg {
                user_id: req.user_id,
                asset: Asset::Fiat,
                amount,
                entry_type,
                currency,
                reference: reference.clone(),
                description: note.clone(),
                metadata: EntryMetadata::Adjustment { actor, note },
            })
            .audited_balances(audit);

        let receipt = self.backend.settle(posting).await.map_err(|e| match e {
            StoreError::InsufficientBalance { .. } => CorrectionError::Validation(format!(
                "debit of {} exceeds the fiat balance",
                amount
            )),
            other => other.into(),
        })?;

        let balance = receipt.balance_of(req.user_id).cloned();
        let entry = receipt
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| CorrectionError::Persistence("posting returned no entry".into()))?;

        info!(
            user_id = %req.user_id,
            actor = %actor,
            direction = ?req.direction,
            %amount,
            %reference,
            "Balance adjusted"
        );
        Ok(AdjustmentOutcome { entry, balance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::User;
    use crate::ledger::EntryStatus;
    use crate::store::{AuditStore, LedgerStore, LedgerQuery, MemoryStore, UserStore};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn setup() -> (CorrectionService, Arc<MemoryStore>, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(
                User::new("adj@x.io", "Adj")
                    .with_balances(Decimal::new(40, 0), Decimal::ZERO)
                    .with_currency("EUR"),
            )
            .await
            .unwrap();
        (CorrectionService::new(store.clone(), "USD"), store, user)
    }

    fn request(user: &User, direction: AdjustmentDirection, amount: &str) -> AdjustmentRequest {
        AdjustmentRequest {
            user_id: user.id,
            direction,
            amount: amount.into(),
            note: "chargeback reversal".into(),
        }
    }

    #[tokio::test]
    async fn test_credit_posts_entry_and_audit() {
        let (svc, store, user) = setup().await;
        let actor = Uuid::new_v4();

        let out = svc
            .adjust_balance(actor, request(&user, AdjustmentDirection::Credit, "12.50"))
            .await
            .unwrap();
        assert_eq!(out.entry.entry_type, EntryType::Deposit);
        assert_eq!(out.entry.status, EntryStatus::Completed);
        assert_eq!(out.entry.currency, "EUR");
        assert!(out.entry.reference.starts_with("ADJ-"));
        assert_eq!(out.balance.map(|b| b.fiat), Some(Decimal::new(525, 1)));

        let entries = store
            .find_entries(&LedgerQuery::for_types(&[EntryType::Deposit]), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);

        let audit = store.list_audit(5).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Adjust);
        assert_eq!(audit[0].target_id, user.id);
        assert_eq!(audit[0].actor, actor);
        let fiat: Decimal = audit[0].after["fiat"].as_str().unwrap().parse().unwrap();
        assert_eq!(fiat, Decimal::new(525, 1));
    }

    #[tokio::test]
    async fn test_debit_audit_brackets_the_posting() {
        let (svc, store, user) = setup().await;
        svc.adjust_balance(Uuid::nil(), request(&user, AdjustmentDirection::Debit, "15"))
            .await
            .unwrap();

        let audit = store.list_audit(5).await.unwrap();
        let fiat = |v: &serde_json::Value| v["fiat"].as_str().map(|s| s.parse::<Decimal>().unwrap());
        assert_eq!(fiat(&audit[0].before), Some(Decimal::new(40, 0)));
        assert_eq!(fiat(&audit[0].after), Some(Decimal::new(25, 0)));
        assert_eq!(audit[0].after["user_id"], serde_json::json!(user.id));
    }

    #[tokio::test]
    async fn test_user_without_currency_gets_configured_default() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(User::new("nocur@x.io", "N").with_balances(Decimal::ZERO, Decimal::ZERO))
            .await
            .unwrap();
        let svc = CorrectionService::new(store.clone(), "CHF");

        let out = svc
            .adjust_balance(Uuid::nil(), request(&user, AdjustmentDirection::Credit, "3"))
            .await
            .unwrap();
        assert_eq!(out.entry.currency, "CHF");
    }

    #[tokio::test]
    async fn test_debit_cannot_overdraw() {
        let (svc, store, user) = setup().await;
        let err = svc
            .adjust_balance(Uuid::nil(), request(&user, AdjustmentDirection::Debit, "40.01"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);

        let fresh = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(fresh.fiat_balance, Decimal::new(40, 0));
        assert!(store.list_audit(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_missing_note_and_unknown_user() {
        let (svc, _, user) = setup().await;
        let mut req = request(&user, AdjustmentDirection::Credit, "1");
        req.note = "  ".into();
        assert_eq!(
            svc.adjust_balance(Uuid::nil(), req).await.unwrap_err().http_status(),
            400
        );

        let mut req = request(&user, AdjustmentDirection::Credit, "1");
        req.user_id = Uuid::new_v4();
        assert_eq!(
            svc.adjust_balance(Uuid::nil(), req).await.unwrap_err().http_status(),
            404
        );
    }
}
