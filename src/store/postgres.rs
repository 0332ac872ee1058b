//! PostgreSQL store
//!
//! Postings run in one transaction: touched user rows are locked
//! `FOR UPDATE` in id order, every leg is applied against the locked rows,
//! and the request transition is a conditional `UPDATE ... WHERE status =
//! ANY(..) AND updated_at = ..`. Any failure drops the transaction and rolls
//! everything back. Admin edits of request rows are conditional the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    AuditStore, Backend, CorrectionTarget, CorrectionWrite, LedgerQuery, LedgerRow, LedgerStore,
    RequestQuery, RequestRow, RequestStore, RequestVersion, Settlement, StoreError, UserStore,
};
use crate::account::{BalanceSnapshot, User, UserSummary};
use crate::admin::audit::AuditRecord;
use crate::core_types::UserId;
use crate::ledger::{EntryMetadata, LedgerEntry, Posting, PostingReceipt};
use crate::requests::{
    DepositRequest, RequestKind, RequestRecord, TransferRequest, WithdrawalRequest,
};

fn sql_limit(limit: usize) -> Result<i64, StoreError> {
    i64::try_from(limit).map_err(|_| StoreError::InvalidQuery(format!("limit {} out of range", limit)))
}

const USER_COLUMNS: &str =
    "id, email, full_name, fiat_balance, secondary_balance, currency, created_at, updated_at";

const LEDGER_SELECT: &str = r#"
    SELECT l.id, l.user_id, l.amount, l.entry_type, l.status, l.currency,
           l.balance_before, l.balance_after, l.reference, l.description,
           l.metadata, l.created_at,
           u.email AS user_email, u.full_name AS user_name
    FROM ledger_entries l
    LEFT JOIN users u ON u.id = l.user_id
"#;

const LEDGER_FILTER: &str = r#"
    WHERE (cardinality($1::text[]) = 0 OR l.entry_type = ANY($1))
      AND ($2::text[] IS NULL OR l.status = ANY($2))
      AND ($3::uuid IS NULL OR l.user_id = $3)
"#;

const REQUEST_FILTER: &str = r#"
    WHERE ($1::text[] IS NULL OR r.status = ANY($1))
      AND ($2::uuid IS NULL OR r.user_id = $2)
"#;

fn request_table(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Deposit => "deposit_requests",
        RequestKind::Withdrawal => "withdrawal_requests",
        RequestKind::Transfer => "transfer_requests",
    }
}

fn corrupt(column: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", column, e))
}

fn decode_user(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        fiat_balance: row.try_get("fiat_balance")?,
        secondary_balance: row.try_get("secondary_balance")?,
        currency: row.try_get("currency")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Joined user columns under the given prefix (`user` or `recipient`)
fn decode_summary(row: &PgRow, id: UserId, prefix: &str) -> Result<Option<UserSummary>, StoreError> {
    let email: Option<String> = row.try_get(format!("{}_email", prefix).as_str())?;
    let name: Option<String> = row.try_get(format!("{}_name", prefix).as_str())?;
    Ok(email.map(|email| UserSummary {
        id,
        email,
        full_name: name.unwrap_or_default(),
    }))
}

fn decode_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let entry_type: String = row.try_get("entry_type")?;
    let status: String = row.try_get("status")?;
    let metadata: Json<EntryMetadata> = row.try_get("metadata")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        entry_type: entry_type.parse().map_err(|e| corrupt("entry_type", e))?,
        status: status.parse().map_err(|e| corrupt("status", e))?,
        currency: row.try_get("currency")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        reference: row.try_get("reference")?,
        description: row.try_get("description")?,
        metadata: metadata.0,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_request(kind: RequestKind, row: &PgRow) -> Result<RequestRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let id: Uuid = row.try_get("id")?;
    let user_id: UserId = row.try_get("user_id")?;
    let amount: Decimal = row.try_get("amount")?;
    let currency: String = row.try_get("currency")?;
    let admin_note: Option<String> = row.try_get("admin_note")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let record = match kind {
        RequestKind::Deposit => RequestRecord::Deposit(DepositRequest {
            id,
            user_id,
            amount,
            currency,
            method: row.try_get("method")?,
            proof_reference: row.try_get("proof_reference")?,
            status: status.parse().map_err(|e| corrupt("status", e))?,
            admin_note,
            created_at,
            updated_at,
        }),
        RequestKind::Withdrawal => RequestRecord::Withdrawal(WithdrawalRequest {
            id,
            user_id,
            amount,
            fee: row.try_get("fee")?,
            net_amount: row.try_get("net_amount")?,
            currency,
            destination: row.try_get("destination")?,
            status: status.parse().map_err(|e| corrupt("status", e))?,
            admin_note,
            created_at,
            updated_at,
        }),
        RequestKind::Transfer => RequestRecord::Transfer(TransferRequest {
            id,
            user_id,
            recipient_id: row.try_get("recipient_id")?,
            amount,
            fee: row.try_get("fee")?,
            total_amount: row.try_get("total_amount")?,
            currency,
            note: row.try_get("note")?,
            status: status.parse().map_err(|e| corrupt("status", e))?,
            admin_note,
            created_at,
            updated_at,
        }),
    };
    Ok(record)
}

fn decode_audit(row: &PgRow) -> Result<AuditRecord, StoreError> {
    let action: String = row.try_get("action")?;
    let source: String = row.try_get("source")?;
    let category: String = row.try_get("category")?;
    let before: Json<serde_json::Value> = row.try_get("before")?;
    let after: Json<serde_json::Value> = row.try_get("after")?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        actor: row.try_get("actor")?,
        action: action.parse().map_err(|e| corrupt("action", e))?,
        source: source.parse().map_err(|e| corrupt("source", e))?,
        category: category.parse().map_err(|e| corrupt("category", e))?,
        target_id: row.try_get("target_id")?,
        before: before.0,
        after: after.0,
        created_at: row.try_get("created_at")?,
    })
}

fn ledger_binds(query: &LedgerQuery) -> (Vec<String>, Option<Vec<String>>) {
    let types = query
        .entry_types
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();
    let statuses = query
        .statuses
        .as_ref()
        .map(|s| s.iter().map(|st| st.as_str().to_string()).collect());
    (types, statuses)
}

fn request_binds(query: &RequestQuery) -> Option<Vec<String>> {
    query
        .statuses
        .as_ref()
        .map(|s| s.iter().map(|st| st.to_string()).collect())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries
                (id, user_id, amount, entry_type, status, currency, balance_before,
                 balance_after, reference, description, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.entry_type.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.currency)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(&entry.reference)
        .bind(&entry.description)
        .bind(Json(&entry.metadata))
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_audit(
        tx: &mut Transaction<'_, Postgres>,
        audit: &AuditRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_log
                (id, actor, action, source, category, target_id, before, after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(audit.id)
        .bind(audit.actor)
        .bind(audit.action.as_str())
        .bind(audit.source.as_str())
        .bind(audit.category.as_str())
        .bind(audit.target_id)
        .bind(Json(&audit.before))
        .bind(Json(&audit.after))
        .bind(audit.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Write every column of a request row if it still matches `read`
    async fn update_request(
        tx: &mut Transaction<'_, Postgres>,
        record: &RequestRecord,
        read: &RequestVersion,
    ) -> Result<u64, StoreError> {
        let result = match record {
            RequestRecord::Deposit(r) => {
                sqlx::query(
                    r#"
                    UPDATE deposit_requests
                    SET amount = $2, currency = $3, method = $4, proof_reference = $5,
                        status = $6, admin_note = $7, updated_at = $8
                    WHERE id = $1 AND updated_at = $9 AND status = $10
                    "#,
                )
                .bind(r.id)
                .bind(r.amount)
                .bind(&r.currency)
                .bind(&r.method)
                .bind(&r.proof_reference)
                .bind(r.status.as_str())
                .bind(&r.admin_note)
                .bind(r.updated_at)
                .bind(read.updated_at)
                .bind(read.status)
                .execute(&mut **tx)
                .await?
            }
            RequestRecord::Withdrawal(r) => {
                sqlx::query(
                    r#"
                    UPDATE withdrawal_requests
                    SET amount = $2, fee = $3, net_amount = $4, currency = $5,
                        destination = $6, status = $7, admin_note = $8, updated_at = $9
                    WHERE id = $1 AND updated_at = $10 AND status = $11
                    "#,
                )
                .bind(r.id)
                .bind(r.amount)
                .bind(r.fee)
                .bind(r.net_amount)
                .bind(&r.currency)
                .bind(&r.destination)
                .bind(r.status.as_str())
                .bind(&r.admin_note)
                .bind(r.updated_at)
                .bind(read.updated_at)
                .bind(read.status)
                .execute(&mut **tx)
                .await?
            }
            RequestRecord::Transfer(r) => {
                sqlx::query(
                    r#"
                    UPDATE transfer_requests
                    SET amount = $2, fee = $3, total_amount = $4, currency = $5,
                        note = $6, status = $7, admin_note = $8, updated_at = $9
                    WHERE id = $1 AND updated_at = $10 AND status = $11
                    "#,
                )
                .bind(r.id)
                .bind(r.amount)
                .bind(r.fee)
                .bind(r.total_amount)
                .bind(&r.currency)
                .bind(&r.note)
                .bind(r.status.as_str())
                .bind(&r.admin_note)
                .bind(r.updated_at)
                .bind(read.updated_at)
                .bind(read.status)
                .execute(&mut **tx)
                .await?
            }
        };
        Ok(result.rows_affected())
    }
}

impl PgStore {
    /// Error for a conditional request write that matched no row
    async fn stale_or_missing(
        tx: &mut Transaction<'_, Postgres>,
        kind: RequestKind,
        id: Uuid,
    ) -> Result<StoreError, StoreError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = $1", request_table(kind));
        let exists = sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await?;
        let what = format!("{} {}", kind, id);
        Ok(match exists {
            Some(_) => StoreError::Conflict(what),
            None => StoreError::NotFound(what),
        })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_user).transpose()
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, full_name, fiat_balance, secondary_balance, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.fiat_balance)
        .bind(user.secondary_balance)
        .bind(&user.currency)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn count_entries(&self, query: &LedgerQuery) -> Result<u64, StoreError> {
        let (types, statuses) = ledger_binds(query);
        let sql = format!(
            "SELECT COUNT(*) AS n FROM ledger_entries l {}",
            LEDGER_FILTER
        );
        let row = sqlx::query(&sql)
            .bind(types)
            .bind(statuses)
            .bind(query.user_id)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn find_entries(
        &self,
        query: &LedgerQuery,
        limit: usize,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        let (types, statuses) = ledger_binds(query);
        let sql = format!(
            "{} {} ORDER BY l.created_at DESC, l.id DESC LIMIT $4",
            LEDGER_SELECT, LEDGER_FILTER
        );
        let rows = sqlx::query(&sql)
            .bind(types)
            .bind(statuses)
            .bind(query.user_id)
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let entry = decode_entry(row)?;
                let user = decode_summary(row, entry.user_id, "user")?;
                Ok(LedgerRow { entry, user })
            })
            .collect()
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<LedgerEntry>, StoreError> {
        let sql = format!("{} WHERE l.id = $1", LEDGER_SELECT);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_entry).transpose()
    }

    async fn find_swap_entries(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "{} WHERE l.metadata->>'kind' = 'swap' AND ($1::uuid IS NULL OR l.user_id = $1) \
             ORDER BY l.created_at",
            LEDGER_SELECT
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(decode_entry).collect()
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn count_requests(&self, query: &RequestQuery) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} r {}",
            request_table(query.kind),
            REQUEST_FILTER
        );
        let row = sqlx::query(&sql)
            .bind(request_binds(query))
            .bind(query.user_id)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn find_requests(
        &self,
        query: &RequestQuery,
        limit: usize,
    ) -> Result<Vec<RequestRow>, StoreError> {
        let (recipient_cols, recipient_join) = match query.kind {
            RequestKind::Transfer => (
                ", rc.email AS recipient_email, rc.full_name AS recipient_name",
                "LEFT JOIN users rc ON rc.id = r.recipient_id",
            ),
            _ => ("", ""),
        };
        let sql = format!(
            "SELECT r.*, u.email AS user_email, u.full_name AS user_name{} \
             FROM {} r LEFT JOIN users u ON u.id = r.user_id {} {} \
             ORDER BY r.created_at DESC, r.id DESC LIMIT $3",
            recipient_cols,
            request_table(query.kind),
            recipient_join,
            REQUEST_FILTER
        );
        let rows = sqlx::query(&sql)
            .bind(request_binds(query))
            .bind(query.user_id)
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let record = decode_request(query.kind, row)?;
                let user = decode_summary(row, record.user_id(), "user")?;
                let recipient = match &record {
                    RequestRecord::Transfer(t) => decode_summary(row, t.recipient_id, "recipient")?,
                    _ => None,
                };
                Ok(RequestRow {
                    record,
                    user,
                    recipient,
                })
            })
            .collect()
    }

    async fn get_request(
        &self,
        kind: RequestKind,
        id: Uuid,
    ) -> Result<Option<RequestRecord>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", request_table(kind));
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| decode_request(kind, &r)).transpose()
    }

    async fn insert_request(&self, record: RequestRecord) -> Result<RequestRecord, StoreError> {
        match &record {
            RequestRecord::Deposit(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO deposit_requests
                        (id, user_id, amount, currency, method, proof_reference, status,
                         admin_note, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(r.id)
                .bind(r.user_id)
                .bind(r.amount)
                .bind(&r.currency)
                .bind(&r.method)
                .bind(&r.proof_reference)
                .bind(r.status.as_str())
                .bind(&r.admin_note)
                .bind(r.created_at)
                .bind(r.updated_at)
                .execute(&self.pool)
                .await?;
            }
            RequestRecord::Withdrawal(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO withdrawal_requests
                        (id, user_id, amount, fee, net_amount, currency, destination, status,
                         admin_note, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(r.id)
                .bind(r.user_id)
                .bind(r.amount)
                .bind(r.fee)
                .bind(r.net_amount)
                .bind(&r.currency)
                .bind(&r.destination)
                .bind(r.status.as_str())
                .bind(&r.admin_note)
                .bind(r.created_at)
                .bind(r.updated_at)
                .execute(&self.pool)
                .await?;
            }
            RequestRecord::Transfer(r) => {
                sqlx::query(
                    r#"
                    INSERT INTO transfer_requests
                        (id, user_id, recipient_id, amount, fee, total_amount, currency, note,
                         status, admin_note, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(r.id)
                .bind(r.user_id)
                .bind(r.recipient_id)
                .bind(r.amount)
                .bind(r.fee)
                .bind(r.total_amount)
                .bind(&r.currency)
                .bind(&r.note)
                .bind(r.status.as_str())
                .bind(&r.admin_note)
                .bind(r.created_at)
                .bind(r.updated_at)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(record)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM admin_audit_log ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(sql_limit(limit)?)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_audit).collect()
    }
}

#[async_trait]
impl Settlement for PgStore {
    async fn settle(&self, posting: Posting) -> Result<PostingReceipt, StoreError> {
        posting.validate().map_err(StoreError::InvalidPosting)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // 1. Lock every touched user in id order
        let lock_sql = format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS);
        let mut touched: BTreeMap<UserId, User> = BTreeMap::new();
        for id in posting.user_ids() {
            let row = sqlx::query(&lock_sql)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
            touched.insert(id, decode_user(&row)?);
        }

        let before: Vec<BalanceSnapshot> = touched.values().map(User::snapshot).collect();

        // 2. Apply legs against the locked rows
        let mut entries = Vec::with_capacity(posting.legs.len());
        for leg in &posting.legs {
            let user = touched
                .get_mut(&leg.user_id)
                .ok_or_else(|| StoreError::NotFound(format!("user {}", leg.user_id)))?;
            let entry = leg
                .apply_to(user, now)
                .map_err(StoreError::from)?;
            Self::insert_entry(&mut tx, &entry).await?;
            entries.push(entry);
        }

        // 3. Persist balances
        for user in touched.values() {
            sqlx::query(
                "UPDATE users SET fiat_balance = $1, secondary_balance = $2, updated_at = $3 \
                 WHERE id = $4",
            )
            .bind(user.fiat_balance)
            .bind(user.secondary_balance)
            .bind(user.updated_at)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        }

        // 4. Request status compare-and-set
        if let Some(t) = &posting.transition {
            let table = request_table(t.kind);
            let sql = format!(
                "UPDATE {} SET status = $1, admin_note = COALESCE($2, admin_note), \
                 updated_at = GREATEST($3, updated_at + INTERVAL '1 microsecond') \
                 WHERE id = $4 AND status = ANY($5) AND updated_at = $6",
                table
            );
            let from: Vec<String> = t.from.iter().map(|s| s.to_string()).collect();
            let updated = sqlx::query(&sql)
                .bind(t.to)
                .bind(&t.admin_note)
                .bind(now)
                .bind(t.id)
                .bind(from)
                .bind(t.read_at)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if updated == 0 {
                let exists = sqlx::query(&format!("SELECT status FROM {} WHERE id = $1", table))
                    .bind(t.id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Err(match exists {
                    None => StoreError::NotFound(format!("{} {}", t.kind, t.id)),
                    Some(row) => {
                        let status: String = row.try_get("status")?;
                        StoreError::Conflict(format!(
                            "{} {} is {} or changed since it was read",
                            t.kind, t.id, status
                        ))
                    }
                });
            }
        }

        let balances: Vec<BalanceSnapshot> = touched.values().map(User::snapshot).collect();
        if let Some(audit) = posting.sealed_audit(&before, &balances) {
            Self::insert_audit(&mut tx, &audit).await?;
        }

        tx.commit().await?;

        Ok(PostingReceipt { entries, balances })
    }

    async fn commit_correction(&self, write: CorrectionWrite) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        match &write.target {
            CorrectionTarget::ReplaceLedger(e) => {
                let n = sqlx::query(
                    r#"
                    UPDATE ledger_entries
                    SET amount = $2, status = $3, balance_after = $4, description = $5,
                        metadata = $6
                    WHERE id = $1
                    "#,
                )
                .bind(e.id)
                .bind(e.amount)
                .bind(e.status.as_str())
                .bind(e.balance_after)
                .bind(&e.description)
                .bind(Json(&e.metadata))
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if n == 0 {
                    return Err(StoreError::NotFound(format!("ledger entry {}", e.id)));
                }
            }
            CorrectionTarget::DeleteLedger(id) => {
                let n = sqlx::query("DELETE FROM ledger_entries WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if n == 0 {
                    return Err(StoreError::NotFound(format!("ledger entry {}", id)));
                }
            }
            CorrectionTarget::ReplaceRequest { record, read } => {
                if Self::update_request(&mut tx, record, read).await? == 0 {
                    return Err(
                        Self::stale_or_missing(&mut tx, record.kind(), record.id()).await?,
                    );
                }
            }
            CorrectionTarget::DeleteRequest { kind, id, read } => {
                let sql = format!(
                    "DELETE FROM {} WHERE id = $1 AND updated_at = $2 AND status = $3",
                    request_table(*kind)
                );
                let n = sqlx::query(&sql)
                    .bind(id)
                    .bind(read.updated_at)
                    .bind(read.status)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if n == 0 {
                    return Err(Self::stale_or_missing(&mut tx, *kind, *id).await?);
                }
            }
        }

        Self::insert_audit(&mut tx, &write.audit).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
