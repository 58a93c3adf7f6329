//! # Credit Ledger Repository
//!
//! The append-only credit ledger and its atomic per-guest writes.
//!
//! ## Debit Under Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two tabs, one guest, balance ₩100,000, each debits ₩80,000            │
//! │                                                                         │
//! │  Tab A                          Tab B                                  │
//! │  lock(guest) ✓                  lock(guest) … waits                    │
//! │  BEGIN                                                                 │
//! │  key seen? no                                                          │
//! │  SUM = 100,000 ≥ 80,000                                                │
//! │  INSERT -80,000                                                        │
//! │  COMMIT, unlock                 lock(guest) ✓                          │
//! │                                 BEGIN                                  │
//! │                                 SUM = 20,000 < 80,000                  │
//! │                                 → InsufficientBalance                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The balance is never stored; it is always `SUM(amount)` over the
//! guest's rows, read inside the same transaction that appends.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::locks::KeyedLocks;
use homestay_core::{CreditKind, CreditSummary, CreditTransaction, Money, Page, PageRequest};

const CREDIT_COLUMNS: &str =
    "id, guest_id, booking_id, kind, amount, idempotency_key, memo, created_at";

/// Idempotency key of the one reversal allowed for a debit.
pub fn reversal_key(debit_id: &str) -> String {
    format!("reversal:{}", debit_id)
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CreditRecord {
    id: String,
    guest_id: String,
    booking_id: Option<String>,
    kind: CreditKind,
    amount: i64,
    idempotency_key: String,
    memo: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CreditRecord> for CreditTransaction {
    fn from(r: CreditRecord) -> Self {
        CreditTransaction {
            id: r.id,
            guest_id: r.guest_id,
            booking_id: r.booking_id,
            kind: r.kind,
            amount: Money::from_won(r.amount),
            idempotency_key: r.idempotency_key,
            memo: r.memo,
            created_at: r.created_at,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of an idempotent append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new row was written.
    Appended(CreditTransaction),
    /// The key was already used; the original row is returned.
    Replayed(CreditTransaction),
}

impl AppendOutcome {
    pub fn transaction(&self) -> &CreditTransaction {
        match self {
            AppendOutcome::Appended(tx) | AppendOutcome::Replayed(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> CreditTransaction {
        match self {
            AppendOutcome::Appended(tx) | AppendOutcome::Replayed(tx) => tx,
        }
    }
}

/// Result of a debit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied(AppendOutcome),
    /// Nothing written; the balance does not cover the amount.
    InsufficientBalance { available: Money },
}

/// Result of a reversal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversalOutcome {
    Reversed(CreditTransaction),
    /// The debit was reversed earlier; the existing reversal is returned.
    AlreadyReversed(CreditTransaction),
    /// The booking has no debit.
    NoMatchingDebit,
}

/// A debit to append.
#[derive(Debug, Clone)]
pub struct NewDebit<'a> {
    pub guest_id: &'a str,
    pub booking_id: &'a str,
    /// Positive amount to take from the balance.
    pub amount: Money,
    pub idempotency_key: &'a str,
    pub memo: Option<&'a str>,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the credit ledger.
#[derive(Debug, Clone)]
pub struct CreditRepository {
    pool: SqlitePool,
    locks: Arc<KeyedLocks>,
}

impl CreditRepository {
    /// Creates a new CreditRepository sharing `locks` with other handles.
    pub fn new(pool: SqlitePool, locks: Arc<KeyedLocks>) -> Self {
        CreditRepository { pool, locks }
    }

    /// True when both handles serialize on the same lock table.
    pub fn shares_locks_with(&self, other: &CreditRepository) -> bool {
        Arc::ptr_eq(&self.locks, &other.locks)
    }

    /// Current balance: sum of all the guest's entries.
    pub async fn balance(&self, guest_id: &str) -> DbResult<Money> {
        let mut conn = self.pool.acquire().await?;
        sum_balance(&mut *conn, guest_id).await
    }

    /// Appends a debit if the balance covers it.
    ///
    /// ## Atomicity
    /// Under the guest's lock and inside one transaction:
    /// 1. A row with the same idempotency key → `Replayed`
    /// 2. `SUM(amount) < amount` → `InsufficientBalance`, nothing written
    /// 3. Otherwise append `-amount`
    ///
    /// ## Errors
    /// `UniqueViolation` when the key belongs to a different guest,
    /// booking or kind.
    pub async fn debit(&self, debit: NewDebit<'_>) -> DbResult<DebitOutcome> {
        if !debit.amount.is_positive() {
            return Err(DbError::InvalidInput(format!(
                "debit amount must be positive, got {}",
                debit.amount
            )));
        }

        let _guard = self.locks.lock(debit.guest_id).await;
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_by_key(&mut *tx, debit.idempotency_key).await? {
            let same = existing.guest_id == debit.guest_id
                && existing.kind == CreditKind::Debit
                && existing.booking_id.as_deref() == Some(debit.booking_id)
                && existing.amount == -debit.amount;
            if !same {
                return Err(DbError::duplicate("idempotency_key", debit.idempotency_key));
            }
            debug!(key = %debit.idempotency_key, "Debit replayed");
            return Ok(DebitOutcome::Applied(AppendOutcome::Replayed(existing)));
        }

        let available = sum_balance(&mut *tx, debit.guest_id).await?;
        if available < debit.amount {
            debug!(
                guest_id = %debit.guest_id,
                requested = %debit.amount,
                available = %available,
                "Debit refused"
            );
            return Ok(DebitOutcome::InsufficientBalance { available });
        }

        let entry = CreditTransaction {
            id: Uuid::new_v4().to_string(),
            guest_id: debit.guest_id.to_string(),
            booking_id: Some(debit.booking_id.to_string()),
            kind: CreditKind::Debit,
            amount: -debit.amount,
            idempotency_key: debit.idempotency_key.to_string(),
            memo: debit.memo.map(str::to_string),
            created_at: debit.at,
        };
        insert_entry(&mut *tx, &entry).await?;
        tx.commit().await?;

        info!(
            guest_id = %entry.guest_id,
            booking_id = %debit.booking_id,
            amount = %debit.amount,
            "Credit debited"
        );
        Ok(DebitOutcome::Applied(AppendOutcome::Appended(entry)))
    }

    /// Appends the reversal of a booking's debit.
    ///
    /// The reversal's key is derived from the debit id, so at most one
    /// reversal can ever exist per debit.
    pub async fn reverse(
        &self,
        booking_id: &str,
        memo: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<ReversalOutcome> {
        let debit = match self.debit_for_booking(booking_id).await? {
            Some(debit) => debit,
            None => return Ok(ReversalOutcome::NoMatchingDebit),
        };

        let _guard = self.locks.lock(&debit.guest_id).await;
        let key = reversal_key(&debit.id);
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_by_key(&mut *tx, &key).await? {
            debug!(booking_id = %booking_id, "Debit already reversed");
            return Ok(ReversalOutcome::AlreadyReversed(existing));
        }

        let entry = CreditTransaction {
            id: Uuid::new_v4().to_string(),
            guest_id: debit.guest_id.clone(),
            booking_id: Some(booking_id.to_string()),
            kind: CreditKind::Reversal,
            amount: debit.amount.abs(),
            idempotency_key: key,
            memo: memo.map(str::to_string),
            created_at: at,
        };
        insert_entry(&mut *tx, &entry).await?;
        tx.commit().await?;

        info!(
            guest_id = %entry.guest_id,
            booking_id = %booking_id,
            amount = %entry.amount,
            "Credit debit reversed"
        );
        Ok(ReversalOutcome::Reversed(entry))
    }

    /// Appends a top-up (no booking).
    pub async fn grant(
        &self,
        guest_id: &str,
        amount: Money,
        idempotency_key: &str,
        memo: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<AppendOutcome> {
        if !amount.is_positive() {
            return Err(DbError::InvalidInput(format!(
                "top-up amount must be positive, got {}",
                amount
            )));
        }

        let _guard = self.locks.lock(guest_id).await;
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_by_key(&mut *tx, idempotency_key).await? {
            if existing.guest_id != guest_id
                || existing.kind != CreditKind::TopUp
                || existing.amount != amount
            {
                return Err(DbError::duplicate("idempotency_key", idempotency_key));
            }
            return Ok(AppendOutcome::Replayed(existing));
        }

        let entry = CreditTransaction {
            id: Uuid::new_v4().to_string(),
            guest_id: guest_id.to_string(),
            booking_id: None,
            kind: CreditKind::TopUp,
            amount,
            idempotency_key: idempotency_key.to_string(),
            memo: memo.map(str::to_string),
            created_at: at,
        };
        insert_entry(&mut *tx, &entry).await?;
        tx.commit().await?;

        info!(guest_id = %guest_id, amount = %amount, "Credit granted");
        Ok(AppendOutcome::Appended(entry))
    }

    /// Lifetime totals for a guest.
    pub async fn summary(&self, guest_id: &str) -> DbResult<CreditSummary> {
        let (available, earned, used): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(amount), 0),
                COALESCE(SUM(CASE WHEN kind = 'top_up' THEN amount END), 0),
                COALESCE(-SUM(CASE WHEN kind IN ('debit', 'reversal') THEN amount END), 0)
            FROM credit_transactions
            WHERE guest_id = ?1
            "#,
        )
        .bind(guest_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CreditSummary {
            available: Money::from_won(available),
            total_earned: Money::from_won(earned),
            total_used: Money::from_won(used),
        })
    }

    /// Pages a guest's ledger, newest first.
    pub async fn history(&self, guest_id: &str, page: PageRequest) -> DbResult<Page<CreditTransaction>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE guest_id = ?1")
                .bind(guest_id)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {} FROM credit_transactions WHERE guest_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
            CREDIT_COLUMNS
        );
        let records: Vec<CreditRecord> = sqlx::query_as(&sql)
            .bind(guest_id)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(
            records.into_iter().map(CreditTransaction::from).collect(),
            page,
            total,
        ))
    }

    /// The debit recorded for a booking, if any.
    pub async fn debit_for_booking(&self, booking_id: &str) -> DbResult<Option<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM credit_transactions WHERE booking_id = ?1 AND kind = 'debit' \
             ORDER BY rowid ASC LIMIT 1",
            CREDIT_COLUMNS
        );
        let record: Option<CreditRecord> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(CreditTransaction::from))
    }

    /// Every entry tied to a booking (its debit and reversal), oldest first.
    pub async fn list_for_booking(&self, booking_id: &str) -> DbResult<Vec<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM credit_transactions WHERE booking_id = ?1 ORDER BY rowid ASC",
            CREDIT_COLUMNS
        );
        let records: Vec<CreditRecord> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(CreditTransaction::from).collect())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn sum_balance(conn: &mut SqliteConnection, guest_id: &str) -> DbResult<Money> {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM credit_transactions WHERE guest_id = ?1",
    )
    .bind(guest_id)
    .fetch_one(conn)
    .await?;

    Ok(Money::from_won(sum))
}

async fn fetch_by_key(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<CreditTransaction>> {
    let sql = format!(
        "SELECT {} FROM credit_transactions WHERE idempotency_key = ?1",
        CREDIT_COLUMNS
    );
    let record: Option<CreditRecord> = sqlx::query_as(&sql)
        .bind(key)
        .fetch_optional(conn)
        .await?;

    Ok(record.map(CreditTransaction::from))
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &CreditTransaction) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_transactions (
            id, guest_id, booking_id, kind, amount, idempotency_key, memo, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.guest_id)
    .bind(&entry.booking_id)
    .bind(entry.kind)
    .bind(entry.amount.won())
    .bind(&entry.idempotency_key)
    .bind(&entry.memo)
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
