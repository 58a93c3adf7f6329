//! # Credit Ledger
//!
//! Per-guest pre-paid balance on top of the append-only ledger in
//! `homestay-db`. The balance is always derived from the ledger; nothing
//! here caches it.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  debit(guest, amount, booking, key)                                    │
//! │     └── balance < amount → InsufficientCredit (nothing written)        │
//! │     └── key seen before  → original entry, no second append           │
//! │                                                                         │
//! │  reverse(booking)                                                      │
//! │     └── no debit         → NoMatchingDebit                             │
//! │     └── reversed before  → AlreadyReversed                             │
//! │     └── otherwise        → +|debit| under key reversal:<debit id>      │
//! │                                                                         │
//! │  balance(guest) = SUM(amount), read-your-writes                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use homestay_core::{CreditSummary, CreditTransaction, Money, Page, PageRequest};
use homestay_db::{CreditRepository, DbError, DebitOutcome, NewDebit, ReversalOutcome};
use tracing::debug;

use crate::error::{CreditError, CreditResult};

/// Idempotency key of the debit taken for a booking.
pub fn debit_key(booking_id: &str) -> String {
    format!("debit:{}", booking_id)
}

/// Credit ledger operations used by the coordinator.
#[derive(Debug, Clone)]
pub struct CreditLedger {
    repo: CreditRepository,
}

impl CreditLedger {
    pub fn new(repo: CreditRepository) -> Self {
        CreditLedger { repo }
    }

    /// Takes `amount` from the guest's balance for a booking.
    ///
    /// Returns the debit entry (negative amount). A repeated call with the
    /// same key returns the original entry.
    pub async fn debit(
        &self,
        guest_id: &str,
        amount: Money,
        booking_id: &str,
        idempotency_key: &str,
        at: DateTime<Utc>,
    ) -> CreditResult<CreditTransaction> {
        let outcome = self
            .repo
            .debit(NewDebit {
                guest_id,
                booking_id,
                amount,
                idempotency_key,
                memo: Some("booking payment"),
                at,
            })
            .await
            .map_err(|e| key_reuse_or_store(e, idempotency_key))?;

        match outcome {
            DebitOutcome::Applied(applied) => Ok(applied.into_transaction()),
            DebitOutcome::InsufficientBalance { available } => {
                Err(CreditError::InsufficientCredit {
                    requested: amount,
                    available,
                })
            }
        }
    }

    /// Gives back the debit recorded for `booking_id`.
    ///
    /// ## Errors
    /// - `NoMatchingDebit` when the booking never debited credit
    /// - `AlreadyReversed` when the reversal exists already
    pub async fn reverse(
        &self,
        booking_id: &str,
        memo: &str,
        at: DateTime<Utc>,
    ) -> CreditResult<CreditTransaction> {
        match self.repo.reverse(booking_id, Some(memo), at).await? {
            ReversalOutcome::Reversed(tx) => Ok(tx),
            ReversalOutcome::AlreadyReversed(_) => {
                debug!(booking_id = %booking_id, "Reversal requested twice");
                Err(CreditError::AlreadyReversed {
                    booking_id: booking_id.to_string(),
                })
            }
            ReversalOutcome::NoMatchingDebit => Err(CreditError::NoMatchingDebit {
                booking_id: booking_id.to_string(),
            }),
        }
    }

    /// Current balance.
    pub async fn balance(&self, guest_id: &str) -> CreditResult<Money> {
        Ok(self.repo.balance(guest_id).await?)
    }

    /// Adds credit to a guest's balance.
    pub async fn grant(
        &self,
        guest_id: &str,
        amount: Money,
        idempotency_key: &str,
        memo: Option<&str>,
        at: DateTime<Utc>,
    ) -> CreditResult<CreditTransaction> {
        self.repo
            .grant(guest_id, amount, idempotency_key, memo, at)
            .await
            .map(|outcome| outcome.into_transaction())
            .map_err(|e| key_reuse_or_store(e, idempotency_key))
    }

    pub async fn summary(&self, guest_id: &str) -> CreditResult<CreditSummary> {
        Ok(self.repo.summary(guest_id).await?)
    }

    pub async fn history(
        &self,
        guest_id: &str,
        page: PageRequest,
    ) -> CreditResult<Page<CreditTransaction>> {
        Ok(self.repo.history(guest_id, page).await?)
    }

    /// The debit and reversal (if any) of a booking.
    pub async fn entries_for_booking(&self, booking_id: &str) -> CreditResult<Vec<CreditTransaction>> {
        Ok(self.repo.list_for_booking(booking_id).await?)
    }
}

fn key_reuse_or_store(err: DbError, key: &str) -> CreditError {
    match err {
        DbError::UniqueViolation { .. } => CreditError::KeyReused(key.to_string()),
        other => CreditError::Store(other),
    }
}
