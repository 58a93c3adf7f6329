//! # Reconciliation Log Repository
//!
//! Append-only record of compensations that could not be completed
//! automatically (a refund or credit reversal that kept failing). Each
//! entry names the booking and the step so an operator can finish it by
//! hand.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::error::DbResult;

/// One logged reconciliation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ReconciliationEntry {
    pub id: String,
    pub booking_id: String,
    /// Which compensation failed (`credit_reversal`, `payment_refund`, ...).
    pub step: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for the reconciliation log.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
}

impl ReconciliationRepository {
    /// Creates a new ReconciliationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReconciliationRepository { pool }
    }

    /// Appends an entry.
    pub async fn append(
        &self,
        booking_id: &str,
        step: &str,
        detail: &str,
        at: DateTime<Utc>,
    ) -> DbResult<ReconciliationEntry> {
        let entry = ReconciliationEntry {
            id: Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            step: step.to_string(),
            detail: detail.to_string(),
            created_at: at,
        };

        warn!(
            booking_id = %booking_id,
            step = %step,
            detail = %detail,
            "Reconciliation required"
        );

        sqlx::query(
            r#"
            INSERT INTO reconciliation_log (id, booking_id, step, detail, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.booking_id)
        .bind(&entry.step)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Entries for a booking, oldest first.
    pub async fn list_for_booking(&self, booking_id: &str) -> DbResult<Vec<ReconciliationEntry>> {
        let entries = sqlx::query_as(
            r#"
            SELECT id, booking_id, step, detail, created_at
            FROM reconciliation_log
            WHERE booking_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// The most recent entries across all bookings.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<ReconciliationEntry>> {
        let entries = sqlx::query_as(
            r#"
            SELECT id, booking_id, step, detail, created_at
            FROM reconciliation_log
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_append_and_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let log = db.reconciliation();
        let t0 = Utc.with_ymd_and_hms(2026, 11, 1, 9, 0, 0).unwrap();

        log.append("b-1", "payment_refund", "gateway timeout", t0).await.unwrap();
        log.append("b-2", "credit_reversal", "store busy", t0 + chrono::Duration::minutes(1))
            .await
            .unwrap();

        let for_b1 = log.list_for_booking("b-1").await.unwrap();
        assert_eq!(for_b1.len(), 1);
        assert_eq!(for_b1[0].step, "payment_refund");

        let recent = log.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].booking_id, "b-2");

        let result = sqlx::query("UPDATE reconciliation_log SET detail = 'x'")
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
