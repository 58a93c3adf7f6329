//! # Payment Repository
//!
//! Payments and their append-only event log.
//!
//! Payment rows are only ever written inside booking transactions (see
//! [`BookingRepository`](super::booking::BookingRepository)): created with
//! the booking, flipped to CANCELLED together with the booking transition.
//! This module provides the row mapping, the in-transaction writers and
//! the read side.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use homestay_core::{Money, Payment, PaymentEvent, PaymentEventKind, PaymentMethod, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, booking_id, order_id, order_name, amount, status, method, \
     external_ref, captured_at, refunded_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct PaymentRecord {
    id: String,
    booking_id: String,
    order_id: String,
    order_name: String,
    amount: i64,
    status: PaymentStatus,
    method: PaymentMethod,
    external_ref: Option<String>,
    captured_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRecord> for Payment {
    fn from(r: PaymentRecord) -> Self {
        Payment {
            id: r.id,
            booking_id: r.booking_id,
            order_id: r.order_id,
            order_name: r.order_name,
            amount: Money::from_won(r.amount),
            status: r.status,
            method: r.method,
            external_ref: r.external_ref,
            captured_at: r.captured_at,
            refunded_at: r.refunded_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentEventRecord {
    id: String,
    payment_id: String,
    kind: PaymentEventKind,
    amount: i64,
    external_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PaymentEventRecord> for PaymentEvent {
    fn from(r: PaymentEventRecord) -> Self {
        PaymentEvent {
            id: r.id,
            payment_id: r.payment_id,
            kind: r.kind,
            amount: Money::from_won(r.amount),
            external_ref: r.external_ref,
            created_at: r.created_at,
        }
    }
}

/// Refund details committed together with a cancel/reject transition.
#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub payment_id: String,
    pub amount: Money,
    pub external_ref: Option<String>,
    pub refunded_at: DateTime<Utc>,
}

// =============================================================================
// In-transaction writers
// =============================================================================

/// Inserts a payment row. Runs inside the caller's transaction.
pub(crate) async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, booking_id, order_id, order_name, amount, status, method,
            external_ref, captured_at, refunded_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.booking_id)
    .bind(&payment.order_id)
    .bind(&payment.order_name)
    .bind(payment.amount.won())
    .bind(payment.status)
    .bind(payment.method)
    .bind(&payment.external_ref)
    .bind(payment.captured_at)
    .bind(payment.refunded_at)
    .bind(payment.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Appends a capture/refund event. Runs inside the caller's transaction.
pub(crate) async fn insert_event(
    conn: &mut SqliteConnection,
    payment_id: &str,
    kind: PaymentEventKind,
    amount: Money,
    external_ref: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let id = Uuid::new_v4().to_string();
    debug!(payment_id = %payment_id, kind = ?kind, amount = %amount, "Appending payment event");

    sqlx::query(
        r#"
        INSERT INTO payment_events (id, payment_id, kind, amount, external_ref, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(id)
    .bind(payment_id)
    .bind(kind)
    .bind(amount.won())
    .bind(external_ref)
    .bind(at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Flips a DONE payment to CANCELLED and appends the refund event.
///
/// ## Errors
/// `Conflict` if the payment is not DONE anymore (refunded by a concurrent
/// writer); the caller's transaction must then roll back.
pub(crate) async fn mark_refunded(conn: &mut SqliteConnection, refund: &RefundRecord) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'CANCELLED', refunded_at = ?1
        WHERE id = ?2 AND status = 'DONE' AND refunded_at IS NULL
        "#,
    )
    .bind(refund.refunded_at)
    .bind(&refund.payment_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("payment", &refund.payment_id));
    }

    insert_event(
        conn,
        &refund.payment_id,
        PaymentEventKind::Refund,
        refund.amount,
        refund.external_ref.as_deref(),
        refund.refunded_at,
    )
    .await
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for payment reads.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets the payment of a booking.
    pub async fn get_by_booking(&self, booking_id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE booking_id = ?1", PAYMENT_COLUMNS);
        let record: Option<PaymentRecord> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Payment::from))
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
        let record: Option<PaymentRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Payment::from))
    }

    /// Lists capture/refund events of a payment, oldest first.
    pub async fn events(&self, payment_id: &str) -> DbResult<Vec<PaymentEvent>> {
        let records: Vec<PaymentEventRecord> = sqlx::query_as(
            r#"
            SELECT id, payment_id, kind, amount, external_ref, created_at
            FROM payment_events
            WHERE payment_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(PaymentEvent::from).collect())
    }
}
