//! # Booking Repository
//!
//! Database operations for bookings and their experience items.
//!
//! ## Booking Lifecycle in the Store
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Booking Writes                                    │
//! │                                                                         │
//! │  1. CREATE (end of a successful saga)                                  │
//! │     └── insert_with_payment()                                          │
//! │         ├── bookings row      (status PENDING, version 1)              │
//! │         ├── experience items                                           │
//! │         ├── payments row      (DONE)                                   │
//! │         └── capture event     (when money was captured)                │
//! │         all in ONE transaction                                         │
//! │                                                                         │
//! │  2. TRANSITION                                                         │
//! │     └── commit_transition(next, expected_version, refund)              │
//! │         ├── UPDATE ... WHERE id = ? AND version = ?   (CAS)            │
//! │         └── refund: payment DONE → CANCELLED + refund event            │
//! │         all in ONE transaction                                         │
//! │                                                                         │
//! │  3. FLAG                                                               │
//! │     └── flag_needs_attention() after a failed compensation             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::payment::{self, RefundRecord};
use homestay_core::{
    Booking, BookingState, BookingStatus, ExperienceItem, GuestContact, Money, Page, PageRequest,
    Payment, PaymentEventKind, PaymentStatus, PriceBreakdown,
};

const BOOKING_COLUMNS: &str = "id, property_id, host_id, guest_id, check_in, check_out, guests, \
     nightly_rate, number_of_nights, accommodation_total, experiences_total, service_fee, \
     credit_applied, total_amount, status, rejection_reason, cancellation_reason, \
     guest_name, guest_phone, guest_email, special_requests, needs_attention, checked_in_at, \
     created_at, confirmed_at, rejected_at, cancelled_at, completed_at, version";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BookingRecord {
    id: String,
    property_id: String,
    host_id: String,
    guest_id: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: i64,
    nightly_rate: i64,
    number_of_nights: i64,
    accommodation_total: i64,
    experiences_total: i64,
    service_fee: i64,
    credit_applied: i64,
    total_amount: i64,
    status: BookingStatus,
    rejection_reason: Option<String>,
    cancellation_reason: Option<String>,
    guest_name: String,
    guest_phone: String,
    guest_email: String,
    special_requests: Option<String>,
    needs_attention: Option<String>,
    checked_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl BookingRecord {
    fn into_booking(self, experience_items: Vec<ExperienceItem>) -> DbResult<Booking> {
        let state = BookingState::from_parts(
            self.status,
            self.rejection_reason,
            self.cancellation_reason,
        )
        .ok_or_else(|| DbError::corrupt("booking", &self.id, "reason columns disagree with status"))?;

        let guests = u32::try_from(self.guests)
            .map_err(|_| DbError::corrupt("booking", &self.id, "guest count out of range"))?;

        Ok(Booking {
            id: self.id,
            property_id: self.property_id,
            host_id: self.host_id,
            guest_id: self.guest_id,
            check_in: self.check_in,
            check_out: self.check_out,
            guests,
            nightly_rate: Money::from_won(self.nightly_rate),
            number_of_nights: self.number_of_nights,
            price: PriceBreakdown {
                accommodation_total: Money::from_won(self.accommodation_total),
                experiences_total: Money::from_won(self.experiences_total),
                service_fee: Money::from_won(self.service_fee),
                credit_applied: Money::from_won(self.credit_applied),
                total_amount: Money::from_won(self.total_amount),
            },
            experience_items,
            state,
            guest_contact: GuestContact {
                name: self.guest_name,
                phone: self.guest_phone,
                email: self.guest_email,
            },
            special_requests: self.special_requests,
            needs_attention: self.needs_attention,
            checked_in_at: self.checked_in_at,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            rejected_at: self.rejected_at,
            cancelled_at: self.cancelled_at,
            completed_at: self.completed_at,
            version: self.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExperienceItemRecord {
    experience_id: String,
    date: NaiveDate,
    time: String,
    quantity: i64,
    unit_price: i64,
    total_price: i64,
}

impl From<ExperienceItemRecord> for ExperienceItem {
    fn from(r: ExperienceItemRecord) -> Self {
        ExperienceItem {
            experience_id: r.experience_id,
            date: r.date,
            time: r.time,
            quantity: r.quantity,
            unit_price: Money::from_won(r.unit_price),
            total_price: Money::from_won(r.total_price),
        }
    }
}

/// Which owner column a listing filters on.
#[derive(Debug, Clone, Copy)]
enum Owner {
    Guest,
    Host,
}

impl Owner {
    fn column(self) -> &'static str {
        match self {
            Owner::Guest => "guest_id",
            Owner::Host => "host_id",
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for booking database operations.
#[derive(Debug, Clone)]
pub struct BookingRepository {
    pool: SqlitePool,
}

impl BookingRepository {
    /// Creates a new BookingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BookingRepository { pool }
    }

    /// Gets a booking by ID, experience items included.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = ?1", BOOKING_COLUMNS);
        let record: Option<BookingRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) => Ok(Some(self.hydrate(record).await?)),
            None => Ok(None),
        }
    }

    /// Finds the booking created by a client request key.
    pub async fn find_by_request_key(&self, request_key: &str) -> DbResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE request_key = ?1", BOOKING_COLUMNS);
        let record: Option<BookingRecord> = sqlx::query_as(&sql)
            .bind(request_key)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) => Ok(Some(self.hydrate(record).await?)),
            None => Ok(None),
        }
    }

    /// Id of an active (PENDING or CONFIRMED) booking holding any night of
    /// `[check_in, check_out)` on the property.
    pub async fn find_overlapping(
        &self,
        property_id: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> DbResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        find_overlapping_in(&mut *conn, property_id, check_in, check_out, None).await
    }

    /// Inserts a booking with its experience items and payment.
    ///
    /// ## Transaction
    /// Booking, items, payment and (for a captured payment) the capture
    /// event are written in one transaction: either the whole booking
    /// exists or none of it does. The overlap check runs inside the same
    /// transaction, after the row is written, so a replayed insert still
    /// fails on its request key first.
    ///
    /// ## Errors
    /// - `UniqueViolation { field: "request_key" }` if a booking for this
    ///   request key already exists
    /// - `DatesTaken` if another active booking holds any of the nights
    pub async fn insert_with_payment(
        &self,
        booking: &Booking,
        request_key: &str,
        payment: &Payment,
    ) -> DbResult<()> {
        debug!(
            booking_id = %booking.id,
            payment_id = %payment.id,
            total = %booking.price.total_amount,
            "Inserting booking with payment"
        );

        let mut tx = self.pool.begin().await?;

        insert_booking_row(&mut *tx, booking, request_key)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { field, .. } if field.contains("request_key") => {
                    DbError::duplicate("request_key", request_key)
                }
                other => other,
            })?;

        if let Some(holder) = find_overlapping_in(
            &mut *tx,
            &booking.property_id,
            booking.check_in,
            booking.check_out,
            Some(&booking.id),
        )
        .await?
        {
            warn!(
                booking_id = %booking.id,
                property_id = %booking.property_id,
                holder = %holder,
                "Dates already booked, rolling back insert"
            );
            return Err(DbError::DatesTaken {
                property_id: booking.property_id.clone(),
                booking_id: holder,
            });
        }

        for (position, item) in booking.experience_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO booking_experience_items (
                    booking_id, position, experience_id, date, time,
                    quantity, unit_price, total_price
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&booking.id)
            .bind(position as i64)
            .bind(&item.experience_id)
            .bind(item.date)
            .bind(&item.time)
            .bind(item.quantity)
            .bind(item.unit_price.won())
            .bind(item.total_price.won())
            .execute(&mut *tx)
            .await?;
        }

        payment::insert_payment(&mut *tx, payment).await?;

        if payment.status == PaymentStatus::Done && payment.external_ref.is_some() {
            payment::insert_event(
                &mut *tx,
                &payment.id,
                PaymentEventKind::Capture,
                payment.amount,
                payment.external_ref.as_deref(),
                payment.captured_at.unwrap_or(payment.created_at),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Commits a lifecycle change computed by the state machine.
    ///
    /// ## Compare-and-Set
    /// The update only applies if the stored `version` still equals
    /// `expected_version`; otherwise nothing is written and `Conflict` is
    /// returned. When `refund` is given, the payment is moved DONE →
    /// CANCELLED and the refund event appended in the same transaction, so
    /// booking status and payment status always change together.
    ///
    /// Returns `next` with its new version.
    pub async fn commit_transition(
        &self,
        next: &Booking,
        expected_version: i64,
        refund: Option<&RefundRecord>,
    ) -> DbResult<Booking> {
        debug!(
            booking_id = %next.id,
            status = %next.status(),
            expected_version,
            refund = refund.is_some(),
            "Committing booking transition"
        );

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = ?1,
                rejection_reason = ?2,
                cancellation_reason = ?3,
                confirmed_at = ?4,
                rejected_at = ?5,
                cancelled_at = ?6,
                completed_at = ?7,
                checked_in_at = ?8,
                needs_attention = ?9,
                version = version + 1
            WHERE id = ?10 AND version = ?11
            "#,
        )
        .bind(next.status())
        .bind(next.rejection_reason())
        .bind(next.cancellation_reason())
        .bind(next.confirmed_at)
        .bind(next.rejected_at)
        .bind(next.cancelled_at)
        .bind(next.completed_at)
        .bind(next.checked_in_at)
        .bind(&next.needs_attention)
        .bind(&next.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(booking_id = %next.id, expected_version, "Booking version moved; transition not applied");
            return Err(DbError::conflict("booking", &next.id));
        }

        if let Some(refund) = refund {
            payment::mark_refunded(&mut *tx, refund).await?;
        }

        tx.commit().await?;

        let mut committed = next.clone();
        committed.version = expected_version + 1;
        Ok(committed)
    }

    /// Marks a booking as needing manual reconciliation.
    ///
    /// Leaves status untouched; bumps the version.
    pub async fn flag_needs_attention(&self, id: &str, note: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET needs_attention = ?1, version = version + 1 WHERE id = ?2",
        )
        .bind(note)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("booking", id));
        }
        Ok(())
    }

    /// Lists a guest's bookings, newest first.
    pub async fn list_by_guest(
        &self,
        guest_id: &str,
        status: Option<BookingStatus>,
        page: PageRequest,
    ) -> DbResult<Page<Booking>> {
        self.list(Owner::Guest, guest_id, status, page).await
    }

    /// Lists the bookings on a host's properties, newest first.
    pub async fn list_by_host(
        &self,
        host_id: &str,
        status: Option<BookingStatus>,
        page: PageRequest,
    ) -> DbResult<Page<Booking>> {
        self.list(Owner::Host, host_id, status, page).await
    }

    async fn list(
        &self,
        owner: Owner,
        owner_id: &str,
        status: Option<BookingStatus>,
        page: PageRequest,
    ) -> DbResult<Page<Booking>> {
        let filter = format!("{} = ?1 AND (?2 IS NULL OR status = ?2)", owner.column());

        let count_sql = format!("SELECT COUNT(*) FROM bookings WHERE {}", filter);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(owner_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM bookings WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            BOOKING_COLUMNS, filter
        );
        let records: Vec<BookingRecord> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(status)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            items.push(self.hydrate(record).await?);
        }

        Ok(Page::new(items, page, total))
    }

    async fn hydrate(&self, record: BookingRecord) -> DbResult<Booking> {
        let items: Vec<ExperienceItemRecord> = sqlx::query_as(
            r#"
            SELECT experience_id, date, time, quantity, unit_price, total_price
            FROM booking_experience_items
            WHERE booking_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(&record.id)
        .fetch_all(&self.pool)
        .await?;

        record.into_booking(items.into_iter().map(ExperienceItem::from).collect())
    }
}

/// Stays are half-open: a check-out day may be the next check-in day.
async fn find_overlapping_in(
    conn: &mut SqliteConnection,
    property_id: &str,
    check_in: NaiveDate,
    check_out: NaiveDate,
    exclude_id: Option<&str>,
) -> DbResult<Option<String>> {
    let holder: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM bookings
        WHERE property_id = ?1
          AND status IN ('PENDING', 'CONFIRMED')
          AND check_in < ?3
          AND ?2 < check_out
          AND (?4 IS NULL OR id <> ?4)
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(property_id)
    .bind(check_in)
    .bind(check_out)
    .bind(exclude_id)
    .fetch_optional(conn)
    .await?;

    Ok(holder)
}

async fn insert_booking_row(
    conn: &mut SqliteConnection,
    booking: &Booking,
    request_key: &str,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bookings (
            id, request_key, property_id, host_id, guest_id, check_in, check_out, guests,
            nightly_rate, number_of_nights, accommodation_total, experiences_total,
            service_fee, credit_applied, total_amount, status,
            rejection_reason, cancellation_reason,
            guest_name, guest_phone, guest_email, special_requests, needs_attention,
            checked_in_at, created_at, confirmed_at, rejected_at, cancelled_at, completed_at,
            version
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16,
            ?17, ?18,
            ?19, ?20, ?21, ?22, ?23,
            ?24, ?25, ?26, ?27, ?28, ?29,
            ?30
        )
        "#,
    )
    .bind(&booking.id)
    .bind(request_key)
    .bind(&booking.property_id)
    .bind(&booking.host_id)
    .bind(&booking.guest_id)
    .bind(booking.check_in)
    .bind(booking.check_out)
    .bind(booking.guests as i64)
    .bind(booking.nightly_rate.won())
    .bind(booking.number_of_nights)
    .bind(booking.price.accommodation_total.won())
    .bind(booking.price.experiences_total.won())
    .bind(booking.price.service_fee.won())
    .bind(booking.price.credit_applied.won())
    .bind(booking.price.total_amount.won())
    .bind(booking.status())
    .bind(booking.rejection_reason())
    .bind(booking.cancellation_reason())
    .bind(&booking.guest_contact.name)
    .bind(&booking.guest_contact.phone)
    .bind(&booking.guest_contact.email)
    .bind(&booking.special_requests)
    .bind(&booking.needs_attention)
    .bind(booking.checked_in_at)
    .bind(booking.created_at)
    .bind(booking.confirmed_at)
    .bind(booking.rejected_at)
    .bind(booking.cancelled_at)
    .bind(booking.completed_at)
    .bind(booking.version)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;
    use homestay_core::{PaymentMethod, PaymentStatus};

    pub(crate) fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, d, h, 0, 0).unwrap()
    }

    pub(crate) fn sample_booking(id: &str, guest: &str) -> Booking {
        Booking {
            id: id.to_string(),
            property_id: "prop-1".into(),
            host_id: "host-1".into(),
            guest_id: guest.to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 11, 22).unwrap(),
            guests: 2,
            nightly_rate: Money::from_won(100_000),
            number_of_nights: 2,
            price: PriceBreakdown {
                accommodation_total: Money::from_won(200_000),
                experiences_total: Money::from_won(30_000),
                service_fee: Money::from_won(23_000),
                credit_applied: Money::zero(),
                total_amount: Money::from_won(253_000),
            },
            experience_items: vec![ExperienceItem {
                experience_id: "kayak".into(),
                date: NaiveDate::from_ymd_opt(2026, 11, 21).unwrap(),
                time: "10:00".into(),
                quantity: 1,
                unit_price: Money::from_won(30_000),
                total_price: Money::from_won(30_000),
            }],
            state: BookingState::Pending,
            guest_contact: GuestContact {
                name: "Lee".into(),
                phone: "010-1111-2222".into(),
                email: "lee@example.com".into(),
            },
            special_requests: Some("late arrival".into()),
            needs_attention: None,
            checked_in_at: None,
            created_at: at(1, 9),
            confirmed_at: None,
            rejected_at: None,
            cancelled_at: None,
            completed_at: None,
            version: 1,
        }
    }

    pub(crate) fn sample_payment(booking: &Booking) -> Payment {
        Payment {
            id: format!("pay-{}", booking.id),
            booking_id: booking.id.clone(),
            order_id: format!("ORD-{}", booking.id.to_uppercase()),
            order_name: "Stay".into(),
            amount: booking.price.total_amount,
            status: PaymentStatus::Done,
            method: PaymentMethod::Card,
            external_ref: Some("ext-1".into()),
            captured_at: Some(at(1, 9)),
            refunded_at: None,
            created_at: at(1, 9),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let booking = sample_booking("b-1", "guest-1");
        let payment = sample_payment(&booking);

        db.bookings().insert_with_payment(&booking, "req-1", &payment).await.unwrap();

        let loaded = db.bookings().get_by_id("b-1").await.unwrap().unwrap();
        assert_eq!(loaded, booking);

        let by_key = db.bookings().find_by_request_key("req-1").await.unwrap().unwrap();
        assert_eq!(by_key.id, "b-1");

        let stored_payment = db.payments().get_by_booking("b-1").await.unwrap().unwrap();
        assert_eq!(stored_payment, payment);

        let events = db.payments().events(&payment.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PaymentEventKind::Capture);
    }

    #[tokio::test]
    async fn test_duplicate_request_key_writes_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = sample_booking("b-1", "guest-1");
        db.bookings()
            .insert_with_payment(&first, "req-1", &sample_payment(&first))
            .await
            .unwrap();

        let second = sample_booking("b-2", "guest-1");
        let err = db
            .bookings()
            .insert_with_payment(&second, "req-1", &sample_payment(&second))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "request_key"));
        assert!(db.bookings().get_by_id("b-2").await.unwrap().is_none());
        assert!(db.payments().get_by_booking("b-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_stay_on_same_property_is_refused() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = sample_booking("b-1", "guest-1");
        db.bookings()
            .insert_with_payment(&first, "req-1", &sample_payment(&first))
            .await
            .unwrap();

        // 21st to 23rd shares the night of the 21st
        let mut overlapping = sample_booking("b-2", "guest-2");
        overlapping.check_in = NaiveDate::from_ymd_opt(2026, 11, 21).unwrap();
        overlapping.check_out = NaiveDate::from_ymd_opt(2026, 11, 23).unwrap();
        let err = db
            .bookings()
            .insert_with_payment(&overlapping, "req-2", &sample_payment(&overlapping))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DatesTaken { ref booking_id, .. } if booking_id == "b-1"));
        assert!(db.bookings().get_by_id("b-2").await.unwrap().is_none());
        assert!(db.payments().get_by_booking("b-2").await.unwrap().is_none());

        // Back-to-back stays and other properties are fine
        let mut next_stay = sample_booking("b-3", "guest-2");
        next_stay.check_in = NaiveDate::from_ymd_opt(2026, 11, 22).unwrap();
        next_stay.check_out = NaiveDate::from_ymd_opt(2026, 11, 24).unwrap();
        db.bookings()
            .insert_with_payment(&next_stay, "req-3", &sample_payment(&next_stay))
            .await
            .unwrap();

        let mut elsewhere = sample_booking("b-4", "guest-2");
        elsewhere.property_id = "prop-2".into();
        db.bookings()
            .insert_with_payment(&elsewhere, "req-4", &sample_payment(&elsewhere))
            .await
            .unwrap();

        // A cancelled stay frees its nights
        let mut cancelled = first.clone();
        cancelled.state = BookingState::Cancelled { reason: "plans changed".into() };
        cancelled.cancelled_at = Some(at(2, 9));
        db.bookings().commit_transition(&cancelled, 1, None).await.unwrap();
        assert_eq!(
            db.bookings()
                .find_overlapping("prop-1", first.check_in, first.check_out)
                .await
                .unwrap(),
            None
        );
        let rebooked = sample_booking("b-5", "guest-2");
        db.bookings()
            .insert_with_payment(&rebooked, "req-5", &sample_payment(&rebooked))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_commit_transition_is_compare_and_set() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let booking = sample_booking("b-1", "guest-1");
        db.bookings()
            .insert_with_payment(&booking, "req-1", &sample_payment(&booking))
            .await
            .unwrap();

        let mut confirmed = booking.clone();
        confirmed.state = BookingState::Confirmed;
        confirmed.confirmed_at = Some(at(2, 9));

        let committed = db.bookings().commit_transition(&confirmed, 1, None).await.unwrap();
        assert_eq!(committed.version, 2);

        // A writer still holding version 1 loses
        let mut cancelled = booking.clone();
        cancelled.state = BookingState::Cancelled { reason: "x".into() };
        let err = db.bookings().commit_transition(&cancelled, 1, None).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let stored = db.bookings().get_by_id("b-1").await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Confirmed);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_refund_committed_with_transition() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let booking = sample_booking("b-1", "guest-1");
        let payment = sample_payment(&booking);
        db.bookings().insert_with_payment(&booking, "req-1", &payment).await.unwrap();

        let mut cancelled = booking.clone();
        cancelled.state = BookingState::Cancelled { reason: "plans changed".into() };
        cancelled.cancelled_at = Some(at(3, 9));
        let refund = RefundRecord {
            payment_id: payment.id.clone(),
            amount: payment.amount,
            external_ref: Some("refund-1".into()),
            refunded_at: at(3, 9),
        };

        db.bookings().commit_transition(&cancelled, 1, Some(&refund)).await.unwrap();

        let stored = db.payments().get_by_booking("b-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Cancelled);
        assert_eq!(stored.refunded_at, Some(at(3, 9)));
        assert_eq!(db.payments().events(&payment.id).await.unwrap().len(), 2);

        // Refunding again is a conflict and rolls back the booking update too
        let mut again = cancelled.clone();
        again.version = 2;
        let err = db.bookings().commit_transition(&again, 2, Some(&refund)).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
        assert_eq!(db.bookings().get_by_id("b-1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_listings_filter_and_page() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for i in 0..3 {
            let mut b = sample_booking(&format!("b-{}", i), "guest-1");
            b.property_id = format!("prop-{}", i);
            b.created_at = at(1, 9 + i);
            db.bookings()
                .insert_with_payment(&b, &format!("req-{}", i), &sample_payment(&b))
                .await
                .unwrap();
        }
        let mut other = sample_booking("b-x", "guest-2");
        other.property_id = "prop-x".into();
        db.bookings()
            .insert_with_payment(&other, "req-x", &sample_payment(&other))
            .await
            .unwrap();

        let page = db
            .bookings()
            .list_by_guest("guest-1", None, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items[0].id, "b-2");

        let pending = db
            .bookings()
            .list_by_host("host-1", Some(BookingStatus::Pending), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(pending.total, 4);

        let confirmed = db
            .bookings()
            .list_by_host("host-1", Some(BookingStatus::Confirmed), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(confirmed.total, 0);
    }

    #[tokio::test]
    async fn test_flag_needs_attention() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let booking = sample_booking("b-1", "guest-1");
        db.bookings()
            .insert_with_payment(&booking, "req-1", &sample_payment(&booking))
            .await
            .unwrap();

        db.bookings().flag_needs_attention("b-1", "refund failed").await.unwrap();
        let stored = db.bookings().get_by_id("b-1").await.unwrap().unwrap();
        assert_eq!(stored.needs_attention.as_deref(), Some("refund failed"));
        assert_eq!(stored.version, 2);

        assert!(db.bookings().flag_needs_attention("nope", "x").await.is_err());
    }
}
