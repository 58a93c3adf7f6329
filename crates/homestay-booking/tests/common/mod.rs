//! Shared setup for the coordinator scenario tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use homestay_booking::{
    BookingCoordinator, CreateBookingRequest, FixedClock, InMemoryAvailability,
    MockPaymentGateway, RecordingNotifier, RetryPolicy,
};
use homestay_core::{Actor, GuestContact, Money, PaymentMethod};
use homestay_db::{Database, DbConfig};
use std::sync::Arc;
use std::time::Duration;

pub const GUEST: &str = "guest-1";
pub const HOST: &str = "host-1";

pub struct Harness {
    pub coordinator: BookingCoordinator,
    pub gateway: Arc<MockPaymentGateway>,
    pub availability: Arc<InMemoryAvailability>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
}

/// 2026-11-`day` at `hour`:00 UTC.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, day, hour, 0, 0).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, day).unwrap()
}

pub fn guest() -> Actor {
    Actor::guest(GUEST)
}

pub fn host() -> Actor {
    Actor::host(HOST)
}

pub fn admin() -> Actor {
    Actor::admin("admin-1")
}

/// Short timeouts so stalled steps fail fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        step_timeout: Duration::from_millis(200),
    }
}

/// Coordinator on an in-memory store, clock at 2026-11-01 09:00.
pub async fn harness() -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let gateway = Arc::new(MockPaymentGateway::new());
    let availability = Arc::new(InMemoryAvailability::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(FixedClock::new(at(1, 9)));

    let coordinator = BookingCoordinator::new(
        db,
        gateway.clone(),
        availability.clone(),
        notifier.clone(),
    )
    .with_retry(fast_retry())
    .with_clock(clock.clone());

    Harness {
        coordinator,
        gateway,
        availability,
        notifier,
        clock,
    }
}

/// Two nights at ₩100,000 on prop-1, 2026-11-20 to 2026-11-22, card.
pub fn request(key: &str) -> CreateBookingRequest {
    CreateBookingRequest {
        request_key: key.to_string(),
        property_id: "prop-1".to_string(),
        host_id: HOST.to_string(),
        check_in: date(20),
        check_out: date(22),
        guests: 2,
        nightly_rate: Money::from_won(100_000),
        experiences: vec![],
        requested_credit: None,
        payment_method: PaymentMethod::Card,
        guest_contact: GuestContact {
            name: "Kim Minji".to_string(),
            phone: "010-1234-5678".to_string(),
            email: "minji@example.com".to_string(),
        },
        special_requests: None,
    }
}

pub fn with_credit(mut req: CreateBookingRequest, won: i64) -> CreateBookingRequest {
    req.requested_credit = Some(Money::from_won(won));
    req
}

impl Harness {
    pub async fn grant(&self, guest_id: &str, won: i64) {
        self.coordinator
            .grant_credit(
                &admin(),
                guest_id,
                Money::from_won(won),
                &format!("grant:{}:{}", guest_id, won),
                Some("test top-up"),
            )
            .await
            .unwrap();
    }

    /// Makes every credit reversal insert fail inside the store.
    pub async fn break_credit_reversals(&self) {
        sqlx::query(
            "CREATE TRIGGER fail_credit_reversals BEFORE INSERT ON credit_transactions \
             WHEN NEW.kind = 'reversal' \
             BEGIN SELECT RAISE(ABORT, 'credit ledger offline'); END",
        )
        .execute(self.coordinator.database().pool())
        .await
        .unwrap();
    }

    pub async fn restore_credit_reversals(&self) {
        sqlx::query("DROP TRIGGER fail_credit_reversals")
            .execute(self.coordinator.database().pool())
            .await
            .unwrap();
    }

    pub async fn balance(&self, guest_id: &str) -> i64 {
        self.coordinator
            .credit_summary(&admin(), guest_id)
            .await
            .unwrap()
            .available
            .won()
    }
}
