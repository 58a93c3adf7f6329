//! # Booking/Payment Coordinator
//!
//! Orchestrates booking creation and every lifecycle transition across the
//! credit ledger, the payment gateway and the Ledger Store.
//!
//! ## Create Booking (forward saga)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock(request_key) ── booking exists for key? ──► return it (replay)   │
//! │  lock(property_id)                                                     │
//! │       │                                                                 │
//! │  1. availability ── no / error after retries ──► Unavailable           │
//! │     active booking overlaps the nights       ──► Unavailable           │
//! │  2. price (credit balance read only if credit was requested)           │
//! │  3. credit debit     [saga: CreditDebit]    ──► compensate, fail       │
//! │  4. payment capture  [saga: PaymentCapture] ──► compensate, fail       │
//! │  5. insert booking + payment (+ capture event) in ONE transaction,     │
//! │     overlap re-checked inside it                                       │
//! │       └── ok → saga complete, booking PENDING, payment DONE            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transitions (reverse flow)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock(booking_id)                                                      │
//! │    plan_transition(booking, action, actor, now, payment.status)        │
//! │      ├── AlreadyApplied → booking unchanged                            │
//! │      └── Apply(plan)                                                    │
//! │            refund?  gateway.refund   ── fails → PaymentFailed,         │
//! │                                          booking untouched             │
//! │            reverse? ledger.reverse   ── fails → CompensationFailed,    │
//! │                                          needs_attention set           │
//! │            commit status + payment CANCELLED (version CAS)             │
//! │              └── version moved → ConflictingUpdate, retried once       │
//! │            notify (failure only logged)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Visible booking status changes only after the money has moved. A guest
//! is never told "cancelled" while still charged.

use chrono::{DateTime, NaiveDate, Utc};
use homestay_core::state_machine::{apply_transition, plan_transition, record_check_in};
use homestay_core::validation::{
    validate_contact, validate_guest_count, validate_id, validate_idempotency_key,
    validate_non_negative_amount, validate_positive_amount, validate_rating, validate_time_slot,
};
use homestay_core::{
    calculate_price, number_of_nights, Actor, Booking, BookingAction, BookingState, BookingStatus,
    CheckIn, CreditSummary, CreditTransaction, ExperienceSelection, FeeRate, GuestContact, Money,
    Page, PageRequest, Payment, PaymentEvent, PaymentMethod, PaymentStatus, PricingInput, Review,
    Role, Transition, ValidationError,
};
use homestay_db::{
    BookingRepository, Database, DbError, KeyedLocks, PaymentRepository, ReconciliationEntry,
    ReconciliationRepository, RefundRecord, ReviewRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::clock::{Clock, SystemClock};
use crate::config::BookingConfig;
use crate::credit::{debit_key, CreditLedger};
use crate::error::{BookingError, BookingResult, CreditError, GatewayError};
use crate::gateway::{capture_token, refund_token, PaymentGateway, RefundReceipt};
use crate::notify::Notifier;
use crate::retry::{millis, RetryPolicy, StepError};
use crate::saga::{Saga, SagaStep};

/// Longest accepted special-requests text, in characters.
const MAX_SPECIAL_REQUESTS_LENGTH: usize = 1000;

/// Longest accepted review comment, in characters.
const MAX_COMMENT_LENGTH: usize = 2000;

/// Largest reconciliation page an admin can ask for.
const MAX_RECONCILIATION_ENTRIES: u32 = 500;

// =============================================================================
// Requests and Views
// =============================================================================

/// Everything a guest submits to book a stay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    /// Client-supplied key; a retried request with the same key returns
    /// the booking of the first one.
    pub request_key: String,

    pub property_id: String,

    /// Host of the property, resolved by the caller.
    pub host_id: String,

    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,

    /// Nightly rate from the property listing.
    pub nightly_rate: Money,

    #[serde(default)]
    pub experiences: Vec<ExperienceSelection>,

    /// Credit the guest wants to use. `None` uses none.
    pub requested_credit: Option<Money>,

    /// How the remainder is paid. Ignored when credit covers everything.
    pub payment_method: PaymentMethod,

    pub guest_contact: GuestContact,

    pub special_requests: Option<String>,
}

/// Read-only booking view with its money trail.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub payment: Payment,
    pub payment_events: Vec<PaymentEvent>,
    /// Credit debit and reversal of this booking.
    pub credit_entries: Vec<CreditTransaction>,
    /// Guest's credit totals; only shown to the guest and admins.
    pub guest_credit: Option<CreditSummary>,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Runs the booking saga and the lifecycle transitions.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct BookingCoordinator {
    db: Database,
    bookings: BookingRepository,
    payments: PaymentRepository,
    reviews: ReviewRepository,
    reconciliation: ReconciliationRepository,
    credits: CreditLedger,
    gateway: Arc<dyn PaymentGateway>,
    availability: Arc<dyn AvailabilityChecker>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    fee_rate: FeeRate,
    /// Single writer per booking id.
    booking_locks: KeyedLocks,
    /// Single saga per request key.
    request_locks: KeyedLocks,
    /// Single saga per property, so two guests never pay for the same night.
    property_locks: KeyedLocks,
}

impl BookingCoordinator {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        availability: Arc<dyn AvailabilityChecker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        BookingCoordinator {
            bookings: db.bookings(),
            payments: db.payments(),
            reviews: db.reviews(),
            reconciliation: db.reconciliation(),
            credits: CreditLedger::new(db.credits()),
            db,
            gateway,
            availability,
            notifier,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            fee_rate: FeeRate::default(),
            booking_locks: KeyedLocks::new(),
            request_locks: KeyedLocks::new(),
            property_locks: KeyedLocks::new(),
        }
    }

    /// Applies fee rate and retry settings.
    pub fn with_config(mut self, config: &BookingConfig) -> Self {
        self.fee_rate = config.service_fee_rate();
        self.retry = RetryPolicy::from(&config.retry);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Create Booking
    // =========================================================================

    /// Books a stay: availability, pricing, credit debit, capture, commit.
    ///
    /// ## Errors
    /// - `Validation` / `Forbidden` before anything happens
    /// - `Unavailable` if the dates are taken or availability is unknown
    /// - `InsufficientCredit` if the balance does not cover the request
    /// - `CreditFailed` / `PaymentFailed` after compensation
    /// - `CompensationFailed` if undoing a step failed too
    pub async fn create_booking(
        &self,
        actor: &Actor,
        req: CreateBookingRequest,
    ) -> BookingResult<Booking> {
        if actor.role != Role::Guest {
            return Err(forbidden(actor, "create"));
        }
        let nights = validate_request(&req)?;

        let _request_guard = self.request_locks.lock(&req.request_key).await;

        if let Some(existing) = self.bookings.find_by_request_key(&req.request_key).await? {
            return replay(existing, actor, &req.request_key);
        }

        let _property_guard = self.property_locks.lock(&req.property_id).await;

        let now = self.clock.now();
        info!(
            guest_id = %actor.id,
            property_id = %req.property_id,
            check_in = %req.check_in,
            check_out = %req.check_out,
            "Creating booking"
        );

        // Step 1: availability, failing closed
        let available = self
            .retry
            .run(
                "availability",
                || {
                    self.availability
                        .check_available(&req.property_id, req.check_in, req.check_out)
                },
                always_retry,
            )
            .await;
        match available {
            Ok(true) => {}
            Ok(false) => {
                info!(property_id = %req.property_id, "Dates not available");
                return Err(unavailable(&req));
            }
            Err(e) => {
                warn!(property_id = %req.property_id, error = %e, "Availability unknown, refusing booking");
                return Err(unavailable(&req));
            }
        }
        if let Some(holder) = self
            .bookings
            .find_overlapping(&req.property_id, req.check_in, req.check_out)
            .await?
        {
            info!(property_id = %req.property_id, holder = %holder, "Nights held by another booking");
            return Err(unavailable(&req));
        }

        // Step 2: price
        let credit_balance = match req.requested_credit {
            Some(requested) if requested.is_positive() => self.credits.balance(&actor.id).await?,
            _ => Money::zero(),
        };
        let quote = calculate_price(&PricingInput {
            nightly_rate: req.nightly_rate,
            number_of_nights: nights,
            experiences: &req.experiences,
            credit_balance,
            requested_credit: req.requested_credit,
            service_fee_rate: self.fee_rate,
        })?;
        let price = quote.breakdown;
        if price.total_amount.is_positive() && req.payment_method == PaymentMethod::CreditOnly {
            return Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("credit does not cover the total; {} remains to be paid", price.total_amount),
            }
            .into());
        }
        debug!(
            accommodation = %price.accommodation_total,
            experiences = %price.experiences_total,
            fee = %price.service_fee,
            credit = %price.credit_applied,
            total = %price.total_amount,
            "Booking priced"
        );

        let booking_id = Uuid::new_v4().to_string();
        let payment_id = Uuid::new_v4().to_string();
        let mut saga = Saga::new(booking_id.clone());

        // Step 3: credit debit
        if price.credit_applied.is_positive() {
            let amount = price.credit_applied;
            let key = debit_key(&booking_id);
            saga.record(SagaStep::CreditDebit {
                guest_id: actor.id.clone(),
                amount,
            });
            let debited = self
                .retry
                .run(
                    "credit_debit",
                    || self.credits.debit(&actor.id, amount, &booking_id, &key, now),
                    CreditError::is_retryable,
                )
                .await;
            match debited {
                Ok(tx) => info!(booking_id = %booking_id, amount = %tx.amount, "Credit debited"),
                Err(e) => {
                    let err = e.into_error(|d| CreditError::Timeout(millis(d)));
                    return self.abort(saga, err.into(), now).await;
                }
            }
        }

        // Step 4: capture
        let (method, external_ref, captured_at) = if price.total_amount.is_positive() {
            let amount = price.total_amount;
            let method = req.payment_method;
            let token = capture_token(&payment_id);
            let step = saga.record(SagaStep::PaymentCapture {
                payment_id: payment_id.clone(),
                amount,
                external_ref: None,
            });
            let captured = self
                .retry
                .run(
                    "payment_capture",
                    || self.gateway.capture(&payment_id, amount, method, &token),
                    GatewayError::is_retryable,
                )
                .await;
            match captured {
                Ok(receipt) => {
                    info!(
                        booking_id = %booking_id,
                        payment_id = %payment_id,
                        amount = %amount,
                        external_ref = %receipt.external_ref,
                        "Payment captured"
                    );
                    saga.set_external_ref(step, &receipt.external_ref);
                    (method, Some(receipt.external_ref), Some(now))
                }
                Err(e) => {
                    let err = e.into_error(|d| GatewayError::Timeout(millis(d)));
                    return self.abort(saga, err.into(), now).await;
                }
            }
        } else {
            debug!(booking_id = %booking_id, "Credit covers the total, no capture");
            (PaymentMethod::CreditOnly, None, None)
        };

        // Step 5: commit
        let booking = Booking {
            id: booking_id.clone(),
            property_id: req.property_id.clone(),
            host_id: req.host_id.clone(),
            guest_id: actor.id.clone(),
            check_in: req.check_in,
            check_out: req.check_out,
            guests: req.guests,
            nightly_rate: req.nightly_rate,
            number_of_nights: nights,
            price,
            experience_items: quote.items,
            state: BookingState::Pending,
            guest_contact: req.guest_contact.clone(),
            special_requests: req.special_requests.clone(),
            needs_attention: None,
            checked_in_at: None,
            created_at: now,
            confirmed_at: None,
            rejected_at: None,
            cancelled_at: None,
            completed_at: None,
            version: 1,
        };
        let payment = Payment {
            id: payment_id.clone(),
            booking_id: booking_id.clone(),
            order_id: order_id(&booking_id, now),
            order_name: format!("Stay at {} ({} nights)", req.property_id, nights),
            amount: price.total_amount,
            status: PaymentStatus::Done,
            method,
            external_ref,
            captured_at,
            refunded_at: None,
            created_at: now,
        };

        let committed = self
            .retry
            .run(
                "booking_commit",
                || self.bookings.insert_with_payment(&booking, &req.request_key, &payment),
                DbError::is_transient,
            )
            .await;

        match committed {
            Ok(()) => {
                saga.complete();
                info!(
                    booking_id = %booking.id,
                    guest_id = %booking.guest_id,
                    total = %booking.price.total_amount,
                    "Booking created"
                );
                Ok(booking)
            }
            Err(StepError::Failed(DbError::UniqueViolation { field, .. })) if field == "request_key" => {
                // Another run for the same key got there first, or an
                // earlier attempt of this one committed before timing out.
                match self.bookings.find_by_request_key(&req.request_key).await {
                    Ok(Some(existing)) if existing.id == booking.id => {
                        saga.complete();
                        Ok(existing)
                    }
                    Ok(Some(existing)) => {
                        warn!(
                            booking_id = %booking.id,
                            existing_id = %existing.id,
                            "Request key already booked, undoing this run"
                        );
                        self.compensate(&saga, now).await?;
                        replay(existing, actor, &req.request_key)
                    }
                    Ok(None) => {
                        let err = DbError::duplicate("request_key", &req.request_key);
                        self.abort(saga, BookingError::Store(err), now).await
                    }
                    Err(e) => self.abort(saga, e.into(), now).await,
                }
            }
            Err(e) => {
                let err = e.into_error(|d| {
                    DbError::Internal(format!("booking commit timed out after {} ms", millis(d)))
                });
                self.abort(saga, err.into(), now).await
            }
        }
    }

    /// Undoes the saga and surfaces `cause`, or `CompensationFailed` if the
    /// undo itself failed.
    async fn abort<T>(&self, saga: Saga, cause: BookingError, now: DateTime<Utc>) -> BookingResult<T> {
        warn!(
            booking_id = %saga.booking_id(),
            steps = saga.steps().len(),
            error = %cause,
            "Booking creation failed, compensating"
        );
        self.compensate(&saga, now).await?;
        Err(cause)
    }

    /// Runs every compensation, last step first. Keeps going after a failed
    /// compensation; the first failure is returned.
    async fn compensate(&self, saga: &Saga, now: DateTime<Utc>) -> BookingResult<()> {
        let mut first_failure = None;

        for step in saga.compensation_order() {
            let outcome = match step {
                SagaStep::PaymentCapture {
                    payment_id,
                    amount,
                    external_ref,
                } => match self.refund_capture(payment_id, external_ref.as_deref()).await {
                    Ok(receipt) => {
                        info!(
                            booking_id = %saga.booking_id(),
                            payment_id = %payment_id,
                            amount = %amount,
                            refunded = receipt.external_ref().is_some(),
                            "Capture compensated"
                        );
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                },
                SagaStep::CreditDebit { guest_id, amount } => {
                    match self.reverse_credit(saga.booking_id(), "booking not created", now).await {
                        Ok(()) => {
                            info!(
                                booking_id = %saga.booking_id(),
                                guest_id = %guest_id,
                                amount = %amount,
                                "Credit debit compensated"
                            );
                            Ok(())
                        }
                        Err(e) => Err(e.to_string()),
                    }
                }
            };

            if let Err(detail) = outcome {
                let err = self
                    .record_compensation_failure(saga.booking_id(), step.compensation_name(), &detail, now)
                    .await;
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// PENDING → CONFIRMED, by the host or an admin. Payment must be DONE.
    pub async fn confirm_booking(&self, booking_id: &str, actor: &Actor) -> BookingResult<Booking> {
        self.transition(booking_id, actor, BookingAction::Confirm).await
    }

    /// PENDING → REJECTED, by the host or an admin. Refunds and gives back
    /// credit before the status changes.
    pub async fn reject_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> BookingResult<Booking> {
        self.transition(
            booking_id,
            actor,
            BookingAction::Reject {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// PENDING/CONFIRMED → CANCELLED, by the guest or an admin, before the
    /// check-in day. Full refund and credit reversal.
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> BookingResult<Booking> {
        self.transition(
            booking_id,
            actor,
            BookingAction::Cancel {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// CONFIRMED → COMPLETED once the check-out day has started.
    pub async fn complete_booking(&self, booking_id: &str, actor: &Actor) -> BookingResult<Booking> {
        self.transition(booking_id, actor, BookingAction::Complete).await
    }

    /// CONFIRMED → NO_SHOW once the stay started without a check-in.
    pub async fn mark_no_show(&self, booking_id: &str, actor: &Actor) -> BookingResult<Booking> {
        self.transition(booking_id, actor, BookingAction::MarkNoShow).await
    }

    async fn transition(
        &self,
        booking_id: &str,
        actor: &Actor,
        action: BookingAction,
    ) -> BookingResult<Booking> {
        let _guard = self.booking_locks.lock(booking_id).await;

        match self.try_transition(booking_id, actor, &action).await {
            Err(BookingError::ConflictingUpdate(_)) => {
                warn!(booking_id = %booking_id, action = action.name(), "Booking changed underneath, retrying once");
                self.try_transition(booking_id, actor, &action).await
            }
            other => other,
        }
    }

    async fn try_transition(
        &self,
        booking_id: &str,
        actor: &Actor,
        action: &BookingAction,
    ) -> BookingResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        let payment = self.load_payment(booking_id).await?;
        let now = self.clock.now();

        let plan = match plan_transition(&booking, action, actor, now, payment.status)? {
            Transition::AlreadyApplied => {
                debug!(booking_id = %booking_id, action = action.name(), "Transition already applied");
                return Ok(booking);
            }
            Transition::Apply(plan) => plan,
        };

        let refund = if plan.refund_payment {
            Some(self.refund_for_transition(&booking, &payment, now).await?)
        } else {
            None
        };

        if plan.reverse_credit {
            let memo = format!("booking {}", plan.notify);
            if let Err(e) = self.reverse_credit(&booking.id, &memo, now).await {
                let detail = e.to_string();
                let err = self
                    .record_compensation_failure(&booking.id, "credit_reversal", &detail, now)
                    .await;
                let note = format!("credit_reversal failed: {}", detail);
                if let Err(flag_err) = self.bookings.flag_needs_attention(&booking.id, &note).await {
                    error!(booking_id = %booking.id, error = %flag_err, "Could not flag booking for attention");
                }
                return Err(err);
            }
        }

        let mut next = apply_transition(&booking, &plan, now);
        next.needs_attention = None;

        let committed = self
            .retry
            .run(
                "booking_transition",
                || self.bookings.commit_transition(&next, booking.version, refund.as_ref()),
                DbError::is_transient,
            )
            .await
            .map_err(|e| {
                e.into_error(|d| DbError::Internal(format!("transition commit timed out after {} ms", millis(d))))
            })?;

        info!(
            booking_id = %committed.id,
            from = %plan.from,
            to = %committed.status(),
            actor_id = %actor.id,
            refunded = refund.is_some(),
            credit_reversed = plan.reverse_credit,
            "Booking transition committed"
        );

        self.announce(&committed.id, plan.notify).await;
        Ok(committed)
    }

    async fn refund_for_transition(
        &self,
        booking: &Booking,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> BookingResult<RefundRecord> {
        let external_ref = if payment.amount.is_positive() {
            let receipt = self
                .refund_capture(&payment.id, payment.external_ref.as_deref())
                .await
                .map_err(|e| {
                    warn!(booking_id = %booking.id, payment_id = %payment.id, error = %e, "Refund failed, booking left as is");
                    BookingError::from(e)
                })?;
            match receipt {
                RefundReceipt::Refunded { external_ref } => Some(external_ref),
                RefundReceipt::NothingToRefund => {
                    warn!(booking_id = %booking.id, payment_id = %payment.id, "Processor holds no capture for this payment");
                    None
                }
            }
        } else {
            None
        };

        Ok(RefundRecord {
            payment_id: payment.id.clone(),
            amount: payment.amount,
            external_ref,
            refunded_at: now,
        })
    }

    /// Records a check-in on a confirmed booking whose stay has started.
    pub async fn check_in_guest(&self, booking_id: &str, actor: &Actor) -> BookingResult<Booking> {
        let _guard = self.booking_locks.lock(booking_id).await;

        let booking = self.load_booking(booking_id).await?;
        match record_check_in(&booking, actor, self.clock.now())? {
            CheckIn::AlreadyCheckedIn => Ok(booking),
            CheckIn::Record(at) => {
                let mut next = booking.clone();
                next.checked_in_at = Some(at);
                let committed = self.bookings.commit_transition(&next, booking.version, None).await?;
                info!(booking_id = %booking_id, actor_id = %actor.id, "Guest checked in");
                Ok(committed)
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The booking with its payment, payment events and credit entries.
    ///
    /// Visible to the booking's guest, its host, admins and the system.
    pub async fn get_booking(&self, booking_id: &str, actor: &Actor) -> BookingResult<BookingView> {
        let booking = self.load_booking(booking_id).await?;
        let sees_credit = match actor.role {
            Role::Admin | Role::System => true,
            Role::Guest if actor.id == booking.guest_id => true,
            Role::Host if actor.id == booking.host_id => false,
            _ => return Err(forbidden(actor, "view")),
        };

        let payment = self.load_payment(booking_id).await?;
        let payment_events = self.payments.events(&payment.id).await?;
        let credit_entries = self.credits.entries_for_booking(booking_id).await?;
        let guest_credit = if sees_credit {
            Some(self.credits.summary(&booking.guest_id).await?)
        } else {
            None
        };

        Ok(BookingView {
            booking,
            payment,
            payment_events,
            credit_entries,
            guest_credit,
        })
    }

    /// A guest's bookings, newest first.
    pub async fn list_guest_bookings(
        &self,
        actor: &Actor,
        guest_id: &str,
        status: Option<BookingStatus>,
        page: PageRequest,
    ) -> BookingResult<Page<Booking>> {
        require_self_or_admin(actor, Role::Guest, guest_id, "list")?;
        Ok(self.bookings.list_by_guest(guest_id, status, page).await?)
    }

    /// Bookings on a host's properties, newest first.
    pub async fn list_host_bookings(
        &self,
        actor: &Actor,
        host_id: &str,
        status: Option<BookingStatus>,
        page: PageRequest,
    ) -> BookingResult<Page<Booking>> {
        require_self_or_admin(actor, Role::Host, host_id, "list")?;
        Ok(self.bookings.list_by_host(host_id, status, page).await?)
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    /// Reviews a completed stay. One review per booking, by its guest.
    pub async fn submit_review(
        &self,
        booking_id: &str,
        actor: &Actor,
        rating: u8,
        comment: Option<String>,
    ) -> BookingResult<Review> {
        validate_rating(rating)?;
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if let Some(c) = &comment {
            if c.chars().count() > MAX_COMMENT_LENGTH {
                return Err(ValidationError::TooLong {
                    field: "comment".to_string(),
                    max: MAX_COMMENT_LENGTH,
                }
                .into());
            }
        }

        let _guard = self.booking_locks.lock(booking_id).await;
        let booking = self.load_booking(booking_id).await?;

        if actor.role != Role::Guest || actor.id != booking.guest_id {
            return Err(forbidden(actor, "review"));
        }
        if booking.status() != BookingStatus::Completed {
            return Err(BookingError::InvalidTransition {
                from: booking.status().to_string(),
                action: "review".to_string(),
                reason: "only COMPLETED bookings can be reviewed".to_string(),
            });
        }

        let review = Review {
            id: Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            guest_id: booking.guest_id.clone(),
            property_id: booking.property_id.clone(),
            rating,
            comment,
            created_at: self.clock.now(),
        };

        match self.reviews.insert(&review).await {
            Ok(()) => {
                info!(booking_id = %booking_id, rating, "Review submitted");
                Ok(review)
            }
            Err(DbError::UniqueViolation { .. }) => Err(BookingError::AlreadyReviewed(booking_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Credit
    // =========================================================================

    /// Tops up a guest's credit. Admin or system only.
    pub async fn grant_credit(
        &self,
        actor: &Actor,
        guest_id: &str,
        amount: Money,
        idempotency_key: &str,
        memo: Option<&str>,
    ) -> BookingResult<CreditTransaction> {
        if !matches!(actor.role, Role::Admin | Role::System) {
            return Err(forbidden(actor, "grant credit for"));
        }
        validate_id("guest_id", guest_id)?;
        validate_positive_amount("amount", amount)?;
        validate_idempotency_key(idempotency_key)?;

        let tx = self
            .credits
            .grant(guest_id, amount, idempotency_key, memo, self.clock.now())
            .await?;
        info!(guest_id = %guest_id, amount = %amount, actor_id = %actor.id, "Credit granted");
        Ok(tx)
    }

    pub async fn credit_summary(&self, actor: &Actor, guest_id: &str) -> BookingResult<CreditSummary> {
        require_self_or_admin(actor, Role::Guest, guest_id, "view credit of")?;
        Ok(self.credits.summary(guest_id).await?)
    }

    pub async fn credit_history(
        &self,
        actor: &Actor,
        guest_id: &str,
        page: PageRequest,
    ) -> BookingResult<Page<CreditTransaction>> {
        require_self_or_admin(actor, Role::Guest, guest_id, "view credit of")?;
        Ok(self.credits.history(guest_id, page).await?)
    }

    /// Most recent failed compensations. Admin or system only.
    pub async fn reconciliation_log(
        &self,
        actor: &Actor,
        limit: u32,
    ) -> BookingResult<Vec<ReconciliationEntry>> {
        if !matches!(actor.role, Role::Admin | Role::System) {
            return Err(forbidden(actor, "view reconciliation for"));
        }
        let limit = limit.clamp(1, MAX_RECONCILIATION_ENTRIES);
        Ok(self.reconciliation.list_recent(limit).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_booking(&self, booking_id: &str) -> BookingResult<Booking> {
        self.bookings
            .get_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))
    }

    async fn load_payment(&self, booking_id: &str) -> BookingResult<Payment> {
        self.payments
            .get_by_booking(booking_id)
            .await?
            .ok_or_else(|| {
                BookingError::Store(DbError::corrupt("booking", booking_id, "booking has no payment"))
            })
    }

    async fn refund_capture(
        &self,
        payment_id: &str,
        external_ref: Option<&str>,
    ) -> Result<RefundReceipt, GatewayError> {
        let token = refund_token(payment_id);
        self.retry
            .run(
                "payment_refund",
                || self.gateway.refund(payment_id, external_ref, &token),
                GatewayError::is_retryable,
            )
            .await
            .map_err(|e| e.into_error(|d| GatewayError::Timeout(millis(d))))
    }

    /// Reverses the booking's debit. A booking that never debited, or whose
    /// debit is already reversed, needs nothing more.
    async fn reverse_credit(
        &self,
        booking_id: &str,
        memo: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CreditError> {
        let reversed = self
            .retry
            .run(
                "credit_reversal",
                || self.credits.reverse(booking_id, memo, at),
                CreditError::is_retryable,
            )
            .await;

        match reversed {
            Ok(tx) => {
                info!(booking_id = %booking_id, amount = %tx.amount, "Credit reversed");
                Ok(())
            }
            Err(StepError::Failed(CreditError::NoMatchingDebit { .. })) => {
                debug!(booking_id = %booking_id, "No debit to reverse");
                Ok(())
            }
            Err(StepError::Failed(CreditError::AlreadyReversed { .. })) => {
                debug!(booking_id = %booking_id, "Debit already reversed");
                Ok(())
            }
            Err(e) => Err(e.into_error(|d| CreditError::Timeout(millis(d)))),
        }
    }

    async fn record_compensation_failure(
        &self,
        booking_id: &str,
        step: &str,
        detail: &str,
        at: DateTime<Utc>,
    ) -> BookingError {
        error!(
            booking_id = %booking_id,
            step = %step,
            detail = %detail,
            "Compensation failed, manual reconciliation required"
        );
        if let Err(e) = self.reconciliation.append(booking_id, step, detail, at).await {
            error!(booking_id = %booking_id, step = %step, error = %e, "Could not write reconciliation entry");
        }
        BookingError::CompensationFailed {
            booking_id: booking_id.to_string(),
            step: step.to_string(),
            detail: detail.to_string(),
        }
    }

    async fn announce(&self, booking_id: &str, event: homestay_core::NotificationEvent) {
        match tokio::time::timeout(self.retry.step_timeout, self.notifier.notify(booking_id, event)).await {
            Ok(Ok(())) => debug!(booking_id = %booking_id, event = %event, "Notification sent"),
            Ok(Err(e)) => warn!(booking_id = %booking_id, event = %event, error = %e, "Notification failed"),
            Err(_) => warn!(booking_id = %booking_id, event = %event, "Notification timed out"),
        }
    }
}

// =============================================================================
// Free Helpers
// =============================================================================

fn always_retry<E>(_: &E) -> bool {
    true
}

fn forbidden(actor: &Actor, action: &str) -> BookingError {
    BookingError::Forbidden {
        actor_id: actor.id.clone(),
        action: action.to_string(),
    }
}

fn unavailable(req: &CreateBookingRequest) -> BookingError {
    BookingError::Unavailable {
        property_id: req.property_id.clone(),
    }
}

fn require_self_or_admin(actor: &Actor, role: Role, owner_id: &str, action: &str) -> BookingResult<()> {
    match actor.role {
        Role::Admin | Role::System => Ok(()),
        r if r == role && actor.id == owner_id => Ok(()),
        _ => Err(forbidden(actor, action)),
    }
}

/// A booking already exists for the request key.
fn replay(existing: Booking, actor: &Actor, request_key: &str) -> BookingResult<Booking> {
    if existing.guest_id != actor.id {
        return Err(ValidationError::InvalidFormat {
            field: "request_key".to_string(),
            reason: format!("'{}' is already in use", request_key),
        }
        .into());
    }
    info!(booking_id = %existing.id, request_key = %request_key, "Replaying booking for request key");
    Ok(existing)
}

/// `ORD-<first 8 of booking id, upper>-<epoch millis>`.
fn order_id(booking_id: &str, now: DateTime<Utc>) -> String {
    let prefix: String = booking_id.chars().take(8).collect();
    format!("ORD-{}-{}", prefix.to_uppercase(), now.timestamp_millis())
}

/// Checks the request and returns the number of nights.
fn validate_request(req: &CreateBookingRequest) -> BookingResult<i64> {
    validate_idempotency_key(&req.request_key)?;
    validate_id("property_id", &req.property_id)?;
    validate_id("host_id", &req.host_id)?;
    validate_guest_count(req.guests)?;
    validate_positive_amount("nightly_rate", req.nightly_rate)?;
    if let Some(credit) = req.requested_credit {
        validate_non_negative_amount("requested_credit", credit)?;
    }
    validate_contact(
        &req.guest_contact.name,
        &req.guest_contact.phone,
        &req.guest_contact.email,
    )?;
    if let Some(text) = &req.special_requests {
        if text.chars().count() > MAX_SPECIAL_REQUESTS_LENGTH {
            return Err(ValidationError::TooLong {
                field: "special_requests".to_string(),
                max: MAX_SPECIAL_REQUESTS_LENGTH,
            }
            .into());
        }
    }

    let nights = number_of_nights(req.check_in, req.check_out)?;

    for experience in &req.experiences {
        validate_id("experience_id", &experience.experience_id)?;
        validate_time_slot(&experience.time)?;
        validate_non_negative_amount("unit_price", experience.unit_price)?;
        // Experiences run on stay days, check-out day included
        if experience.date < req.check_in || experience.date > req.check_out {
            return Err(ValidationError::InvalidFormat {
                field: "experience date".to_string(),
                reason: format!(
                    "{} is outside the stay {} .. {}",
                    experience.date, req.check_in, req.check_out
                ),
            }
            .into());
        }
    }

    Ok(nights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> CreateBookingRequest {
        CreateBookingRequest {
            request_key: "req-1".into(),
            property_id: "prop-1".into(),
            host_id: "host-1".into(),
            check_in: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 11, 22).unwrap(),
            guests: 2,
            nightly_rate: Money::from_won(100_000),
            experiences: vec![],
            requested_credit: None,
            payment_method: PaymentMethod::Card,
            guest_contact: GuestContact {
                name: "Kim Minji".into(),
                phone: "010-1234-5678".into(),
                email: "minji@example.com".into(),
            },
            special_requests: None,
        }
    }

    #[test]
    fn test_validate_request_counts_nights() {
        assert_eq!(validate_request(&request()).unwrap(), 2);
    }

    #[test]
    fn test_reversed_dates_are_rejected() {
        let mut req = request();
        req.check_out = req.check_in;
        assert!(matches!(validate_request(&req), Err(BookingError::Validation(_))));
    }

    #[test]
    fn test_experience_outside_stay_is_rejected() {
        let mut req = request();
        req.experiences.push(ExperienceSelection {
            experience_id: "exp-1".into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 25).unwrap(),
            time: "10:00".into(),
            quantity: 1,
            unit_price: Money::from_won(20_000),
        });
        assert!(matches!(validate_request(&req), Err(BookingError::Validation(_))));
    }

    #[test]
    fn test_order_id_format() {
        let now = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();
        let id = order_id("3f2a9c1e-aaaa-bbbb", now);
        assert_eq!(id, format!("ORD-3F2A9C1E-{}", now.timestamp_millis()));
    }

    #[test]
    fn test_self_or_admin() {
        assert!(require_self_or_admin(&Actor::guest("g-1"), Role::Guest, "g-1", "list").is_ok());
        assert!(require_self_or_admin(&Actor::admin("a-1"), Role::Guest, "g-1", "list").is_ok());
        assert!(require_self_or_admin(&Actor::guest("g-2"), Role::Guest, "g-1", "list").is_err());
        // A host id that happens to equal the guest id is still the wrong role
        assert!(require_self_or_admin(&Actor::host("g-1"), Role::Guest, "g-1", "list").is_err());
    }
}
