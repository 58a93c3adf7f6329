//! # Booking State Machine
//!
//! Owns the transition table for bookings and validates every transition
//! against the actor, the clock and the payment state.
//!
//! ## Transition Table
//! ```text
//! ┌──────────────┬───────────────┬───────────────┬──────────────────────────┐
//! │ Action       │ From          │ To            │ Guard                    │
//! ├──────────────┼───────────────┼───────────────┼──────────────────────────┤
//! │ confirm      │ PENDING       │ CONFIRMED     │ host/admin, payment DONE │
//! │ reject       │ PENDING       │ REJECTED      │ host/admin, reason       │
//! │ cancel       │ PENDING,      │ CANCELLED     │ guest/admin, reason,     │
//! │              │ CONFIRMED     │               │ now < check-in           │
//! │ complete     │ CONFIRMED     │ COMPLETED     │ now ≥ check-out          │
//! │ mark_no_show │ CONFIRMED     │ NO_SHOW       │ now ≥ check-in, no       │
//! │              │               │               │ check-in recorded        │
//! └──────────────┴───────────────┴───────────────┴──────────────────────────┘
//! ```
//!
//! ## Plan, Then Apply
//! `plan_transition` decides everything up front: target state, whether the
//! payment must be refunded, whether credit must be reversed, and what to
//! announce. The coordinator moves the money according to the plan and only
//! then calls `apply_transition` to produce the committed booking. Nothing
//! in here reads a clock; `now` is always passed in.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    Actor, Booking, BookingState, BookingStatus, NotificationEvent, PaymentStatus, Role,
};
use crate::validation::validate_reason;

// =============================================================================
// Actions
// =============================================================================

/// A requested lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingAction {
    Confirm,
    Reject { reason: String },
    Cancel { reason: String },
    Complete,
    MarkNoShow,
}

impl BookingAction {
    /// Verb used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            BookingAction::Confirm => "confirm",
            BookingAction::Reject { .. } => "reject",
            BookingAction::Cancel { .. } => "cancel",
            BookingAction::Complete => "complete",
            BookingAction::MarkNoShow => "mark as no-show",
        }
    }

    fn target_status(&self) -> BookingStatus {
        match self {
            BookingAction::Confirm => BookingStatus::Confirmed,
            BookingAction::Reject { .. } => BookingStatus::Rejected,
            BookingAction::Cancel { .. } => BookingStatus::Cancelled,
            BookingAction::Complete => BookingStatus::Completed,
            BookingAction::MarkNoShow => BookingStatus::NoShow,
        }
    }

    fn allowed_sources(&self) -> &'static [BookingStatus] {
        match self {
            BookingAction::Confirm | BookingAction::Reject { .. } => &[BookingStatus::Pending],
            BookingAction::Cancel { .. } => &[BookingStatus::Pending, BookingStatus::Confirmed],
            BookingAction::Complete | BookingAction::MarkNoShow => &[BookingStatus::Confirmed],
        }
    }

    fn notification(&self) -> NotificationEvent {
        match self {
            BookingAction::Confirm => NotificationEvent::Confirmed,
            BookingAction::Reject { .. } => NotificationEvent::Rejected,
            BookingAction::Cancel { .. } => NotificationEvent::Cancelled,
            BookingAction::Complete => NotificationEvent::Completed,
            BookingAction::MarkNoShow => NotificationEvent::NoShow,
        }
    }
}

// =============================================================================
// Plans
// =============================================================================

/// What a validated transition requires and produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: BookingStatus,
    pub to: BookingState,
    /// The captured payment must be refunded before committing.
    pub refund_payment: bool,
    /// The credit debit must be reversed before committing.
    pub reverse_credit: bool,
    pub notify: NotificationEvent,
}

/// Outcome of planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move money per the plan, then commit.
    Apply(TransitionPlan),
    /// The booking is already in the terminal state this action leads to
    /// (repeated cancel or reject). Nothing to do.
    AlreadyApplied,
}

/// Outcome of a check-in request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckIn {
    Record(DateTime<Utc>),
    AlreadyCheckedIn,
}

// =============================================================================
// Operations
// =============================================================================

/// Validates `action` against the booking and decides its side effects.
///
/// ## Check Order
/// 1. Reason (reject/cancel) must be non-empty
/// 2. Actor must be allowed to perform the action on this booking
/// 3. Repeated cancel/reject on the same terminal state is a replay
/// 4. Source state must be in the transition table
/// 5. Time and payment guards
///
/// ## Errors
/// - `Validation` for an empty reason
/// - `Forbidden` for the wrong actor
/// - `InvalidTransition` for every guard violation
pub fn plan_transition(
    booking: &Booking,
    action: &BookingAction,
    actor: &Actor,
    now: DateTime<Utc>,
    payment_status: PaymentStatus,
) -> CoreResult<Transition> {
    let target_state = match action {
        BookingAction::Reject { reason } => BookingState::Rejected {
            reason: validate_reason(reason)?,
        },
        BookingAction::Cancel { reason } => BookingState::Cancelled {
            reason: validate_reason(reason)?,
        },
        BookingAction::Confirm => BookingState::Confirmed,
        BookingAction::Complete => BookingState::Completed,
        BookingAction::MarkNoShow => BookingState::NoShow,
    };

    authorize(booking, action, actor)?;

    let from = booking.status();
    let target = action.target_status();

    if from == target && matches!(target, BookingStatus::Cancelled | BookingStatus::Rejected) {
        return Ok(Transition::AlreadyApplied);
    }

    if !action.allowed_sources().contains(&from) {
        let expected = action
            .allowed_sources()
            .iter()
            .map(BookingStatus::as_str)
            .collect::<Vec<_>>()
            .join(" or ");
        return Err(CoreError::invalid_transition(
            from,
            action.name(),
            format!("only {} bookings allow this", expected),
        ));
    }

    let credit_applied = booking.price.credit_applied.is_positive();
    let payment_done = payment_status == PaymentStatus::Done;

    let (refund_payment, reverse_credit) = match action {
        BookingAction::Confirm => {
            if !payment_done {
                return Err(CoreError::invalid_transition(
                    from,
                    action.name(),
                    format!("payment is {}, expected DONE", payment_status),
                ));
            }
            (false, false)
        }
        BookingAction::Reject { .. } => (payment_done, credit_applied),
        BookingAction::Cancel { .. } => {
            if now >= booking.check_in_at() {
                return Err(CoreError::invalid_transition(
                    from,
                    action.name(),
                    format!("check-in date {} has already started", booking.check_in),
                ));
            }
            (payment_done, credit_applied)
        }
        BookingAction::Complete => {
            if now < booking.check_out_at() {
                return Err(CoreError::invalid_transition(
                    from,
                    action.name(),
                    format!("check-out date {} has not passed", booking.check_out),
                ));
            }
            (false, false)
        }
        BookingAction::MarkNoShow => {
            if now < booking.check_in_at() {
                return Err(CoreError::invalid_transition(
                    from,
                    action.name(),
                    format!("check-in date {} has not started", booking.check_in),
                ));
            }
            if booking.checked_in_at.is_some() {
                return Err(CoreError::invalid_transition(
                    from,
                    action.name(),
                    "the guest has checked in",
                ));
            }
            (false, false)
        }
    };

    Ok(Transition::Apply(TransitionPlan {
        from,
        to: target_state,
        refund_payment,
        reverse_credit,
        notify: action.notification(),
    }))
}

/// Produces the booking as it will be committed for `plan`.
///
/// Each lifecycle timestamp is set at most once; an existing value is kept.
pub fn apply_transition(booking: &Booking, plan: &TransitionPlan, now: DateTime<Utc>) -> Booking {
    let mut next = booking.clone();
    next.state = plan.to.clone();

    let stamp = match plan.to.status() {
        BookingStatus::Confirmed => Some(&mut next.confirmed_at),
        BookingStatus::Rejected => Some(&mut next.rejected_at),
        BookingStatus::Cancelled => Some(&mut next.cancelled_at),
        BookingStatus::Completed | BookingStatus::NoShow => Some(&mut next.completed_at),
        BookingStatus::Pending => None,
    };
    if let Some(slot) = stamp {
        if slot.is_none() {
            *slot = Some(now.max(booking.created_at));
        }
    }

    next
}

/// Validates a check-in event for a confirmed booking.
///
/// Allowed for the host, an admin or the system, from the start of the
/// check-in day until check-out.
pub fn record_check_in(booking: &Booking, actor: &Actor, now: DateTime<Utc>) -> CoreResult<CheckIn> {
    let allowed = match actor.role {
        Role::Admin | Role::System => true,
        Role::Host => actor.id == booking.host_id,
        Role::Guest => false,
    };
    if !allowed {
        return Err(CoreError::forbidden(&actor.id, "check in"));
    }

    if booking.checked_in_at.is_some() {
        return Ok(CheckIn::AlreadyCheckedIn);
    }

    let from = booking.status();
    if from != BookingStatus::Confirmed {
        return Err(CoreError::invalid_transition(
            from,
            "check in",
            "only CONFIRMED bookings allow this",
        ));
    }
    if now < booking.check_in_at() || now >= booking.check_out_at() {
        return Err(CoreError::invalid_transition(
            from,
            "check in",
            format!("check-in is open from {} until {}", booking.check_in, booking.check_out),
        ));
    }

    Ok(CheckIn::Record(now))
}

fn authorize(booking: &Booking, action: &BookingAction, actor: &Actor) -> CoreResult<()> {
    let is_host = actor.role == Role::Host && actor.id == booking.host_id;
    let is_guest = actor.role == Role::Guest && actor.id == booking.guest_id;

    let allowed = actor.is_admin()
        || match action {
            BookingAction::Confirm | BookingAction::Reject { .. } => is_host,
            BookingAction::Cancel { .. } => is_guest,
            BookingAction::Complete | BookingAction::MarkNoShow => {
                is_host || actor.role == Role::System
            }
        };

    if allowed {
        Ok(())
    } else {
        Err(CoreError::forbidden(&actor.id, action.name()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
