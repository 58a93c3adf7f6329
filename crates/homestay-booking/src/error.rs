//! # Booking Error Types
//!
//! Error types for the coordinator and its collaborators.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Booking Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Request        │  │  Money          │  │  Lifecycle              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Insufficient-  │  │  InvalidTransition      │ │
//! │  │  NotFound       │  │    Credit       │  │  ConflictingUpdate      │ │
//! │  │  Forbidden      │  │  PaymentFailed  │  │  AlreadyReviewed        │ │
//! │  │  Unavailable    │  │  CreditFailed   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Fatal          │  │  Infrastructure │                              │
//! │  │                 │  │                 │                              │
//! │  │  Compensation-  │  │  Store          │                              │
//! │  │    Failed       │  │  Config         │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `BookingError` has a stable `code()` for programmatic handling and
//! a `user_message()` that names what went wrong. Money paths never fall
//! back to a generic message.

use homestay_core::{CoreError, Money, ValidationError};
use homestay_db::DbError;
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type BookingResult<T> = Result<T, BookingError>;

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type alias for credit ledger calls.
pub type CreditResult<T> = Result<T, CreditError>;

// =============================================================================
// Gateway Errors
// =============================================================================

/// Failure reported by (or while talking to) the payment processor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The processor refused the operation (card declined, limit reached).
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The processor could not be reached or answered with a server error.
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),

    /// No answer within the step timeout. The operation may or may not
    /// have happened upstream.
    #[error("Payment processor timed out after {0} ms")]
    Timeout(u64),
}

impl GatewayError {
    /// Declines are final; everything else may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::Declined(_))
    }
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// The availability service could not answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Availability check failed: {0}")]
pub struct AvailabilityError(pub String);

/// The notification service could not accept an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

// =============================================================================
// Credit Errors
// =============================================================================

/// Credit ledger failures.
#[derive(Debug, Error)]
pub enum CreditError {
    /// The balance does not cover the debit. Nothing was written.
    #[error("Insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit { requested: Money, available: Money },

    /// `reverse` found no debit for the booking.
    #[error("No credit debit recorded for booking {booking_id}")]
    NoMatchingDebit { booking_id: String },

    /// `reverse` found the debit already reversed.
    #[error("Credit debit for booking {booking_id} was already reversed")]
    AlreadyReversed { booking_id: String },

    /// The idempotency key was reused with different arguments.
    #[error("Idempotency key '{0}' was already used for a different entry")]
    KeyReused(String),

    /// The store did not answer within the step timeout.
    #[error("Credit ledger timed out after {0} ms")]
    Timeout(u64),

    #[error("Credit ledger store error: {0}")]
    Store(#[from] DbError),
}

impl CreditError {
    /// Busy store or timeout: worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CreditError::Timeout(_) => true,
            CreditError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

// =============================================================================
// Booking Errors
// =============================================================================

/// Coordinator error covering every surfaced failure.
///
/// ## Design Principles
/// - Money-affecting failures fail closed: no booking without its money,
///   no money without its booking
/// - `CompensationFailed` is the only fatal case; it is logged for manual
///   reconciliation and the booking is flagged
#[derive(Debug, Error)]
pub enum BookingError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// The request is malformed.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No booking with that id.
    #[error("Booking not found: {0}")]
    NotFound(String),

    /// The actor may not perform this action on this booking.
    #[error("{actor_id} may not {action} this booking")]
    Forbidden { actor_id: String, action: String },

    /// The property is not free for the dates (or availability could not
    /// be established).
    #[error("Property {property_id} is not available for the requested dates")]
    Unavailable { property_id: String },

    // =========================================================================
    // Money Errors
    // =========================================================================
    /// Requested credit exceeds the guest's balance.
    #[error("Insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit { requested: Money, available: Money },

    /// The gateway declined or timed out after retries. No booking was
    /// created, or the booking kept its previous status.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// The credit ledger failed after retries.
    #[error("Credit ledger failed: {0}")]
    CreditFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// A transition guard was violated. Nothing was mutated.
    #[error("Cannot {action} a {from} booking: {reason}")]
    InvalidTransition {
        from: String,
        action: String,
        reason: String,
    },

    /// Another writer changed the booking first.
    #[error("Booking {0} was updated concurrently")]
    ConflictingUpdate(String),

    /// The booking already has a review.
    #[error("Booking {0} has already been reviewed")]
    AlreadyReviewed(String),

    // =========================================================================
    // Fatal
    // =========================================================================
    /// A compensating refund or reversal failed after retries. The booking
    /// carries a `needs_attention` note and the failure is in the
    /// reconciliation log.
    #[error("Compensation '{step}' failed for booking {booking_id}: {detail}")]
    CompensationFailed {
        booking_id: String,
        step: String,
        detail: String,
    },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(DbError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for BookingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition {
                from,
                action,
                reason,
            } => BookingError::InvalidTransition {
                from: from.to_string(),
                action,
                reason,
            },
            CoreError::Forbidden { actor_id, action } => {
                BookingError::Forbidden { actor_id, action }
            }
            CoreError::InsufficientCredit {
                requested,
                available,
            } => BookingError::InsufficientCredit {
                requested,
                available,
            },
            CoreError::InvalidStayDates {
                check_in,
                check_out,
            } => BookingError::Validation(ValidationError::InvalidFormat {
                field: "check_out".to_string(),
                reason: format!("must be after check-in ({} .. {})", check_in, check_out),
            }),
            CoreError::Validation(e) => BookingError::Validation(e),
        }
    }
}

impl From<DbError> for BookingError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { id, .. } => BookingError::NotFound(id),
            DbError::Conflict { id, .. } => BookingError::ConflictingUpdate(id),
            DbError::DatesTaken { property_id, .. } => BookingError::Unavailable { property_id },
            other => BookingError::Store(other),
        }
    }
}

impl From<CreditError> for BookingError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientCredit {
                requested,
                available,
            } => BookingError::InsufficientCredit {
                requested,
                available,
            },
            other => BookingError::CreditFailed(other.to_string()),
        }
    }
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        BookingError::PaymentFailed(err.to_string())
    }
}

impl From<std::io::Error> for BookingError {
    fn from(err: std::io::Error) -> Self {
        BookingError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for BookingError {
    fn from(err: toml::de::Error) -> Self {
        BookingError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BookingError {
    /// Machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::Forbidden { .. } => "FORBIDDEN",
            BookingError::Unavailable { .. } => "UNAVAILABLE",
            BookingError::InsufficientCredit { .. } => "INSUFFICIENT_CREDIT",
            BookingError::PaymentFailed(_) => "PAYMENT_FAILED",
            BookingError::CreditFailed(_) => "CREDIT_FAILED",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::ConflictingUpdate(_) => "CONFLICTING_UPDATE",
            BookingError::AlreadyReviewed(_) => "ALREADY_REVIEWED",
            BookingError::CompensationFailed { .. } => "COMPENSATION_FAILED",
            BookingError::Config(_) => "CONFIG_ERROR",
            BookingError::Store(_) => "STORE_ERROR",
        }
    }

    /// Message suitable for showing to the person who made the request.
    pub fn user_message(&self) -> String {
        match self {
            BookingError::Validation(e) => e.to_string(),
            BookingError::NotFound(_) => "This booking could not be found.".to_string(),
            BookingError::Forbidden { .. } => {
                "You are not allowed to change this booking.".to_string()
            }
            BookingError::Unavailable { .. } => {
                "These dates are no longer available.".to_string()
            }
            BookingError::InsufficientCredit { available, .. } => {
                format!("Not enough credit. You have {} available.", available)
            }
            BookingError::PaymentFailed(_) => {
                "The payment could not be completed. You have not been charged.".to_string()
            }
            BookingError::CreditFailed(_) => {
                "Your credit could not be applied. No credit was used.".to_string()
            }
            BookingError::InvalidTransition { from, action, .. } => {
                format!(
                    "A {} booking cannot be {}.",
                    from.to_lowercase().replace('_', " "),
                    past_tense(action)
                )
            }
            BookingError::ConflictingUpdate(_) => {
                "This booking was just changed by someone else. Please reload and try again."
                    .to_string()
            }
            BookingError::AlreadyReviewed(_) => "You have already reviewed this stay.".to_string(),
            BookingError::CompensationFailed { .. } => {
                "We could not finish returning your money automatically. Our team has been notified and will complete it."
                    .to_string()
            }
            BookingError::Config(_) | BookingError::Store(_) => {
                "The booking service is temporarily unavailable. Please try again.".to_string()
            }
        }
    }

    /// Returns true if the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            BookingError::ConflictingUpdate(_) => true,
            BookingError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

fn past_tense(action: &str) -> String {
    match action {
        "confirm" => "confirmed".to_string(),
        "reject" => "rejected".to_string(),
        "cancel" => "cancelled".to_string(),
        "complete" => "completed".to_string(),
        "mark as no-show" => "marked as a no-show".to_string(),
        "check in" => "checked in".to_string(),
        "review" => "reviewed".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homestay_core::BookingStatus;

    #[test]
    fn test_core_errors_map_to_booking_errors() {
        let err: BookingError =
            CoreError::invalid_transition(BookingStatus::Confirmed, "reject", "only PENDING bookings allow this")
                .into();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(err.user_message(), "A confirmed booking cannot be rejected.");

        let err: BookingError = CoreError::InsufficientCredit {
            requested: Money::from_won(80_000),
            available: Money::from_won(20_000),
        }
        .into();
        assert_eq!(err.code(), "INSUFFICIENT_CREDIT");
        assert!(err.user_message().contains("₩20,000"));
    }

    #[test]
    fn test_store_conflict_is_conflicting_update() {
        let err: BookingError = DbError::conflict("booking", "b-1").into();
        assert!(matches!(err, BookingError::ConflictingUpdate(ref id) if id == "b-1"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_money_paths_have_specific_messages() {
        let errors = [
            BookingError::Unavailable { property_id: "p".into() },
            BookingError::PaymentFailed("declined".into()),
            BookingError::CreditFailed("busy".into()),
            BookingError::CompensationFailed {
                booking_id: "b".into(),
                step: "payment_refund".into(),
                detail: "timeout".into(),
            },
        ];
        let generic = BookingError::Store(DbError::PoolExhausted).user_message();
        for err in errors {
            assert_ne!(err.user_message(), generic, "{} fell back to generic", err.code());
        }
    }

    #[test]
    fn test_gateway_retryable() {
        assert!(GatewayError::Timeout(5000).is_retryable());
        assert!(GatewayError::Unavailable("502".into()).is_retryable());
        assert!(!GatewayError::Declined("card expired".into()).is_retryable());
    }
}
