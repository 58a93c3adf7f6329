//! # Error Types
//!
//! Domain-specific error types for homestay-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  homestay-core errors (this file)                                      │
//! │  ├── CoreError        - Pricing and transition guard failures          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  homestay-db errors (separate crate)                                   │
//! │  └── DbError          - Ledger Store failures                          │
//! │                                                                         │
//! │  homestay-booking errors (separate crate)                              │
//! │  └── BookingError     - What the presentation layer sees               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → BookingError → caller             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Core errors never carry side effects: when one of these is returned,
//! nothing has been written anywhere.

use thiserror::Error;

use crate::money::Money;
use crate::types::BookingStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The booking is not in a state that allows the requested action,
    /// or a transition guard (time window, payment state) does not hold.
    ///
    /// ## When This Occurs
    /// - Rejecting a booking that is already CONFIRMED
    /// - Cancelling on or after the check-in date
    /// - Confirming while the payment is not DONE
    #[error("Cannot {action} a {from} booking: {reason}")]
    InvalidTransition {
        from: BookingStatus,
        action: String,
        reason: String,
    },

    /// The actor's role or identity does not permit the action.
    #[error("{actor_id} is not allowed to {action} this booking")]
    Forbidden { actor_id: String, action: String },

    /// Requested credit exceeds what the guest holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Guest balance: ₩50,000
    ///      │
    ///      ▼
    /// "Use ₩80,000 credit"
    ///      │
    ///      ▼
    /// InsufficientCredit { requested: ₩80,000, available: ₩50,000 }
    /// ```
    #[error("Insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit { requested: Money, available: Money },

    /// Check-out is not at least one night after check-in.
    #[error("Invalid stay: check-out {check_out} must be after check-in {check_in}")]
    InvalidStayDates { check_in: String, check_out: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        from: BookingStatus,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            from,
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Forbidden error.
    pub fn forbidden(actor_id: impl Into<String>, action: impl Into<String>) -> Self {
        CoreError::Forbidden {
            actor_id: actor_id.into(),
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Used for early validation before pricing or any ledger call runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., malformed email, bad time of day).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Shorthand for a `Required` error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::invalid_transition(
            BookingStatus::Confirmed,
            "reject",
            "only pending bookings can be rejected",
        );
        assert_eq!(
            err.to_string(),
            "Cannot reject a CONFIRMED booking: only pending bookings can be rejected"
        );
    }

    #[test]
    fn test_insufficient_credit_message() {
        let err = CoreError::InsufficientCredit {
            requested: Money::from_won(80_000),
            available: Money::from_won(50_000),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credit: requested ₩80,000, available ₩50,000"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("reason").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: reason is required");
    }
}
