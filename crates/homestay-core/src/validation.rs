//! # Validation Module
//!
//! Input validation for booking requests and lifecycle actions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation layer                                           │
//! │  └── Form checks, immediate user feedback                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Coordinator entry points                                     │
//! │  └── THIS MODULE: runs before pricing, before any ledger call          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger Store (SQLite)                                        │
//! │  ├── CHECK constraints (status values, rating range)                   │
//! │  └── UNIQUE constraints (idempotency keys, one review per booking)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_AMOUNT_WON, MAX_GUESTS, MAX_REASON_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a rejection or cancellation reason.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_REASON_LENGTH` characters
///
/// Returns the trimmed reason.
///
/// ## Example
/// ```rust
/// use homestay_core::validation::validate_reason;
///
/// assert_eq!(validate_reason("  plans changed ").unwrap(), "plans changed");
/// assert!(validate_reason("   ").is_err());
/// ```
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }

    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(reason.to_string())
}

/// Validates a caller-supplied idempotency key.
///
/// ## Rules
/// - Not empty, at most 128 characters
/// - No whitespace (keys end up in logs and unique indexes)
pub fn validate_idempotency_key(key: &str) -> ValidationResult<()> {
    if key.is_empty() {
        return Err(ValidationError::required("idempotency_key"));
    }

    if key.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "idempotency_key".to_string(),
            max: 128,
        });
    }

    if key.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "idempotency_key".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates a non-empty identifier (property, guest, host).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates the guest contact snapshot.
pub fn validate_contact(name: &str, phone: &str, email: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::required("guest_name"));
    }
    if phone.trim().is_empty() {
        return Err(ValidationError::required("guest_phone"));
    }

    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::required("guest_email"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::InvalidFormat {
            field: "guest_email".to_string(),
            reason: "must look like name@example.com".to_string(),
        }),
    }
}

/// Validates a time slot in `HH:MM` form.
pub fn validate_time_slot(time: &str) -> ValidationResult<()> {
    let invalid = || ValidationError::InvalidFormat {
        field: "time".to_string(),
        reason: "must be HH:MM".to_string(),
    };

    let (hh, mm) = time.split_once(':').ok_or_else(invalid)?;
    if hh.len() != 2 || mm.len() != 2 {
        return Err(invalid());
    }
    let hours: u32 = hh.parse().map_err(|_| invalid())?;
    let minutes: u32 = mm.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the number of guests.
pub fn validate_guest_count(guests: u32) -> ValidationResult<()> {
    if guests < 1 || guests > MAX_GUESTS {
        return Err(ValidationError::OutOfRange {
            field: "guests".to_string(),
            min: 1,
            max: MAX_GUESTS as i64,
        });
    }
    Ok(())
}

/// Validates a review rating (1 to 5 stars).
pub fn validate_rating(rating: u8) -> ValidationResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating".to_string(),
            min: 1,
            max: 5,
        });
    }
    Ok(())
}

/// Validates that an amount is positive and at most `MAX_AMOUNT_WON`
/// (rates, top-ups, debits).
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_amount_ceiling(field, amount, 1)
}

/// Validates that an amount is not negative and at most `MAX_AMOUNT_WON`
/// (experience prices, requested credit).
pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_amount_ceiling(field, amount, 0)
}

fn validate_amount_ceiling(field: &str, amount: Money, min: i64) -> ValidationResult<()> {
    if amount.won() > MAX_AMOUNT_WON {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max: MAX_AMOUNT_WON,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason("full house").unwrap(), "full house");
        assert_eq!(validate_reason(""), Err(ValidationError::required("reason")));
        assert!(validate_reason(&"x".repeat(MAX_REASON_LENGTH + 1)).is_err());
        // Hangul counts per character, not per byte
        assert!(validate_reason(&"취".repeat(MAX_REASON_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_idempotency_key() {
        assert!(validate_idempotency_key("req-7f3a").is_ok());
        assert!(validate_idempotency_key("").is_err());
        assert!(validate_idempotency_key("has space").is_err());
        assert!(validate_idempotency_key(&"k".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_contact() {
        assert!(validate_contact("Kim", "010-1234-5678", "kim@example.com").is_ok());
        assert!(validate_contact("", "010", "kim@example.com").is_err());
        assert!(validate_contact("Kim", "010", "kim.example.com").is_err());
        assert!(validate_contact("Kim", "010", "@example.com").is_err());
    }

    #[test]
    fn test_validate_time_slot() {
        assert!(validate_time_slot("09:30").is_ok());
        assert!(validate_time_slot("23:59").is_ok());
        assert!(validate_time_slot("24:00").is_err());
        assert!(validate_time_slot("9:30").is_err());
        assert!(validate_time_slot("morning").is_err());
    }

    #[test]
    fn test_validate_guest_count() {
        assert!(validate_guest_count(1).is_ok());
        assert!(validate_guest_count(0).is_err());
        assert!(validate_guest_count(MAX_GUESTS + 1).is_err());
    }

    #[test]
    fn test_validate_rating() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_positive_amount("amount", Money::from_won(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::zero()).is_err());
        assert!(validate_non_negative_amount("rate", Money::zero()).is_ok());
        assert!(validate_non_negative_amount("rate", Money::from_won(-1)).is_err());

        assert!(validate_positive_amount("amount", Money::from_won(MAX_AMOUNT_WON)).is_ok());
        assert_eq!(
            validate_positive_amount("amount", Money::from_won(MAX_AMOUNT_WON + 1)),
            Err(ValidationError::OutOfRange {
                field: "amount".to_string(),
                min: 1,
                max: MAX_AMOUNT_WON,
            })
        );
        assert!(validate_non_negative_amount("credit", Money::from_won(i64::MAX)).is_err());
    }
}
