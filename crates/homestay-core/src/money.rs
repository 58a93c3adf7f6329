//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  0.1 + 0.2 = 0.30000000000000004  ❌                                     │
//! │                                                                         │
//! │  A booking total is built from several parts (nights, experiences,     │
//! │  fee, credit). Any drift between them breaks the invariant            │
//! │    accommodation + experiences + fee - credit == total                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer amounts in the smallest currency unit (won)    │
//! │  and a single rounding step for the service fee.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use homestay_core::money::Money;
//!
//! let nightly = Money::from_won(100_000);
//! let stay = nightly.multiply_quantity(2);
//! assert_eq!(stay.won(), 200_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::FeeRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (won for KRW).
///
/// ## Design Decisions
/// - **i64 (signed)**: ledger debits are negative, reversals positive
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Single currency**: the platform settles in KRW only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from won (the smallest currency unit).
    #[inline]
    pub const fn from_won(won: i64) -> Self {
        Money(won)
    }

    /// Returns the value in won.
    #[inline]
    pub const fn won(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Clamps negative values to zero.
    #[inline]
    pub fn floor_zero(self) -> Money {
        Money(self.0.max(0))
    }

    /// Multiplies money by a quantity (nights, tickets).
    ///
    /// ## Example
    /// ```rust
    /// use homestay_core::money::Money;
    ///
    /// let ticket = Money::from_won(15_000);
    /// assert_eq!(ticket.multiply_quantity(3).won(), 45_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// `multiply_quantity` that returns `None` instead of overflowing.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Addition that returns `None` instead of overflowing.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Calculates a fee with round-half-up to the nearest won.
    ///
    /// ## Rounding Policy
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  ROUND HALF UP, APPLIED ONCE                                        │
    /// │                                                                     │
    /// │  fee = (amount × bps + 5000) / 10000   (integer division)          │
    /// │                                                                     │
    /// │  The fee is computed on the whole pre-fee subtotal, never per      │
    /// │  line item, so rounding error cannot accumulate across items.      │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// Only defined for non-negative amounts; pricing validates its inputs
    /// before calling this.
    ///
    /// ## Example
    /// ```rust
    /// use homestay_core::money::Money;
    /// use homestay_core::types::FeeRate;
    ///
    /// let subtotal = Money::from_won(12_345);
    /// // 12,345 × 10% = 1,234.5 → 1,235
    /// assert_eq!(subtotal.calculate_fee(FeeRate::from_bps(1000)).won(), 1_235);
    /// ```
    pub fn calculate_fee(&self, rate: FeeRate) -> Money {
        // i128 keeps large stays from overflowing the intermediate product
        let fee = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_won(fee as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Displays as `₩220,000` (negative: `-₩5,000`).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(f, "{}₩{}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
