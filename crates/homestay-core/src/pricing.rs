//! # Pricing Calculator
//!
//! Turns a booking request into a price breakdown. Pure: it is called
//! speculatively before any ledger write, so a pricing failure never
//! touches money.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Price Breakdown                                    │
//! │                                                                         │
//! │  accommodation_total = nightly_rate × number_of_nights                 │
//! │  experiences_total   = Σ (unit_price × quantity)                       │
//! │  ─────────────────────────────────────────────                         │
//! │  subtotal            = accommodation_total + experiences_total         │
//! │  service_fee         = round_half_up(subtotal × fee_rate)   ← once     │
//! │  total_before_credit = subtotal + service_fee                          │
//! │  credit_applied      = min(requested_credit, total_before_credit)      │
//! │  total_amount        = total_before_credit − credit_applied   (≥ 0)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credit is applied last, against the post-fee amount. A total of zero is
//! a valid price: the booking is fully covered by credit and no capture is
//! needed.
//!
//! Rates, unit prices and every intermediate total are capped at
//! `MAX_AMOUNT_WON`; arithmetic is checked, so oversized input is a
//! validation error rather than an overflow.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{ExperienceItem, ExperienceSelection, FeeRate};
use crate::{MAX_AMOUNT_WON, MAX_EXPERIENCE_ITEMS, MAX_ITEM_QUANTITY, MAX_NIGHTS};

// =============================================================================
// Price Breakdown
// =============================================================================

/// The priced components of a booking.
///
/// Invariant: `accommodation_total + experiences_total + service_fee
/// - credit_applied == total_amount` and `total_amount >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceBreakdown {
    pub accommodation_total: Money,
    pub experiences_total: Money,
    pub service_fee: Money,
    pub credit_applied: Money,
    pub total_amount: Money,
}

impl PriceBreakdown {
    /// Amount owed before credit is applied.
    #[inline]
    pub fn total_before_credit(&self) -> Money {
        self.accommodation_total + self.experiences_total + self.service_fee
    }

    /// Checks the breakdown invariant. Used when loading stored rows.
    pub fn is_consistent(&self) -> bool {
        !self.total_amount.is_negative()
            && !self.credit_applied.is_negative()
            && self.credit_applied <= self.total_before_credit()
            && self.total_before_credit() - self.credit_applied == self.total_amount
    }
}

// =============================================================================
// Pricing Input
// =============================================================================

/// Everything the calculator needs. No hidden state.
#[derive(Debug, Clone)]
pub struct PricingInput<'a> {
    pub nightly_rate: Money,
    pub number_of_nights: i64,
    pub experiences: &'a [ExperienceSelection],
    /// Guest's current credit balance.
    pub credit_balance: Money,
    /// Credit the guest asked to use; `None` uses none.
    pub requested_credit: Option<Money>,
    pub service_fee_rate: FeeRate,
}

/// Result of pricing: the breakdown plus the priced experience lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub breakdown: PriceBreakdown,
    pub items: Vec<ExperienceItem>,
}

// =============================================================================
// Operations
// =============================================================================

/// Nights between check-in and check-out.
///
/// ## Errors
/// `InvalidStayDates` unless check-out is at least one day after check-in.
pub fn number_of_nights(check_in: NaiveDate, check_out: NaiveDate) -> CoreResult<i64> {
    let nights = (check_out - check_in).num_days();
    if nights < 1 {
        return Err(CoreError::InvalidStayDates {
            check_in: check_in.to_string(),
            check_out: check_out.to_string(),
        });
    }
    if nights > MAX_NIGHTS {
        return Err(ValidationError::OutOfRange {
            field: "number_of_nights".to_string(),
            min: 1,
            max: MAX_NIGHTS,
        }
        .into());
    }
    Ok(nights)
}

/// Computes the price breakdown for a booking request.
///
/// ## Errors
/// - `Validation` for a non-positive night count, negative rates, an
///   experience line with quantity < 1, or any amount above `MAX_AMOUNT_WON`
/// - `InsufficientCredit` when the requested credit exceeds the balance
///
/// ## Example
/// ```rust
/// use homestay_core::money::Money;
/// use homestay_core::pricing::{calculate_price, PricingInput};
/// use homestay_core::types::FeeRate;
///
/// let quote = calculate_price(&PricingInput {
///     nightly_rate: Money::from_won(100_000),
///     number_of_nights: 2,
///     experiences: &[],
///     credit_balance: Money::zero(),
///     requested_credit: None,
///     service_fee_rate: FeeRate::from_bps(1000),
/// })
/// .unwrap();
///
/// assert_eq!(quote.breakdown.total_amount.won(), 220_000);
/// ```
pub fn calculate_price(input: &PricingInput<'_>) -> CoreResult<Quote> {
    if input.number_of_nights < 1 {
        return Err(ValidationError::MustBePositive {
            field: "number_of_nights".to_string(),
        }
        .into());
    }
    if input.nightly_rate.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "nightly_rate".to_string(),
        }
        .into());
    }
    within_ceiling("nightly_rate", Some(input.nightly_rate))?;
    if input.experiences.len() > MAX_EXPERIENCE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "experience_items".to_string(),
            min: 0,
            max: MAX_EXPERIENCE_ITEMS as i64,
        }
        .into());
    }

    let items = input
        .experiences
        .iter()
        .map(price_experience)
        .collect::<CoreResult<Vec<_>>>()?;

    let accommodation_total = within_ceiling(
        "accommodation_total",
        input.nightly_rate.checked_multiply_quantity(input.number_of_nights),
    )?;
    let experiences_total = items.iter().try_fold(Money::zero(), |acc, item| {
        within_ceiling("experiences_total", acc.checked_add(item.total_price))
    })?;
    let subtotal = within_ceiling("subtotal", accommodation_total.checked_add(experiences_total))?;
    let service_fee = subtotal.calculate_fee(input.service_fee_rate);
    let total_before_credit = within_ceiling("total_amount", subtotal.checked_add(service_fee))?;

    let requested = input.requested_credit.unwrap_or_default();
    if requested.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "requested_credit".to_string(),
        }
        .into());
    }
    if requested > input.credit_balance {
        return Err(CoreError::InsufficientCredit {
            requested,
            available: input.credit_balance.floor_zero(),
        });
    }

    let credit_applied = requested.min(total_before_credit);
    let total_amount = (total_before_credit - credit_applied).floor_zero();

    Ok(Quote {
        breakdown: PriceBreakdown {
            accommodation_total,
            experiences_total,
            service_fee,
            credit_applied,
            total_amount,
        },
        items,
    })
}

fn price_experience(selection: &ExperienceSelection) -> CoreResult<ExperienceItem> {
    if selection.quantity < 1 || selection.quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: format!("quantity of experience {}", selection.experience_id),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        }
        .into());
    }
    if selection.unit_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: format!("unit price of experience {}", selection.experience_id),
        }
        .into());
    }
    within_ceiling(
        &format!("unit price of experience {}", selection.experience_id),
        Some(selection.unit_price),
    )?;
    let total_price = within_ceiling(
        &format!("total of experience {}", selection.experience_id),
        selection.unit_price.checked_multiply_quantity(selection.quantity),
    )?;

    Ok(ExperienceItem {
        experience_id: selection.experience_id.clone(),
        date: selection.date,
        time: selection.time.clone(),
        quantity: selection.quantity,
        unit_price: selection.unit_price,
        total_price,
    })
}

/// `None` is an overflowed computation and fails like any value above the cap.
fn within_ceiling(field: &str, amount: Option<Money>) -> CoreResult<Money> {
    match amount {
        Some(amount) if amount.won() <= MAX_AMOUNT_WON => Ok(amount),
        _ => Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_WON,
        }
        .into()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_percent() -> FeeRate {
        FeeRate::from_bps(1000)
    }

    fn input(experiences: &[ExperienceSelection]) -> PricingInput<'_> {
        PricingInput {
            nightly_rate: Money::from_won(100_000),
            number_of_nights: 2,
            experiences,
            credit_balance: Money::zero(),
            requested_credit: None,
            service_fee_rate: ten_percent(),
        }
    }

    fn experience(id: &str, qty: i64, unit: i64) -> ExperienceSelection {
        ExperienceSelection {
            experience_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            time: "10:00".to_string(),
            quantity: qty,
            unit_price: Money::from_won(unit),
        }
    }

    #[test]
    fn test_plain_stay_with_fee() {
        let quote = calculate_price(&input(&[])).unwrap();
        let b = quote.breakdown;

        assert_eq!(b.accommodation_total.won(), 200_000);
        assert_eq!(b.experiences_total.won(), 0);
        assert_eq!(b.service_fee.won(), 20_000);
        assert_eq!(b.credit_applied.won(), 0);
        assert_eq!(b.total_amount.won(), 220_000);
        assert!(b.is_consistent());
    }

    #[test]
    fn test_full_credit_coverage_yields_zero_total() {
        let mut req = input(&[]);
        req.credit_balance = Money::from_won(250_000);
        req.requested_credit = Some(Money::from_won(250_000));

        let b = calculate_price(&req).unwrap().breakdown;
        assert_eq!(b.credit_applied.won(), 220_000);
        assert_eq!(b.total_amount.won(), 0);
        assert!(b.is_consistent());
    }

    #[test]
    fn test_partial_credit() {
        let mut req = input(&[]);
        req.credit_balance = Money::from_won(50_000);
        req.requested_credit = Some(Money::from_won(30_000));

        let b = calculate_price(&req).unwrap().breakdown;
        assert_eq!(b.credit_applied.won(), 30_000);
        assert_eq!(b.total_amount.won(), 190_000);
    }

    #[test]
    fn test_credit_request_above_balance_fails() {
        let mut req = input(&[]);
        req.credit_balance = Money::from_won(10_000);
        req.requested_credit = Some(Money::from_won(20_000));

        let err = calculate_price(&req).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientCredit {
                requested: Money::from_won(20_000),
                available: Money::from_won(10_000),
            }
        );
    }

    #[test]
    fn test_fee_applied_once_on_subtotal() {
        // Per-line rounding would give 1 + 1 + 1 = 3; on the subtotal it is
        // 45 × 5% = 2.25 → 2.
        let exps = [experience("a", 1, 15), experience("b", 1, 15), experience("c", 1, 15)];
        let req = PricingInput {
            nightly_rate: Money::zero(),
            number_of_nights: 1,
            experiences: &exps,
            credit_balance: Money::zero(),
            requested_credit: None,
            service_fee_rate: FeeRate::from_bps(500),
        };

        let b = calculate_price(&req).unwrap().breakdown;
        assert_eq!(b.experiences_total.won(), 45);
        assert_eq!(b.service_fee.won(), 2);
    }

    #[test]
    fn test_experience_lines_are_priced_in_order() {
        let exps = [experience("kayak", 2, 30_000), experience("bbq", 4, 12_500)];
        let quote = calculate_price(&input(&exps)).unwrap();

        assert_eq!(quote.items.len(), 2);
        assert_eq!(quote.items[0].experience_id, "kayak");
        assert_eq!(quote.items[0].total_price.won(), 60_000);
        assert_eq!(quote.items[1].total_price.won(), 50_000);
        assert_eq!(quote.breakdown.experiences_total.won(), 110_000);
        // (200,000 + 110,000) × 10% = 31,000
        assert_eq!(quote.breakdown.service_fee.won(), 31_000);
        assert_eq!(quote.breakdown.total_amount.won(), 341_000);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let exps = [experience("kayak", 0, 30_000)];
        let err = calculate_price(&input(&exps)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_oversized_amounts_are_rejected_not_overflowed() {
        let mut req = input(&[]);
        req.nightly_rate = Money::from_won(i64::MAX / 2 + 1);
        let err = calculate_price(&req).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "nightly_rate"
        ));

        // Each rate is allowed, but a year at the ceiling is not
        let mut req = input(&[]);
        req.nightly_rate = Money::from_won(MAX_AMOUNT_WON);
        req.number_of_nights = MAX_NIGHTS;
        let err = calculate_price(&req).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "accommodation_total"
        ));

        let exps = [experience("yacht", MAX_ITEM_QUANTITY, i64::MAX / 10)];
        let err = calculate_price(&input(&exps)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_number_of_nights() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 11, day).unwrap();
        assert_eq!(number_of_nights(d(1), d(3)).unwrap(), 2);
        assert!(matches!(
            number_of_nights(d(3), d(3)),
            Err(CoreError::InvalidStayDates { .. })
        ));
        assert!(number_of_nights(d(4), d(3)).is_err());
    }
}
