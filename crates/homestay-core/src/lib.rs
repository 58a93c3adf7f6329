//! # homestay-core: Pure Business Logic for the Booking Core
//!
//! This crate holds every rule of the booking core that can be expressed
//! without I/O: money, pricing, the booking state machine and validation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Homestay Booking Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Presentation layer (out of scope)                  │   │
//! │  │   Property page ──► Checkout ──► My bookings ──► Host console   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          homestay-booking (Booking/Payment Coordinator)         │   │
//! │  │   create_booking, confirm, reject, cancel, get_booking, ...     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ homestay-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────┐  ┌───────────┐ │   │
//! │  │   │   types   │  │   money   │  │   pricing   │  │  state_   │ │   │
//! │  │   │  Booking  │  │   Money   │  │ PriceBreak- │  │  machine  │ │   │
//! │  │   │  Payment  │  │  FeeRate  │  │    down     │  │  guards   │ │   │
//! │  │   └───────────┘  └───────────┘  └─────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               homestay-db (Ledger Store)                        │   │
//! │  │        SQLite tables, migrations, per-key write ordering        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Booking, Payment, CreditTransaction, etc.)
//! - [`money`] - Money type with integer arithmetic
//! - [`pricing`] - Pricing Calculator
//! - [`state_machine`] - Booking transition table and guards
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use homestay_core::money::Money;
//! use homestay_core::types::FeeRate;
//!
//! let subtotal = Money::from_won(200_000);
//! let fee = subtotal.calculate_fee(FeeRate::from_bps(1000));
//!
//! assert_eq!(fee.won(), 20_000);
//! assert_eq!(fee.to_string(), "₩20,000");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod pricing;
pub mod state_machine;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{calculate_price, number_of_nights, PriceBreakdown, PricingInput, Quote};
pub use state_machine::{BookingAction, CheckIn, Transition, TransitionPlan};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default platform service fee: 1000 bps = 10%.
pub const DEFAULT_SERVICE_FEE_BPS: u32 = 1000;

/// Largest amount a rate, price, grant or total may reach, in won
/// (₩100,000,000,000). Keeps every sum the pricing does far inside i64.
pub const MAX_AMOUNT_WON: i64 = 100_000_000_000;

/// Longest stay a single booking may cover.
pub const MAX_NIGHTS: i64 = 365;

/// Maximum number of experience lines on one booking.
pub const MAX_EXPERIENCE_ITEMS: usize = 20;

/// Maximum quantity of one experience line.
pub const MAX_ITEM_QUANTITY: i64 = 50;

/// Maximum number of guests on one booking.
pub const MAX_GUESTS: u32 = 30;

/// Maximum length of a rejection/cancellation reason, in characters.
pub const MAX_REASON_LENGTH: usize = 500;

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound for a requested page size.
pub const MAX_PAGE_SIZE: u32 = 100;
