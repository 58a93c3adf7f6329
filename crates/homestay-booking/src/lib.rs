//! # homestay-booking: Booking/Payment Coordinator
//!
//! Runs the multi-step booking workflow across the credit ledger, the
//! external payment processor and the Ledger Store, with saga-style
//! compensation so a failure at any step leaves nothing half-applied.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Booking Coordinator Layout                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 BookingCoordinator (orchestrator)                │  │
//! │  │  create_booking · confirm · reject · cancel · complete · no-show │  │
//! │  │  check_in_guest · get_booking · listings · reviews · credit     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ CreditLedger   │  │ PaymentGateway │  │ Availability/Notifier  │    │
//! │  │                │  │   (trait)      │  │   (traits)             │    │
//! │  │ debit/reverse  │  │ capture/refund │  │ calendar yes/no,       │    │
//! │  │ per-guest lock │  │ with tokens    │  │ fire-and-forget events │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Saga           │  │ RetryPolicy    │  │ BookingConfig          │    │
//! │  │ step arena,    │  │ backoff +      │  │ defaults → TOML →      │    │
//! │  │ reverse undo   │  │ step timeout   │  │ HOMESTAY_* env         │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`coordinator`] - `BookingCoordinator`, the saga and the transitions
//! - [`credit`] - Credit ledger on top of the store
//! - [`gateway`] - Payment processor boundary and an in-memory processor
//! - [`availability`] - Calendar boundary
//! - [`notify`] - Notification boundary
//! - [`saga`] - Record of started steps and their compensations
//! - [`retry`] - Bounded retry with per-step timeout
//! - [`clock`] - Time source
//! - [`config`] - Coordinator configuration
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use homestay_booking::{BookingConfig, BookingCoordinator, MockPaymentGateway,
//!     InMemoryAvailability, TracingNotifier};
//! use homestay_db::Database;
//!
//! let config = BookingConfig::load_or_default(None);
//! let db = Database::new(config.db_config()).await?;
//!
//! let coordinator = BookingCoordinator::new(
//!     db,
//!     Arc::new(MockPaymentGateway::new()),
//!     Arc::new(InMemoryAvailability::new()),
//!     Arc::new(TracingNotifier),
//! )
//! .with_config(&config);
//!
//! let booking = coordinator.create_booking(&guest, request).await?;
//! let booking = coordinator.confirm_booking(&booking.id, &host).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod credit;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod retry;
pub mod saga;

// =============================================================================
// Re-exports
// =============================================================================

pub use availability::AvailabilityChecker;
pub use clock::{Clock, SystemClock};
pub use config::{BookingConfig, DatabaseSettings, PricingSettings, RetrySettings};
pub use coordinator::{BookingCoordinator, BookingView, CreateBookingRequest};
pub use credit::{debit_key, CreditLedger};
pub use error::{
    AvailabilityError, BookingError, BookingResult, CreditError, CreditResult, GatewayError,
    GatewayResult, NotifyError,
};
pub use gateway::{capture_token, refund_token, CaptureReceipt, PaymentGateway, RefundReceipt};
pub use notify::{Notifier, TracingNotifier};
pub use retry::{RetryPolicy, StepError};
pub use saga::{Saga, SagaStep};

#[cfg(any(test, feature = "test-utils"))]
pub use availability::InMemoryAvailability;
#[cfg(any(test, feature = "test-utils"))]
pub use clock::FixedClock;
#[cfg(any(test, feature = "test-utils"))]
pub use gateway::MockPaymentGateway;
#[cfg(any(test, feature = "test-utils"))]
pub use notify::RecordingNotifier;
