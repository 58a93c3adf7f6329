//! # homestay-db: Ledger Store for the Booking Core
//!
//! Durable storage for bookings, payments, the credit ledger, reviews and
//! the reconciliation log, on SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Booking Core Data Flow                             │
//! │                                                                         │
//! │  BookingCoordinator (homestay-booking)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   homestay-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ BookingRepo    │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ CreditRepo     │    │              │  │   │
//! │  │   │ KeyedLocks    │    │ PaymentRepo    │    │              │  │   │
//! │  │   │               │    │ ReviewRepo     │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`locks`] - Per-key async write locks
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use homestay_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("booking.db")).await?;
//!
//! let balance = db.credits().balance("guest-1").await?;
//! let booking = db.bookings().get_by_id("b-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use locks::{KeyGuard, KeyedLocks};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::booking::BookingRepository;
pub use repository::credit::{
    reversal_key, AppendOutcome, CreditRepository, DebitOutcome, NewDebit, ReversalOutcome,
};
pub use repository::payment::{PaymentRepository, RefundRecord};
pub use repository::reconciliation::{ReconciliationEntry, ReconciliationRepository};
pub use repository::review::ReviewRepository;
