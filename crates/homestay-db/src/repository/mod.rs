//! # Repository Module
//!
//! Ledger Store repositories.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Responsibilities                          │
//! │                                                                         │
//! │  BookingRepository                                                     │
//! │  ├── insert_with_payment   booking + items + payment + capture event   │
//! │  │                         in ONE transaction                          │
//! │  ├── commit_transition     CAS on version; refund written alongside    │
//! │  └── list_by_guest/host    paged listings                              │
//! │                                                                         │
//! │  CreditRepository          append-only, serialized per guest           │
//! │  ├── debit                 balance check + append, atomic              │
//! │  ├── reverse               at most one reversal per debit              │
//! │  └── grant / balance / summary / history                               │
//! │                                                                         │
//! │  PaymentRepository         reads (writes happen inside booking txns)   │
//! │  ReviewRepository          one review per completed booking            │
//! │  ReconciliationRepository  append-only failed-compensation log         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credit transactions, payment events and reconciliation entries are never
//! updated or deleted; triggers in the schema enforce it.

pub mod booking;
pub mod credit;
pub mod payment;
pub mod reconciliation;
pub mod review;
