//! # Domain Types
//!
//! Core domain types used throughout the homestay booking core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────────┐  │
//! │  │    Booking      │   │    Payment      │   │  CreditTransaction   │  │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────────  │  │
//! │  │  id (UUID)      │◄──│  booking_id     │   │  guest_id            │  │
//! │  │  guest_id       │   │  order_id       │   │  booking_id (opt)    │  │
//! │  │  host_id        │   │  amount         │   │  amount (signed)     │  │
//! │  │  price          │   │  status         │   │  idempotency_key     │  │
//! │  │  state          │   │  refunded_at    │   │  (append-only)       │  │
//! │  └─────────────────┘   └─────────────────┘   └──────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────────┐  │
//! │  │    FeeRate      │   │  BookingState   │   │   PaymentStatus      │  │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────────  │  │
//! │  │  bps (u32)      │   │  Pending        │   │  Pending             │  │
//! │  │  1000 = 10%     │   │  Confirmed      │   │  Done                │  │
//! │  └─────────────────┘   │  Rejected{..}   │   │  Cancelled           │  │
//! │                        │  Cancelled{..}  │   └──────────────────────┘  │
//! │                        │  Completed      │                             │
//! │                        │  NoShow         │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reasons Live Inside the State
//! A rejection reason only exists on a rejected booking and a cancellation
//! reason only on a cancelled one. `BookingState` carries the reason in the
//! variant, so a booking with both (or a pending booking with one) cannot
//! be constructed.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::money::Money;
use crate::pricing::PriceBreakdown;

// =============================================================================
// Fee Rate
// =============================================================================

/// Platform service fee represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10% (the platform default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FeeRate(u32);

impl FeeRate {
    /// Creates a fee rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        FeeRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero fee rate.
    #[inline]
    pub const fn zero() -> Self {
        FeeRate(0)
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        FeeRate::from_bps(crate::DEFAULT_SERVICE_FEE_BPS)
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Role of the authenticated caller. Identity is resolved outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Host,
    Admin,
    /// Scheduled jobs (stay completion, no-show sweeps).
    System,
}

/// The authenticated caller of a coordinator operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn guest(id: impl Into<String>) -> Self {
        Actor { id: id.into(), role: Role::Guest }
    }

    pub fn host(id: impl Into<String>) -> Self {
        Actor { id: id.into(), role: Role::Host }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Actor { id: id.into(), role: Role::Admin }
    }

    pub fn system() -> Self {
        Actor { id: "system".to_string(), role: Role::System }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// Booking Status
// =============================================================================

/// Flat status of a booking, as stored and as shown in listings.
///
/// ## Transition Table
/// ```text
///              confirm              complete
///   PENDING ───────────► CONFIRMED ─────────► COMPLETED
///      │                   │   │
///      │ reject            │   │ mark_no_show
///      ▼                   │   ▼
///   REJECTED        cancel │  NO_SHOW
///      ▲                   ▼
///      │              CANCELLED ◄── cancel ── PENDING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Rejected,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Returns the stored/wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Rejected => "REJECTED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }

    /// Terminal states accept no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::Rejected
                | BookingStatus::Cancelled
                | BookingStatus::NoShow
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "REJECTED" => Ok(BookingStatus::Rejected),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "NO_SHOW" => Ok(BookingStatus::NoShow),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

// =============================================================================
// Booking State
// =============================================================================

/// The canonical state of a booking, reasons included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    Pending,
    Confirmed,
    Completed,
    NoShow,
    Rejected { reason: String },
    Cancelled { reason: String },
}

impl BookingState {
    /// Flattens the state to its status tag.
    pub fn status(&self) -> BookingStatus {
        match self {
            BookingState::Pending => BookingStatus::Pending,
            BookingState::Confirmed => BookingStatus::Confirmed,
            BookingState::Completed => BookingStatus::Completed,
            BookingState::NoShow => BookingStatus::NoShow,
            BookingState::Rejected { .. } => BookingStatus::Rejected,
            BookingState::Cancelled { .. } => BookingStatus::Cancelled,
        }
    }

    /// Rebuilds a state from its stored columns.
    ///
    /// Returns `None` when the reason columns disagree with the status.
    pub fn from_parts(
        status: BookingStatus,
        rejection_reason: Option<String>,
        cancellation_reason: Option<String>,
    ) -> Option<Self> {
        match (status, rejection_reason, cancellation_reason) {
            (BookingStatus::Pending, None, None) => Some(BookingState::Pending),
            (BookingStatus::Confirmed, None, None) => Some(BookingState::Confirmed),
            (BookingStatus::Completed, None, None) => Some(BookingState::Completed),
            (BookingStatus::NoShow, None, None) => Some(BookingState::NoShow),
            (BookingStatus::Rejected, Some(reason), None) => Some(BookingState::Rejected { reason }),
            (BookingStatus::Cancelled, None, Some(reason)) => {
                Some(BookingState::Cancelled { reason })
            }
            _ => None,
        }
    }
}

// =============================================================================
// Booking
// =============================================================================

/// A guest's reservation of a property for a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Booking {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub property_id: String,

    /// Host who owns the property; confirms or rejects.
    pub host_id: String,

    /// Guest who made the booking; owns it.
    pub guest_id: String,

    #[ts(as = "String")]
    pub check_in: NaiveDate,

    #[ts(as = "String")]
    pub check_out: NaiveDate,

    /// Number of guests staying.
    pub guests: u32,

    pub nightly_rate: Money,

    /// `check_out - check_in` in days, at least 1.
    pub number_of_nights: i64,

    /// Accommodation, experiences, fee, credit and total.
    pub price: PriceBreakdown,

    /// Selected add-on experiences, in request order.
    pub experience_items: Vec<ExperienceItem>,

    pub state: BookingState,

    /// Contact snapshot taken at booking time.
    pub guest_contact: GuestContact,

    pub special_requests: Option<String>,

    /// Set when a compensation failed and money needs manual reconciliation.
    pub needs_attention: Option<String>,

    #[ts(as = "Option<String>")]
    pub checked_in_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub rejected_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency version, bumped on every committed write.
    pub version: i64,
}

impl Booking {
    #[inline]
    pub fn status(&self) -> BookingStatus {
        self.state.status()
    }

    /// Start of the check-in day (UTC midnight).
    pub fn check_in_at(&self) -> DateTime<Utc> {
        start_of_day(self.check_in)
    }

    /// Start of the check-out day (UTC midnight).
    pub fn check_out_at(&self) -> DateTime<Utc> {
        start_of_day(self.check_out)
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match &self.state {
            BookingState::Rejected { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        match &self.state {
            BookingState::Cancelled { reason } => Some(reason),
            _ => None,
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

// =============================================================================
// Experience Items
// =============================================================================

/// An add-on experience as selected in the booking request.
///
/// The unit price comes from the experience catalog, which lives outside
/// the core; the caller resolves it before calling in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExperienceSelection {
    pub experience_id: String,

    #[ts(as = "String")]
    pub date: NaiveDate,

    /// Time slot, `HH:MM`.
    pub time: String,

    pub quantity: i64,

    pub unit_price: Money,
}

/// A priced experience line stored with the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExperienceItem {
    pub experience_id: String,

    #[ts(as = "String")]
    pub date: NaiveDate,

    pub time: String,

    pub quantity: i64,

    pub unit_price: Money,

    /// `unit_price × quantity`.
    pub total_price: Money,
}

/// Guest contact details captured with the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GuestContact {
    pub name: String,
    pub phone: String,
    pub email: String,
}

// =============================================================================
// Payment
// =============================================================================

/// The status of a booking's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created but not captured.
    Pending,
    /// Captured (or fully covered by credit).
    Done,
    /// Refunded.
    Cancelled,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Done => "DONE",
            PaymentStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// How the guest pays the remainder after credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    EasyPay,
    /// Total was zero after credit; no gateway call happened.
    CreditOnly,
}

/// The single payment attached to a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,

    pub booking_id: String,

    /// `ORD-<booking id prefix>-<epoch millis>`, shown on statements.
    pub order_id: String,

    /// Human-readable order label.
    pub order_name: String,

    /// Equals the booking's total at capture time.
    pub amount: Money,

    pub status: PaymentStatus,

    pub method: PaymentMethod,

    /// Processor reference returned by capture; `None` for credit-only.
    pub external_ref: Option<String>,

    #[ts(as = "Option<String>")]
    pub captured_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Kind of money movement recorded against a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEventKind {
    Capture,
    Refund,
}

/// Append-only record of a capture or refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentEvent {
    pub id: String,
    pub payment_id: String,
    pub kind: PaymentEventKind,
    pub amount: Money,
    pub external_ref: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Credit
// =============================================================================

/// Kind of credit ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    /// Credit granted to the guest (promotion, goodwill, purchase).
    TopUp,
    /// Credit spent on a booking (negative amount).
    Debit,
    /// Compensation of a debit (positive amount).
    Reversal,
}

/// An append-only credit ledger entry.
///
/// The sign of `amount` is the source of truth: negative spends,
/// positive adds. A guest's balance is the sum over their entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreditTransaction {
    pub id: String,
    pub guest_id: String,
    /// `None` for top-ups.
    pub booking_id: Option<String>,
    pub kind: CreditKind,
    pub amount: Money,
    pub idempotency_key: String,
    pub memo: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Lifetime credit totals for a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreditSummary {
    /// Current balance (sum of all entries).
    pub available: Money,
    /// Sum of top-ups.
    pub total_earned: Money,
    /// Net spend: debits minus reversals.
    pub total_used: Money,
}

// =============================================================================
// Review
// =============================================================================

/// A guest's review of a completed stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub guest_id: String,
    pub property_id: String,
    /// 1 to 5.
    pub rating: u8,
    pub comment: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Terminal transition announced to the notification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
    NoShow,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationEvent::Confirmed => "confirmed",
            NotificationEvent::Rejected => "rejected",
            NotificationEvent::Cancelled => "cancelled",
            NotificationEvent::Completed => "completed",
            NotificationEvent::NoShow => "no_show",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Paging
// =============================================================================

/// A page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        PageRequest {
            page: page.max(1),
            limit: limit.clamp(1, crate::MAX_PAGE_SIZE),
        }
    }

    /// Row offset for SQL `OFFSET`.
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(1, crate::DEFAULT_PAGE_SIZE)
    }
}

/// A page of results plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let limit = request.limit.max(1) as i64;
        Page {
            items,
            page: request.page,
            limit: request.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
