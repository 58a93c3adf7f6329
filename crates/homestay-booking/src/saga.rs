//! # Booking Saga Log
//!
//! Records the side effects a booking creation has started, so that a
//! failure at any later step can undo exactly those effects.
//!
//! ## Arena, Not Nesting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  steps: [ CreditDebit{guest, ₩30,000}, PaymentCapture{pay-1, ref?} ]   │
//! │            index 0                      index 1                         │
//! │                                                                         │
//! │  forward:  record(step) BEFORE the external call                       │
//! │            (a timed-out call may still have taken effect upstream)     │
//! │                                                                         │
//! │  failure:  compensation_order() → index 1, index 0                     │
//! │            refund(pay-1)  then  reverse(booking)                       │
//! │                                                                         │
//! │  success:  complete() → steps discarded, nothing to undo               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both compensations are idempotent and safe on a step that never took
//! effect, so recording a step early is never harmful.

use homestay_core::Money;

/// A side effect started during booking creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaStep {
    /// Credit was (or may have been) debited. Undone by `reverse`.
    CreditDebit { guest_id: String, amount: Money },

    /// The payment was (or may have been) captured. Undone by `refund`.
    PaymentCapture {
        payment_id: String,
        amount: Money,
        /// Known once capture answered.
        external_ref: Option<String>,
    },
}

impl SagaStep {
    /// Name used in logs and in the reconciliation log.
    pub fn compensation_name(&self) -> &'static str {
        match self {
            SagaStep::CreditDebit { .. } => "credit_reversal",
            SagaStep::PaymentCapture { .. } => "payment_refund",
        }
    }
}

/// Steps started by one booking creation, in order.
#[derive(Debug)]
pub struct Saga {
    booking_id: String,
    steps: Vec<SagaStep>,
}

impl Saga {
    pub fn new(booking_id: impl Into<String>) -> Self {
        Saga {
            booking_id: booking_id.into(),
            steps: Vec::new(),
        }
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    /// Records a step about to run. Returns its index.
    pub fn record(&mut self, step: SagaStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Stores the processor reference of a capture once it is known.
    pub fn set_external_ref(&mut self, index: usize, reference: &str) {
        if let Some(SagaStep::PaymentCapture { external_ref, .. }) = self.steps.get_mut(index) {
            *external_ref = Some(reference.to_string());
        }
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps to undo, last started first.
    pub fn compensation_order(&self) -> impl Iterator<Item = &SagaStep> {
        self.steps.iter().rev()
    }

    /// The booking is committed; the recorded steps stay in effect.
    pub fn complete(self) {
        tracing::debug!(
            booking_id = %self.booking_id,
            steps = self.steps.len(),
            "Saga completed"
        );
    }
}
