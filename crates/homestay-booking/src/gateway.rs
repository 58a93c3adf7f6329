//! # Payment Gateway Adapter
//!
//! Boundary to the external payment processor. The adapter does no
//! business validation and is not authoritative for state: the coordinator
//! decides what a payment's status is, the adapter only moves money.
//!
//! ## Idempotency Tokens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  capture(pay-1, ₩220,000, card, token "capture:pay-1")                 │
//! │       │                                                                 │
//! │       ├── attempt 1: processor charges, response lost (timeout)        │
//! │       │                                                                 │
//! │       └── attempt 2: same token → processor returns the FIRST charge   │
//! │                                   instead of charging again            │
//! │                                                                         │
//! │  refund(pay-1, ref?, token "refund:pay-1")                             │
//! │       ├── captured   → refunded once, replays return the same receipt  │
//! │       └── never seen → no-op success (nothing to give back)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `refund` must be safe to call for a capture whose outcome is unknown;
//! the saga relies on that when a capture times out locally.

use async_trait::async_trait;
use homestay_core::{Money, PaymentMethod};

use crate::error::GatewayResult;

/// Token for the capture of a payment.
pub fn capture_token(payment_id: &str) -> String {
    format!("capture:{}", payment_id)
}

/// Token for the refund of a payment.
pub fn refund_token(payment_id: &str) -> String {
    format!("refund:{}", payment_id)
}

/// Successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReceipt {
    /// Processor reference for the charge.
    pub external_ref: String,
}

/// Outcome of a refund call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundReceipt {
    /// Money was returned (now or by an earlier call with the same token).
    Refunded { external_ref: String },
    /// The processor holds no capture for this payment.
    NothingToRefund,
}

impl RefundReceipt {
    pub fn external_ref(&self) -> Option<&str> {
        match self {
            RefundReceipt::Refunded { external_ref } => Some(external_ref),
            RefundReceipt::NothingToRefund => None,
        }
    }
}

/// External payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges `amount`. Repeating a call with the same `token` must not
    /// charge twice.
    async fn capture(
        &self,
        payment_id: &str,
        amount: Money,
        method: PaymentMethod,
        token: &str,
    ) -> GatewayResult<CaptureReceipt>;

    /// Refunds the capture of `payment_id` in full. `external_ref` is the
    /// capture reference when known. Repeating a call with the same
    /// `token` must not refund twice.
    async fn refund(
        &self,
        payment_id: &str,
        external_ref: Option<&str>,
        token: &str,
    ) -> GatewayResult<RefundReceipt>;
}

// =============================================================================
// In-memory Gateway
// =============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockPaymentGateway;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use crate::error::GatewayError;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tracing::{debug, info};

    #[derive(Debug, Default)]
    struct MockState {
        /// Keyed by capture token.
        captures: HashMap<String, MockCapture>,
        /// Keyed by refund token.
        refunds: HashMap<String, MockRefund>,
        capture_failures: VecDeque<GatewayError>,
        refund_failures: VecDeque<GatewayError>,
        capture_delays: VecDeque<Duration>,
        refund_delays: VecDeque<Duration>,
        capture_calls: usize,
        refund_calls: usize,
        sequence: u64,
    }

    #[derive(Debug, Clone)]
    struct MockCapture {
        payment_id: String,
        amount: Money,
        external_ref: String,
    }

    #[derive(Debug, Clone)]
    struct MockRefund {
        payment_id: String,
        external_ref: String,
    }

    impl MockState {
        fn is_refunded(&self, payment_id: &str) -> bool {
            self.refunds.values().any(|r| r.payment_id == payment_id)
        }
    }

    /// In-memory processor for local development and tests.
    ///
    /// Honors idempotency tokens like a real processor, issues `mock_txn_N`
    /// and `mock_refund_N` references, and can be told to fail or stall the
    /// next calls.
    #[derive(Debug, Default)]
    pub struct MockPaymentGateway {
        state: Mutex<MockState>,
    }

    impl MockPaymentGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `capture` calls fail with these errors, in order.
        pub async fn fail_captures(&self, errors: impl IntoIterator<Item = GatewayError>) {
            self.state.lock().await.capture_failures.extend(errors);
        }

        /// The next `refund` calls fail with these errors, in order.
        pub async fn fail_refunds(&self, errors: impl IntoIterator<Item = GatewayError>) {
            self.state.lock().await.refund_failures.extend(errors);
        }

        /// The next `capture` charges and then answers after `delay`.
        pub async fn stall_next_capture(&self, delay: Duration) {
            self.state.lock().await.capture_delays.push_back(delay);
        }

        /// The next `refund` refunds and then answers after `delay`.
        pub async fn stall_next_refund(&self, delay: Duration) {
            self.state.lock().await.refund_delays.push_back(delay);
        }

        /// Calls made to `capture`, replays and failures included.
        pub async fn capture_calls(&self) -> usize {
            self.state.lock().await.capture_calls
        }

        /// Calls made to `refund`, replays and failures included.
        pub async fn refund_calls(&self) -> usize {
            self.state.lock().await.refund_calls
        }

        /// Distinct charges currently held (captured and not refunded).
        pub async fn outstanding(&self) -> Money {
            let state = self.state.lock().await;
            state
                .captures
                .values()
                .filter(|c| !state.is_refunded(&c.payment_id))
                .map(|c| c.amount)
                .sum()
        }
    }

    #[async_trait]
    impl PaymentGateway for MockPaymentGateway {
        async fn capture(
            &self,
            payment_id: &str,
            amount: Money,
            method: PaymentMethod,
            token: &str,
        ) -> GatewayResult<CaptureReceipt> {
            let (receipt, delay) = {
                let mut state = self.state.lock().await;
                state.capture_calls += 1;

                if let Some(err) = state.capture_failures.pop_front() {
                    debug!(payment_id = %payment_id, error = %err, "Mock capture failing on request");
                    return Err(err);
                }

                let receipt = match state.captures.get(token) {
                    Some(existing) => CaptureReceipt {
                        external_ref: existing.external_ref.clone(),
                    },
                    None => {
                        state.sequence += 1;
                        let external_ref = format!("mock_txn_{}", state.sequence);
                        state.captures.insert(
                            token.to_string(),
                            MockCapture {
                                payment_id: payment_id.to_string(),
                                amount,
                                external_ref: external_ref.clone(),
                            },
                        );
                        info!(
                            payment_id = %payment_id,
                            amount = %amount,
                            method = ?method,
                            external_ref = %external_ref,
                            "Mock capture"
                        );
                        CaptureReceipt { external_ref }
                    }
                };
                (receipt, state.capture_delays.pop_front())
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(receipt)
        }

        async fn refund(
            &self,
            payment_id: &str,
            external_ref: Option<&str>,
            token: &str,
        ) -> GatewayResult<RefundReceipt> {
            let (receipt, delay) = {
                let mut state = self.state.lock().await;
                state.refund_calls += 1;

                if let Some(err) = state.refund_failures.pop_front() {
                    debug!(payment_id = %payment_id, error = %err, "Mock refund failing on request");
                    return Err(err);
                }

                let receipt = if let Some(existing) = state.refunds.get(token) {
                    RefundReceipt::Refunded {
                        external_ref: existing.external_ref.clone(),
                    }
                } else {
                    // A capture already refunded under another token holds no money
                    let captured = !state.is_refunded(payment_id)
                        && state.captures.values().any(|c| {
                            c.payment_id == payment_id && external_ref.map_or(true, |r| r == c.external_ref)
                        });
                    if captured {
                        state.sequence += 1;
                        let refund_ref = format!("mock_refund_{}", state.sequence);
                        state.refunds.insert(
                            token.to_string(),
                            MockRefund {
                                payment_id: payment_id.to_string(),
                                external_ref: refund_ref.clone(),
                            },
                        );
                        info!(payment_id = %payment_id, external_ref = %refund_ref, "Mock refund");
                        RefundReceipt::Refunded {
                            external_ref: refund_ref,
                        }
                    } else {
                        debug!(payment_id = %payment_id, token = %token, "Mock refund: nothing captured");
                        RefundReceipt::NothingToRefund
                    }
                };
                (receipt, state.refund_delays.pop_front())
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(receipt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;

    #[tokio::test]
    async fn test_capture_token_replays() {
        let gateway = MockPaymentGateway::new();
        let token = capture_token("pay-1");

        let first = gateway
            .capture("pay-1", Money::from_won(220_000), PaymentMethod::Card, &token)
            .await
            .unwrap();
        let second = gateway
            .capture("pay-1", Money::from_won(220_000), PaymentMethod::Card, &token)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.capture_calls().await, 2);
        assert_eq!(gateway.outstanding().await.won(), 220_000);
    }

    #[tokio::test]
    async fn test_refund_once_and_unknown_is_safe() {
        let gateway = MockPaymentGateway::new();
        let receipt = gateway
            .capture("pay-1", Money::from_won(50_000), PaymentMethod::Card, &capture_token("pay-1"))
            .await
            .unwrap();

        let refunded = gateway
            .refund("pay-1", Some(&receipt.external_ref), &refund_token("pay-1"))
            .await
            .unwrap();
        let again = gateway.refund("pay-1", None, &refund_token("pay-1")).await.unwrap();
        assert_eq!(refunded, again);
        assert!(gateway.outstanding().await.is_zero());

        let unknown = gateway.refund("pay-9", None, &refund_token("pay-9")).await.unwrap();
        assert_eq!(unknown, RefundReceipt::NothingToRefund);
    }

    #[tokio::test]
    async fn test_refunds_replay_by_token() {
        let gateway = MockPaymentGateway::new();
        gateway
            .capture("pay-1", Money::from_won(50_000), PaymentMethod::Card, &capture_token("pay-1"))
            .await
            .unwrap();

        let first = gateway.refund("pay-1", None, "refund:attempt-a").await.unwrap();
        assert!(first.external_ref().is_some());
        assert_eq!(gateway.refund("pay-1", None, "refund:attempt-a").await.unwrap(), first);

        // A fresh token finds the money already returned
        let other = gateway.refund("pay-1", None, "refund:attempt-b").await.unwrap();
        assert_eq!(other, RefundReceipt::NothingToRefund);
        assert!(gateway.outstanding().await.is_zero());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let gateway = MockPaymentGateway::new();
        gateway
            .fail_captures([GatewayError::Unavailable("502".into()), GatewayError::Declined("limit".into())])
            .await;

        let token = capture_token("pay-1");
        let amount = Money::from_won(10_000);
        assert!(matches!(
            gateway.capture("pay-1", amount, PaymentMethod::Card, &token).await,
            Err(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            gateway.capture("pay-1", amount, PaymentMethod::Card, &token).await,
            Err(GatewayError::Declined(_))
        ));
        assert!(gateway.capture("pay-1", amount, PaymentMethod::Card, &token).await.is_ok());
    }
}
