//! Saga compensation and money-path failure handling.

mod common;

use common::*;
use homestay_booking::{BookingError, GatewayError};
use homestay_core::{BookingStatus, CreditKind, PageRequest, PaymentStatus};
use std::time::Duration;

async fn guest_booking_count(h: &Harness) -> i64 {
    h.coordinator
        .list_guest_bookings(&guest(), GUEST, None, PageRequest::default())
        .await
        .unwrap()
        .total
}

#[tokio::test]
async fn test_declined_capture_reverses_the_debit() {
    let h = harness().await;
    h.grant(GUEST, 100_000).await;
    h.gateway
        .fail_captures([GatewayError::Declined("card limit".to_string())])
        .await;

    let err = h
        .coordinator
        .create_booking(&guest(), with_credit(request("req-declined"), 50_000))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::PaymentFailed(_)));
    assert_eq!(
        err.user_message(),
        "The payment could not be completed. You have not been charged."
    );
    // Declines are not retried
    assert_eq!(h.gateway.capture_calls().await, 1);
    assert_eq!(h.balance(GUEST).await, 100_000);
    assert_eq!(guest_booking_count(&h).await, 0);

    let history = h
        .coordinator
        .credit_history(&guest(), GUEST, PageRequest::default())
        .await
        .unwrap();
    let kinds: Vec<_> = history.items.iter().map(|t| t.kind).collect();
    assert_eq!(kinds.len(), 3);
    assert!(kinds.contains(&CreditKind::Debit));
    assert!(kinds.contains(&CreditKind::Reversal));

    let log = h.coordinator.reconciliation_log(&admin(), 10).await.unwrap();
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_transient_capture_failures_are_retried() {
    let h = harness().await;
    h.gateway
        .fail_captures([
            GatewayError::Unavailable("502".to_string()),
            GatewayError::Unavailable("503".to_string()),
        ])
        .await;

    let booking = h
        .coordinator
        .create_booking(&guest(), request("req-flaky"))
        .await
        .unwrap();

    assert_eq!(booking.status(), BookingStatus::Pending);
    assert_eq!(h.gateway.capture_calls().await, 3);
    assert_eq!(h.gateway.outstanding().await.won(), 220_000);
}

#[tokio::test]
async fn test_timed_out_capture_replays_the_same_charge() {
    let h = harness().await;
    // Charges, then answers too late; the retry carries the same token
    h.gateway.stall_next_capture(Duration::from_secs(2)).await;

    let booking = h
        .coordinator
        .create_booking(&guest(), request("req-slow"))
        .await
        .unwrap();

    assert_eq!(h.gateway.capture_calls().await, 2);
    assert_eq!(h.gateway.outstanding().await, booking.price.total_amount);
}

#[tokio::test]
async fn test_capture_that_never_answers_is_refunded() {
    let h = harness().await;
    h.grant(GUEST, 100_000).await;
    for _ in 0..3 {
        h.gateway.stall_next_capture(Duration::from_secs(2)).await;
    }

    let err = h
        .coordinator
        .create_booking(&guest(), with_credit(request("req-stuck"), 30_000))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::PaymentFailed(_)));
    // The processor did charge on the first attempt; compensation refunded it
    assert_eq!(h.gateway.refund_calls().await, 1);
    assert!(h.gateway.outstanding().await.is_zero());
    assert_eq!(h.balance(GUEST).await, 100_000);
    assert_eq!(guest_booking_count(&h).await, 0);
}

#[tokio::test]
async fn test_failed_refund_compensation_is_logged_for_reconciliation() {
    let h = harness().await;
    h.grant(GUEST, 100_000).await;
    for _ in 0..3 {
        h.gateway.stall_next_capture(Duration::from_secs(2)).await;
    }
    h.gateway
        .fail_refunds((0..3).map(|i| GatewayError::Unavailable(format!("refund {}", i))))
        .await;

    let err = h
        .coordinator
        .create_booking(&guest(), with_credit(request("req-broken"), 30_000))
        .await
        .unwrap_err();

    match &err {
        BookingError::CompensationFailed { step, .. } => assert_eq!(step, "payment_refund"),
        other => panic!("expected CompensationFailed, got {:?}", other),
    }
    assert_eq!(err.code(), "COMPENSATION_FAILED");

    // The remaining compensation still ran
    assert_eq!(h.balance(GUEST).await, 100_000);

    let log = h.coordinator.reconciliation_log(&admin(), 10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].step, "payment_refund");
    assert!(log[0].detail.contains("refund 2"));

    let err = h.coordinator.reconciliation_log(&guest(), 10).await.unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));
}

#[tokio::test]
async fn test_refund_failure_keeps_the_booking_as_it_was() {
    let h = harness().await;
    let booking = h.coordinator.create_booking(&guest(), request("req-refund")).await.unwrap();
    let confirmed = h.coordinator.confirm_booking(&booking.id, &host()).await.unwrap();

    h.gateway
        .fail_refunds((0..3).map(|i| GatewayError::Unavailable(format!("refund {}", i))))
        .await;
    let err = h
        .coordinator
        .cancel_booking(&booking.id, &guest(), "plans changed")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::PaymentFailed(_)));

    let view = h.coordinator.get_booking(&booking.id, &guest()).await.unwrap();
    assert_eq!(view.booking, confirmed);
    assert_eq!(view.payment.status, PaymentStatus::Done);
    assert_eq!(view.booking.needs_attention, None);

    // Processor is back: the same cancellation goes through
    let cancelled = h
        .coordinator
        .cancel_booking(&booking.id, &guest(), "plans changed")
        .await
        .unwrap();
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);
    assert!(h.gateway.outstanding().await.is_zero());
}

#[tokio::test]
async fn test_failed_credit_reversal_on_cancel_flags_the_booking() {
    let h = harness().await;
    h.grant(GUEST, 100_000).await;
    let booking = h
        .coordinator
        .create_booking(&guest(), with_credit(request("req-stuck-credit"), 50_000))
        .await
        .unwrap();

    h.break_credit_reversals().await;
    let err = h
        .coordinator
        .cancel_booking(&booking.id, &guest(), "plans changed")
        .await
        .unwrap_err();

    match &err {
        BookingError::CompensationFailed { booking_id, step, detail } => {
            assert_eq!(booking_id, &booking.id);
            assert_eq!(step, "credit_reversal");
            assert!(detail.contains("credit ledger offline"));
        }
        other => panic!("expected CompensationFailed, got {:?}", other),
    }

    let view = h.coordinator.get_booking(&booking.id, &guest()).await.unwrap();
    assert_eq!(view.booking.status(), BookingStatus::Pending);
    assert!(view
        .booking
        .needs_attention
        .as_deref()
        .is_some_and(|note| note.starts_with("credit_reversal failed")));
    // The processor refunded, but the store still shows the charge until the
    // cancellation commits
    assert_eq!(view.payment.status, PaymentStatus::Done);
    assert!(h.gateway.outstanding().await.is_zero());
    assert_eq!(h.balance(GUEST).await, 50_000);

    let log = h.coordinator.reconciliation_log(&admin(), 10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].booking_id, booking.id);
    assert_eq!(log[0].step, "credit_reversal");

    // Ledger is back: the same cancellation completes and clears the flag
    h.restore_credit_reversals().await;
    let cancelled = h
        .coordinator
        .cancel_booking(&booking.id, &guest(), "plans changed")
        .await
        .unwrap();
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);
    assert_eq!(cancelled.needs_attention, None);
    assert_eq!(h.balance(GUEST).await, 100_000);

    let view = h.coordinator.get_booking(&booking.id, &guest()).await.unwrap();
    assert_eq!(view.payment.status, PaymentStatus::Cancelled);
    let refunds = view
        .payment_events
        .iter()
        .filter(|e| e.kind == homestay_core::PaymentEventKind::Refund)
        .count();
    assert_eq!(refunds, 1);
    // Second refund call replayed the first
    assert_eq!(h.gateway.refund_calls().await, 2);
}

#[tokio::test]
async fn test_failed_credit_reversal_on_reject_keeps_booking_pending() {
    let h = harness().await;
    h.grant(GUEST, 300_000).await;
    let booking = h
        .coordinator
        .create_booking(&guest(), with_credit(request("req-stuck-reject"), 300_000))
        .await
        .unwrap();
    assert_eq!(booking.price.total_amount.won(), 0);

    h.break_credit_reversals().await;
    let err = h
        .coordinator
        .reject_booking(&booking.id, &host(), "closed for renovation")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::CompensationFailed { ref step, .. } if step == "credit_reversal"));
    assert_eq!(err.code(), "COMPENSATION_FAILED");

    let stored = h.coordinator.get_booking(&booking.id, &host()).await.unwrap().booking;
    assert_eq!(stored.status(), BookingStatus::Pending);
    assert!(stored.needs_attention.is_some());
    assert_eq!(h.balance(GUEST).await, 80_000);

    h.restore_credit_reversals().await;
    let rejected = h
        .coordinator
        .reject_booking(&booking.id, &host(), "closed for renovation")
        .await
        .unwrap();
    assert_eq!(rejected.status(), BookingStatus::Rejected);
    assert_eq!(rejected.needs_attention, None);
    assert_eq!(h.balance(GUEST).await, 300_000);
    // Credit-only payment: no processor involved either time
    assert_eq!(h.gateway.refund_calls().await, 0);
}

#[tokio::test]
async fn test_reject_refunds_and_reverses_credit() {
    let h = harness().await;
    h.grant(GUEST, 100_000).await;
    let booking = h
        .coordinator
        .create_booking(&guest(), with_credit(request("req-reject"), 100_000))
        .await
        .unwrap();
    assert_eq!(h.balance(GUEST).await, 0);

    let rejected = h
        .coordinator
        .reject_booking(&booking.id, &host(), "closed for renovation")
        .await
        .unwrap();

    assert_eq!(rejected.status(), BookingStatus::Rejected);
    assert_eq!(rejected.rejection_reason(), Some("closed for renovation"));
    assert_eq!(h.balance(GUEST).await, 100_000);
    assert!(h.gateway.outstanding().await.is_zero());

    let view = h.coordinator.get_booking(&booking.id, &admin()).await.unwrap();
    assert_eq!(view.payment.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn test_notification_failure_does_not_roll_back() {
    let h = harness().await;
    let booking = h.coordinator.create_booking(&guest(), request("req-notify")).await.unwrap();
    h.notifier.fail_all();

    let confirmed = h.coordinator.confirm_booking(&booking.id, &host()).await.unwrap();
    assert_eq!(confirmed.status(), BookingStatus::Confirmed);

    let events = h.notifier.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, booking.id);
    assert_eq!(events[0].1, homestay_core::NotificationEvent::Confirmed);
}
